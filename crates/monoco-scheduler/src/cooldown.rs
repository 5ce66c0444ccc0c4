//! Swarm-storm guard: failure cool-downs per `(role, issue)`.
//!
//! After a session fails, scheduling the same `(role, issue)` pair is
//! refused for an exponentially growing window. The window doubles per
//! recorded failure, capped in duration and in counted attempts; the first
//! successful session for the pair resets it.

use monoco_core::{IssueId, Role};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Refusal details for an active cool-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    /// Time until scheduling may resume.
    pub retry_after: Duration,
    /// Failures recorded so far.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    attempts: u32,
    until: Instant,
}

/// Per-`(role, issue)` failure cool-down tracker.
#[derive(Debug)]
pub struct CooldownGuard {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    entries: std::sync::Mutex<HashMap<(Role, IssueId), Entry>>,
}

impl CooldownGuard {
    /// Create a guard from the configured policy.
    #[must_use]
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            entries: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Build from the configuration section.
    #[must_use]
    pub fn from_config(section: &monoco_config::FailureCooldownSection) -> Self {
        Self::new(section.initial(), section.max(), section.attempts)
    }

    /// Window length after `attempts` failures: `initial * 2^(attempts-1)`,
    /// capped at `max`. Attempts beyond the counted maximum keep the cap.
    fn window(&self, attempts: u32) -> Duration {
        let exponent = attempts
            .saturating_sub(1)
            .min(self.max_attempts.saturating_sub(1));
        let window = self
            .initial
            .saturating_mul(2_u32.saturating_pow(exponent));
        window.min(self.max)
    }

    /// Check whether the pair may be scheduled now.
    ///
    /// # Errors
    ///
    /// Returns the refusal details while the cool-down is active.
    pub fn check(&self, role: Role, issue_id: &IssueId) -> Result<(), CooldownStatus> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = entries.get(&(role, issue_id.clone())) {
            let now = Instant::now();
            if entry.until > now {
                return Err(CooldownStatus {
                    retry_after: entry.until.duration_since(now),
                    attempts: entry.attempts,
                });
            }
        }
        Ok(())
    }

    /// Record one failure; returns the refusal details now in force.
    pub fn record_failure(&self, role: Role, issue_id: &IssueId) -> CooldownStatus {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = entries
            .entry((role, issue_id.clone()))
            .or_insert(Entry {
                attempts: 0,
                until: Instant::now(),
            });
        entry.attempts = entry.attempts.saturating_add(1);
        let window = self.window(entry.attempts);
        entry.until = Instant::now().checked_add(window).unwrap_or_else(Instant::now);

        debug!(
            %role,
            issue_id = %issue_id,
            attempts = entry.attempts,
            window_secs = window.as_secs(),
            "failure recorded, cool-down armed"
        );
        CooldownStatus {
            retry_after: window,
            attempts: entry.attempts,
        }
    }

    /// Reset the pair after a successful session.
    pub fn record_success(&self, role: Role, issue_id: &IssueId) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.remove(&(role, issue_id.clone())).is_some() {
            debug!(%role, issue_id = %issue_id, "cool-down cleared after success");
        }
    }
}
