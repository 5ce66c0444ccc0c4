//! Configuration struct definitions.
//!
//! All types here are self-contained: domain enums (roles, rule kinds) stay
//! as plain strings and are converted at the integration boundary, so this
//! crate depends on nothing internal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for the monoco daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduler quotas, subagent limits, cool-down policy.
    pub scheduler: SchedulerSection,
    /// Filesystem watcher knobs.
    pub watchers: WatchersSection,
    /// Engine (provider) definitions, keyed by name.
    pub engines: HashMap<String, EngineSection>,
    /// Message routing rules.
    pub routing: RoutingSection,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Scheduler behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Concurrency quotas.
    pub concurrency: ConcurrencySection,
    /// Subagent limits.
    pub subagent: SubagentSection,
    /// Failure cool-down (swarm-storm guard).
    pub failure_cooldown: FailureCooldownSection,
    /// Grace window between cooperative and forced termination, seconds.
    pub terminate_grace_secs: u64,
    /// Exits within this window after spawn count as spawn failures, millis.
    pub spawn_window_ms: u64,
    /// Engine handlers schedule on unless a task says otherwise.
    pub default_engine: String,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencySection::default(),
            subagent: SubagentSection::default(),
            failure_cooldown: FailureCooldownSection::default(),
            terminate_grace_secs: 10,
            spawn_window_ms: 1_000,
            default_engine: "claude".to_string(),
        }
    }
}

impl SchedulerSection {
    /// Grace window as a [`Duration`].
    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }

    /// Spawn-failure window as a [`Duration`].
    #[must_use]
    pub fn spawn_window(&self) -> Duration {
        Duration::from_millis(self.spawn_window_ms)
    }
}

/// Per-role and global concurrency caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySection {
    /// Total running sessions across all roles.
    pub global: usize,
    /// Per-role caps, keyed by role name.
    pub per_role: HashMap<String, usize>,
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        let per_role = [
            ("architect", 1),
            ("engineer", 4),
            ("reviewer", 2),
            ("coroner", 1),
            ("mailbox", 4),
        ]
        .into_iter()
        .map(|(role, cap)| (role.to_string(), cap))
        .collect();
        Self {
            global: 8,
            per_role,
        }
    }
}

impl ConcurrencySection {
    /// Cap for one role, falling back to the global cap.
    #[must_use]
    pub fn for_role(&self, role: &str) -> usize {
        self.per_role.get(role).copied().unwrap_or(self.global)
    }
}

/// Subagent nesting limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubagentSection {
    /// Maximum nesting depth. Hard-capped at [`SubagentSection::HARD_DEPTH_CAP`].
    pub max_depth: u32,
}

impl SubagentSection {
    /// Depth beyond which no configuration can reach.
    pub const HARD_DEPTH_CAP: u32 = 5;
}

impl Default for SubagentSection {
    fn default() -> Self {
        Self { max_depth: 3 }
    }
}

/// Failure cool-down policy per `(role, issue)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureCooldownSection {
    /// First cool-down window, seconds.
    pub initial_secs: u64,
    /// Cap on the exponential growth, seconds.
    pub max_secs: u64,
    /// Attempts counted before the window stops growing.
    pub attempts: u32,
}

impl Default for FailureCooldownSection {
    fn default() -> Self {
        Self {
            initial_secs: 60,
            max_secs: 1_800,
            attempts: 5,
        }
    }
}

impl FailureCooldownSection {
    /// Initial window as a [`Duration`].
    #[must_use]
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_secs)
    }

    /// Maximum window as a [`Duration`].
    #[must_use]
    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }
}

// ---------------------------------------------------------------------------
// Watchers
// ---------------------------------------------------------------------------

/// Filesystem watcher knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchersSection {
    /// Polling fallback interval, seconds.
    pub poll_interval_secs: u64,
    /// Force the polling backend even where native watching is available.
    pub force_polling: bool,
    /// Memo inbox watcher.
    pub memo: MemoSection,
    /// Mailbox inbound watcher.
    pub mailbox: MailboxSection,
}

impl Default for WatchersSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            force_polling: false,
            memo: MemoSection::default(),
            mailbox: MailboxSection::default(),
        }
    }
}

impl WatchersSection {
    /// Polling interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Memo accumulation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoSection {
    /// Unprocessed memo count that triggers the Architect.
    pub threshold: usize,
    /// Minimum gap between successive Architect spawns, seconds.
    pub min_gap_secs: u64,
}

impl Default for MemoSection {
    fn default() -> Self {
        Self {
            threshold: 5,
            min_gap_secs: 60,
        }
    }
}

impl MemoSection {
    /// Architect spawn gap as a [`Duration`].
    #[must_use]
    pub fn min_gap(&self) -> Duration {
        Duration::from_secs(self.min_gap_secs)
    }
}

/// Mailbox inbound debounce windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxSection {
    /// Per-provider quiescence windows, seconds. The `default` key applies
    /// to providers without an explicit entry.
    pub debounce: HashMap<String, u64>,
}

impl Default for MailboxSection {
    fn default() -> Self {
        // IM-style providers coalesce for 30 s; email delivers immediately.
        let debounce = [("default", 30), ("email", 0)]
            .into_iter()
            .map(|(provider, secs)| (provider.to_string(), secs))
            .collect();
        Self { debounce }
    }
}

impl MailboxSection {
    /// Debounce window for one provider.
    #[must_use]
    pub fn debounce_for(&self, provider: &str) -> Duration {
        let secs = self
            .debounce
            .get(provider)
            .or_else(|| self.debounce.get("default"))
            .copied()
            .unwrap_or(30);
        Duration::from_secs(secs)
    }
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

/// One engine (provider) definition.
///
/// Built-in engines only need `unattended_flag` to be enabled; custom
/// engines must also name the `command`. An engine without an unattended
/// flag can never be scheduled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Binary to invoke. Defaults to the built-in adapter's command.
    pub command: Option<String>,
    /// Extra arguments placed before the prompt.
    pub args: Vec<String>,
    /// Flag that disables interactive confirmation. Absence disables
    /// scheduling for this engine.
    pub unattended_flag: Option<String>,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Message routing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Rules evaluated in descending priority.
    pub rules: Vec<RuleSection>,
}

/// One routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSection {
    /// Unique rule name.
    pub name: String,
    /// Condition kind: `command`, `mention`, `keyword`, `regex`, `fallback`.
    pub kind: String,
    /// Pattern; ignored for `fallback`.
    #[serde(default)]
    pub pattern: String,
    /// Role dispatched to when the rule matches.
    pub target_role: String,
    /// Evaluation priority (higher first).
    pub priority: i32,
    /// Disabled rules are skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.concurrency.global, 8);
        assert_eq!(config.scheduler.concurrency.for_role("engineer"), 4);
        assert_eq!(config.scheduler.concurrency.for_role("architect"), 1);
        assert_eq!(config.scheduler.subagent.max_depth, 3);
        assert_eq!(config.scheduler.failure_cooldown.initial_secs, 60);
        assert_eq!(config.watchers.memo.threshold, 5);
        assert_eq!(config.watchers.poll_interval_secs, 2);
    }

    #[test]
    fn test_debounce_defaults() {
        let mailbox = MailboxSection::default();
        assert_eq!(mailbox.debounce_for("dingtalk"), Duration::from_secs(30));
        assert_eq!(mailbox.debounce_for("email"), Duration::ZERO);
    }

    #[test]
    fn test_bare_section_headers_deserialize() {
        let config: Config = toml::from_str("[scheduler]\n[watchers]\n").unwrap();
        assert_eq!(config.scheduler.concurrency.global, 8);
        assert_eq!(config.watchers.memo.threshold, 5);
    }

    #[test]
    fn test_rule_section_enabled_defaults_true() {
        let rule: RuleSection = toml::from_str(
            "name = \"r\"\nkind = \"keyword\"\npattern = \"bug\"\ntarget_role = \"engineer\"\npriority = 10\n",
        )
        .unwrap();
        assert!(rule.enabled);
    }
}
