//! Persisted session records.
//!
//! A session is the runtime identity of one spawned agent. The record is
//! written to disk on every status transition and retained for audit.

use crate::error::{CoreError, CoreResult};
use crate::task::AgentTask;
use crate::types::{SessionId, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a session entered the `Terminated` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    /// `terminate()` was called explicitly.
    Requested,
    /// The task's timeout watchdog fired.
    Timeout,
    /// Daemon shutdown terminated all running sessions.
    Shutdown,
}

/// Durable record of one supervised agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier.
    pub session_id: SessionId,
    /// Snapshot of the task that produced this session.
    pub task: AgentTask,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// OS process id while running.
    pub pid: Option<u32>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the child process was spawned.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Process exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Directory holding the session's stdout/stderr streams.
    pub log_location: Option<PathBuf>,
    /// Session that spawned this one (subagents only).
    pub parent_session_id: Option<SessionId>,
    /// Subagent nesting depth (0 for top-level sessions).
    pub depth: u32,
    /// Human-readable failure reason (`spawn_failure`, `daemon_restart`, ...).
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Set when the session was terminated; distinguishes timeout kills.
    #[serde(default)]
    pub termination: Option<TerminationKind>,
}

impl SessionRecord {
    /// Create a pending record for a freshly accepted task.
    #[must_use]
    pub fn pending(task: AgentTask) -> Self {
        let parent_session_id = task.metadata.parent_session_id;
        let depth = task.metadata.depth;
        Self {
            session_id: SessionId::new(),
            task,
            status: SessionStatus::Pending,
            pid: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            exit_code: None,
            log_location: None,
            parent_session_id,
            depth,
            failure_reason: None,
            termination: None,
        }
    }

    /// Move to a new status, enforcing monotone transitions.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] if the transition is not
    /// allowed from the current status.
    pub fn transition(&mut self, next: SessionStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next == SessionStatus::Running {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }

    /// Whether the session is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Age of the session since spawn, if it has started.
    #[must_use]
    pub fn running_age(&self) -> Option<chrono::Duration> {
        self.started_at.map(|started| {
            // now >= started_at by construction
            #[allow(clippy::arithmetic_side_effects)]
            {
                Utc::now() - started
            }
        })
    }
}
