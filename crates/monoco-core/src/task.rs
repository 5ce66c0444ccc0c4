//! The immutable task descriptor consumed by the scheduler.

use crate::types::{IssueId, Role, SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Working-directory isolation for a spawned agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Run in the project root.
    #[default]
    Root,
    /// Check out a feature branch in the project root.
    Branch,
    /// Run in a dedicated git worktree.
    Worktree,
}

/// Metadata attached to a task at creation time.
///
/// Known keys are typed; anything else a handler wants to carry rides in
/// `extra` and survives serialization untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskMetadata {
    /// Working-directory isolation strategy.
    pub isolation: Isolation,
    /// Refuse immediately instead of waiting when quotas are exhausted.
    pub reject_if_full: bool,
    /// Session that spawned this task (subagents only).
    pub parent_session_id: Option<SessionId>,
    /// Subagent nesting depth (0 for top-level tasks).
    pub depth: u32,
    /// Opaque key/value payload.
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// Immutable descriptor for one scheduler invocation.
///
/// Created by an event handler, consumed by the scheduler. Never mutated:
/// runtime state lives on the session record, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    /// Unique task identifier.
    pub task_id: TaskId,
    /// Role the spawned agent plays.
    pub role: Role,
    /// Issue this task works on, if any.
    pub issue_id: Option<IssueId>,
    /// Prompt handed to the agent process.
    pub prompt: String,
    /// Engine (provider) name, resolved against the adapter registry.
    pub engine: String,
    /// Wall-clock budget; a watchdog terminates the session at expiry.
    pub timeout: Option<Duration>,
    /// Task metadata.
    pub metadata: TaskMetadata,
}

impl AgentTask {
    /// Create a task with default metadata.
    #[must_use]
    pub fn new(role: Role, prompt: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            task_id: TaskId::new(),
            role,
            issue_id: None,
            prompt: prompt.into(),
            engine: engine.into(),
            timeout: None,
            metadata: TaskMetadata::default(),
        }
    }

    /// Attach an issue id.
    #[must_use]
    pub fn with_issue(mut self, issue_id: IssueId) -> Self {
        self.issue_id = Some(issue_id);
        self
    }

    /// Set the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark as a subagent of `parent`, one level deeper.
    #[must_use]
    pub fn with_parent(mut self, parent: SessionId, parent_depth: u32) -> Self {
        self.metadata.parent_session_id = Some(parent);
        self.metadata.depth = parent_depth.saturating_add(1);
        self
    }

    /// Replace the metadata wholesale.
    #[must_use]
    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
