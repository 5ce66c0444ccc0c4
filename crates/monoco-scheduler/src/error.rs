//! Scheduler error types.

use monoco_core::{IssueId, Role, SessionId};
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the agent scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task names an engine with no registered adapter.
    #[error("engine not registered: {name}")]
    EngineNotRegistered {
        /// The engine name.
        name: String,
    },

    /// The task's engine cannot run without interactive confirmation.
    #[error("engine {name} does not support unattended mode")]
    UnattendedUnsupported {
        /// The engine name.
        name: String,
    },

    /// The role's quota is zero or `reject_if_full` hit a full quota.
    #[error("quota exhausted for role {role}")]
    QuotaExhausted {
        /// The refused role.
        role: Role,
    },

    /// The task would exceed the subagent depth limit.
    #[error("subagent depth {depth} exceeds the limit of {max}")]
    SubagentDepthExceeded {
        /// Requested depth.
        depth: u32,
        /// Configured limit.
        max: u32,
    },

    /// The failure cool-down guard refused the `(role, issue)` pair.
    #[error("cool-down active for {role}/{issue_id}, retry in {retry_after:?}")]
    CooldownActive {
        /// The refused role.
        role: Role,
        /// The issue under cool-down.
        issue_id: IssueId,
        /// Time until scheduling may resume.
        retry_after: Duration,
    },

    /// A session state transition could not be persisted; the transition was
    /// aborted and the prior state retained.
    #[error("failed to persist session {session_id}: {reason}")]
    PersistFailed {
        /// The session whose transition was aborted.
        session_id: SessionId,
        /// What went wrong.
        reason: String,
    },

    /// The child process could not be spawned.
    #[error("failed to spawn agent process: {0}")]
    SpawnFailed(std::io::Error),

    /// No session with the given id exists.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The unknown session.
        session_id: SessionId,
    },

    /// The scheduler is shutting down and accepts no new work.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// Core type error.
    #[error(transparent)]
    Core(#[from] monoco_core::CoreError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<monoco_engine::EngineError> for SchedulerError {
    fn from(error: monoco_engine::EngineError) -> Self {
        match error {
            monoco_engine::EngineError::NotRegistered { name } => {
                Self::EngineNotRegistered { name }
            },
            monoco_engine::EngineError::UnattendedUnsupported { name } => {
                Self::UnattendedUnsupported { name }
            },
        }
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
