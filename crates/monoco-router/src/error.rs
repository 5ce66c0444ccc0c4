//! Router error types.

use thiserror::Error;

/// Errors produced by rule compilation and routing.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A rule failed to compile (bad regex, unknown kind or role).
    #[error("invalid routing rule `{name}`: {reason}")]
    InvalidRule {
        /// Rule name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// No rule matched and no fallback was present.
    ///
    /// Reachable only when the seeded fallback was explicitly disabled.
    #[error("no routing rule matched for session {session_id}")]
    NoMatch {
        /// External conversation id.
        session_id: String,
    },
}

/// Result type for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;
