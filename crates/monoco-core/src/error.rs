//! Core error types.

use thiserror::Error;

/// Errors produced by foundation types and filesystem helpers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Role name not recognized.
    #[error("unknown role: {role}")]
    UnknownRole {
        /// The offending role name.
        role: String,
    },

    /// Illegal session status transition.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: crate::types::SessionStatus,
        /// Requested status.
        to: crate::types::SessionStatus,
    },

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
