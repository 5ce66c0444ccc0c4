//! Engine error types.

use thiserror::Error;

/// Errors produced by the engine registry.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The named engine has no registered adapter.
    #[error("engine not registered: {name}")]
    NotRegistered {
        /// The engine name.
        name: String,
    },

    /// The engine cannot run without interactive confirmation.
    #[error("engine {name} does not support unattended mode")]
    UnattendedUnsupported {
        /// The engine name.
        name: String,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
