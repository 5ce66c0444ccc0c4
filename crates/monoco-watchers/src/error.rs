//! Watcher error types.

use thiserror::Error;

/// Errors that restart a watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Filesystem watcher backend failed to initialize.
    #[error("watch backend error: {0}")]
    Backend(#[from] notify::Error),

    /// IO error during a scan.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Mailbox store operation failed.
    #[error("mailbox error: {0}")]
    Mailbox(#[from] monoco_mailbox::MailboxError),
}

/// Result type for watcher operations.
pub type WatchResult<T> = Result<T, WatchError>;
