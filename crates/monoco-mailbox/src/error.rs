//! Mailbox error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the mailbox store and envelope codec.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The file has no `---` front matter delimiters.
    #[error("missing front matter delimiters")]
    MissingFrontMatter,

    /// The YAML front matter failed to parse or validate.
    #[error("malformed front matter: {0}")]
    MalformedFrontMatter(#[from] serde_yaml::Error),

    /// A path handed to the store does not belong to its layout.
    #[error("path is not inside the mailbox: {path}")]
    ForeignPath {
        /// The offending path.
        path: PathBuf,
    },

    /// The path's provider segment or filename could not be determined.
    #[error("cannot derive provider from path: {path}")]
    UnknownProvider {
        /// The offending path.
        path: PathBuf,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mailbox operations.
pub type MailboxResult<T> = Result<T, MailboxError>;
