//! Configuration error types.

use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    ReadError {
        /// The file path.
        path: String,
        /// The IO error.
        source: std::io::Error,
    },

    /// A configuration file failed to parse as TOML.
    #[error("cannot parse config file {path}: {source}")]
    ParseError {
        /// The file path.
        path: String,
        /// The TOML error.
        source: toml::de::Error,
    },

    /// The merged tree does not match the configuration schema.
    #[error("invalid configuration: {0}")]
    SchemaError(toml::de::Error),

    /// A semantic validation rule failed.
    #[error("configuration validation failed: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
