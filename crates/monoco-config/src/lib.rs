#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Layered configuration for the monoco workspace daemon.
//!
//! A single [`Config`] type consolidates the scheduler, watcher, engine, and
//! routing knobs. Every section implements [`Default`] with production
//! defaults, so a bare `[section]` header in TOML yields a working daemon.
//!
//! # Configuration precedence
//!
//! From lowest to highest priority:
//!
//! 1. **Embedded defaults** (`defaults.toml` compiled into the binary)
//! 2. **User** (`~/.monoco/config.toml`, or `$MONOCO_HOME/config.toml`)
//! 3. **Workspace** (`{workspace}/.monoco/config.toml`)
//!
//! Layers are deep-merged as TOML trees before deserialization, then the
//! merged configuration is validated. Validation failures are fatal at
//! startup; at runtime a reload replaces the whole configuration or nothing.

mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_from_tables};
pub use types::*;
pub use validate::validate;
