//! Config file discovery and layered loading.
//!
//! The load algorithm:
//! 1. Parse the embedded `defaults.toml` → base tree
//! 2. Deep-merge `~/.monoco/config.toml` (user layer)
//! 3. Deep-merge `{workspace}/.monoco/config.toml` (workspace layer)
//! 4. Deserialize the merged tree → [`Config`]
//! 5. Validate

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Load the layered configuration for a workspace.
///
/// `monoco_home_override` bypasses user-layer discovery (useful in tests).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any layer is unreadable or malformed, or if
/// the merged configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    monoco_home_override: Option<&Path>,
) -> ConfigResult<Config> {
    let user_path = monoco_home_override
        .map(|home| home.join("config.toml"))
        .or_else(user_config_path);
    let workspace_path =
        workspace_root.map(|root| root.join(".monoco").join("config.toml"));

    load_from_tables(user_path.as_deref(), workspace_path.as_deref())
}

/// Load from explicit layer paths (missing files are skipped).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any present layer is unreadable or malformed,
/// or if the merged configuration fails validation.
pub fn load_from_tables(
    user_path: Option<&Path>,
    workspace_path: Option<&Path>,
) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_string(),
            source: e,
        })?;

    for path in [user_path, workspace_path].into_iter().flatten() {
        if let Some(overlay) = try_load_file(path)? {
            deep_merge(&mut merged, overlay);
            info!(path = %path.display(), "loaded config layer");
        } else {
            debug!(path = %path.display(), "config layer absent, skipped");
        }
    }

    let config: Config = merged
        .try_into()
        .map_err(ConfigError::SchemaError)?;
    validate(&config)?;
    Ok(config)
}

/// Read and parse one layer, returning `None` if the file does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };
    let value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Merge `overlay` into `base`. Tables merge recursively; everything else
/// (including arrays, so rule lists replace wholesale) overwrites.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    },
                }
            }
        },
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// The user configuration path (`~/.monoco/config.toml`).
fn user_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".monoco").join("config.toml"))
}
