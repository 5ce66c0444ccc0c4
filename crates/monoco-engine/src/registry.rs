//! The immutable engine registry.

use crate::adapter::{CliAdapter, EngineAdapter};
use crate::error::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Name → adapter mapping, frozen after construction.
pub struct EngineRegistry {
    adapters: HashMap<String, Arc<dyn EngineAdapter>>,
}

impl EngineRegistry {
    /// Seed the registry from built-ins plus configuration.
    ///
    /// Configuration sections override built-ins of the same name and define
    /// adapters for engines with no built-in counterpart.
    #[must_use]
    pub fn from_config(engines: &HashMap<String, monoco_config::EngineSection>) -> Self {
        let mut adapters: HashMap<String, Arc<dyn EngineAdapter>> = HashMap::new();

        for builtin in CliAdapter::builtins() {
            let adapter = match engines.get(builtin.name()) {
                Some(section) => builtin.with_config(section),
                None => builtin,
            };
            adapters.insert(adapter.name().to_string(), Arc::new(adapter));
        }

        for (name, section) in engines {
            if !adapters.contains_key(name) {
                adapters.insert(
                    name.clone(),
                    Arc::new(CliAdapter::from_config(name, section)),
                );
            }
        }

        debug!(engines = adapters.len(), "engine registry initialized");
        Self { adapters }
    }

    /// Look up an adapter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn EngineAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Look up an adapter that is schedulable: registered and unattended.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRegistered`] for unknown names and
    /// [`EngineError::UnattendedUnsupported`] for engines that require
    /// interactive confirmation.
    pub fn get_schedulable(&self, name: &str) -> EngineResult<Arc<dyn EngineAdapter>> {
        let adapter = self.get(name).ok_or_else(|| EngineError::NotRegistered {
            name: name.to_string(),
        })?;
        if !adapter.supports_unattended_mode() {
            return Err(EngineError::UnattendedUnsupported {
                name: name.to_string(),
            });
        }
        Ok(adapter)
    }

    /// Registered engine names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monoco_config::EngineSection;

    #[test]
    fn test_builtins_present() {
        let registry = EngineRegistry::from_config(&HashMap::new());
        for name in ["gemini", "claude", "kimi", "qwen", "local"] {
            assert!(registry.get(name).is_some(), "missing builtin {name}");
        }
    }

    #[test]
    fn test_unknown_engine() {
        let registry = EngineRegistry::from_config(&HashMap::new());
        assert!(matches!(
            registry.get_schedulable("davinci"),
            Err(EngineError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_config_disables_unattended() {
        let mut engines = HashMap::new();
        engines.insert(
            "claude".to_string(),
            EngineSection {
                command: None,
                args: Vec::new(),
                unattended_flag: None,
            },
        );
        let registry = EngineRegistry::from_config(&engines);
        assert!(matches!(
            registry.get_schedulable("claude"),
            Err(EngineError::UnattendedUnsupported { .. })
        ));
    }

    #[test]
    fn test_custom_engine_from_config() {
        let mut engines = HashMap::new();
        engines.insert(
            "codellm".to_string(),
            EngineSection {
                command: Some("codellm-cli".to_string()),
                args: vec!["--agent".to_string()],
                unattended_flag: Some("--yes".to_string()),
            },
        );
        let registry = EngineRegistry::from_config(&engines);
        let adapter = registry.get_schedulable("codellm").unwrap();
        let command = adapter.build_command("p", &HashMap::new());
        assert_eq!(command.program, "codellm-cli");
        assert_eq!(command.args, vec!["--agent", "--yes", "--prompt", "p"]);
    }
}
