//! Semantic validation rules.
//!
//! Validation runs after the layers merge. Failures here are fatal at
//! startup and abort a runtime reload, leaving the previous configuration in
//! place.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, SubagentSection};

const KNOWN_ROLES: &[&str] = &["architect", "engineer", "reviewer", "coroner", "mailbox", "prime"];

const KNOWN_RULE_KINDS: &[&str] = &["command", "mention", "keyword", "regex", "fallback"];

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the first violated rule.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.scheduler.concurrency.global == 0 {
        return Err(ConfigError::Invalid(
            "scheduler.concurrency.global must be at least 1".to_string(),
        ));
    }

    for role in config.scheduler.concurrency.per_role.keys() {
        if !KNOWN_ROLES.contains(&role.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.concurrency.per_role names unknown role `{role}`"
            )));
        }
    }

    if config.scheduler.subagent.max_depth > SubagentSection::HARD_DEPTH_CAP {
        return Err(ConfigError::Invalid(format!(
            "scheduler.subagent.max_depth {} exceeds the hard cap of {}",
            config.scheduler.subagent.max_depth,
            SubagentSection::HARD_DEPTH_CAP
        )));
    }

    if config.scheduler.failure_cooldown.initial_secs == 0 {
        return Err(ConfigError::Invalid(
            "scheduler.failure_cooldown.initial_secs must be at least 1".to_string(),
        ));
    }
    if config.scheduler.failure_cooldown.max_secs < config.scheduler.failure_cooldown.initial_secs {
        return Err(ConfigError::Invalid(
            "scheduler.failure_cooldown.max_secs must be >= initial_secs".to_string(),
        ));
    }

    if config.watchers.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "watchers.poll_interval_secs must be at least 1".to_string(),
        ));
    }

    let builtin_engines = ["gemini", "claude", "kimi", "qwen", "local"];
    if !builtin_engines.contains(&config.scheduler.default_engine.as_str())
        && !config.engines.contains_key(&config.scheduler.default_engine)
    {
        return Err(ConfigError::Invalid(format!(
            "scheduler.default_engine `{}` is neither built in nor defined under engines.*",
            config.scheduler.default_engine
        )));
    }

    for (name, engine) in &config.engines {
        // Custom engines (no built-in adapter) must name their command.
        let builtin = builtin_engines.contains(&name.as_str());
        if !builtin && engine.command.is_none() {
            return Err(ConfigError::Invalid(format!(
                "engines.{name} is not built in and names no command"
            )));
        }
    }

    for rule in &config.routing.rules {
        if !KNOWN_RULE_KINDS.contains(&rule.kind.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "routing rule `{}` has unknown kind `{}`",
                rule.name, rule.kind
            )));
        }
        if !KNOWN_ROLES.contains(&rule.target_role.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "routing rule `{}` targets unknown role `{}`",
                rule.name, rule.target_role
            )));
        }
        if rule.kind != "fallback" && rule.pattern.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "routing rule `{}` ({}) has an empty pattern",
                rule.name, rule.kind
            )));
        }
    }

    Ok(())
}
