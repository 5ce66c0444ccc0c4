//! The adapter contract and the generic CLI adapter.

use std::collections::HashMap;

/// A fully built agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    /// Binary to spawn.
    pub program: String,
    /// Arguments, prompt included.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
}

/// Maps a provider to an agent CLI invocation.
///
/// Provider differences live entirely behind this trait; the scheduler
/// treats every engine identically.
pub trait EngineAdapter: Send + Sync {
    /// Provider name the adapter is registered under.
    fn name(&self) -> &str;

    /// Build the argv for one agent run.
    fn build_command(&self, prompt: &str, env: &HashMap<String, String>) -> EngineCommand;

    /// Whether the provider can run without interactive confirmation.
    ///
    /// The scheduler refuses to schedule engines that return `false`.
    fn supports_unattended_mode(&self) -> bool;
}

/// Generic adapter for prompt-taking agent CLIs.
///
/// Covers every built-in provider and all configuration-defined ones: the
/// shape is always `program [base_args..] [unattended_flag] --prompt <text>`.
#[derive(Debug, Clone)]
pub struct CliAdapter {
    name: String,
    program: String,
    base_args: Vec<String>,
    unattended_flag: Option<String>,
}

impl CliAdapter {
    /// Create an adapter.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        base_args: Vec<String>,
        unattended_flag: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            base_args,
            unattended_flag,
        }
    }

    /// The `gemini` CLI.
    #[must_use]
    pub fn gemini() -> Self {
        Self::new("gemini", "gemini", Vec::new(), Some("--yolo".to_string()))
    }

    /// The `claude` CLI.
    #[must_use]
    pub fn claude() -> Self {
        Self::new(
            "claude",
            "claude",
            vec!["-p".to_string()],
            Some("--dangerously-skip-permissions".to_string()),
        )
    }

    /// The `kimi` CLI.
    #[must_use]
    pub fn kimi() -> Self {
        Self::new("kimi", "kimi", Vec::new(), Some("--auto-approve".to_string()))
    }

    /// The `qwen` CLI.
    #[must_use]
    pub fn qwen() -> Self {
        Self::new("qwen", "qwen", Vec::new(), Some("--yolo".to_string()))
    }

    /// A locally served model behind an OpenAI-compatible CLI shim.
    #[must_use]
    pub fn local() -> Self {
        Self::new(
            "local",
            "monoco-agent",
            Vec::new(),
            Some("--non-interactive".to_string()),
        )
    }

    /// All built-in adapters.
    #[must_use]
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::gemini(),
            Self::claude(),
            Self::kimi(),
            Self::qwen(),
            Self::local(),
        ]
    }

    /// Apply a configuration section over this adapter.
    #[must_use]
    pub fn with_config(mut self, section: &monoco_config::EngineSection) -> Self {
        if let Some(command) = &section.command {
            self.program.clone_from(command);
        }
        if !section.args.is_empty() {
            self.base_args.clone_from(&section.args);
        }
        // The configured flag is authoritative: absence disables scheduling
        // even for engines with a known built-in flag.
        self.unattended_flag.clone_from(&section.unattended_flag);
        self
    }

    /// Build an adapter purely from configuration (no built-in counterpart).
    #[must_use]
    pub fn from_config(name: &str, section: &monoco_config::EngineSection) -> Self {
        Self {
            name: name.to_string(),
            program: section.command.clone().unwrap_or_else(|| name.to_string()),
            base_args: section.args.clone(),
            unattended_flag: section.unattended_flag.clone(),
        }
    }
}

impl EngineAdapter for CliAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_command(&self, prompt: &str, env: &HashMap<String, String>) -> EngineCommand {
        let mut args = self.base_args.clone();
        if let Some(flag) = &self.unattended_flag {
            args.push(flag.clone());
        }
        args.push("--prompt".to_string());
        args.push(prompt.to_string());

        EngineCommand {
            program: self.program.clone(),
            args,
            env: env.clone(),
        }
    }

    fn supports_unattended_mode(&self) -> bool {
        self.unattended_flag.is_some()
    }
}
