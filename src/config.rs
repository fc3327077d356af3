//! Bridge configuration parsing, validation, and agent profiles.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

/// Name of the built-in envelope-stream agent profile.
pub const CLAUDE_PROFILE: &str = "claude";

/// Name of the built-in one-shot plain-text agent profile.
pub const PLAIN_PROFILE: &str = "plain";

/// How to launch and talk to one agent binary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentProfile {
    /// Bare command name resolved through `PATH`.
    pub command: String,
    /// Preferred user-local install location (`~/` is expanded).
    #[serde(default)]
    pub local_install: Option<String>,
    /// Mode flags always passed to the agent.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra flags passed when structured stdin is requested.
    #[serde(default)]
    pub structured_args: Vec<String>,
    /// Flag that precedes the session id when resuming.
    #[serde(default = "default_resume_flag")]
    pub resume_flag: String,
    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Regexes for stderr lines that are not worth reporting.
    #[serde(default = "default_benign_stderr")]
    pub benign_stderr: Vec<String>,
    /// Agent accepts the JSON stdin envelope.
    #[serde(default)]
    pub supports_structured_input: bool,
    /// Agent accepts tool-result answers on a still-open stdin.
    #[serde(default)]
    pub supports_in_band_answers: bool,
    /// Agent can resume a prior session by id.
    #[serde(default = "default_true")]
    pub supports_resume: bool,
}

fn default_resume_flag() -> String {
    "--session".into()
}

fn default_benign_stderr() -> Vec<String> {
    vec![r"(?i)^\s*model selected\b".into()]
}

fn default_true() -> bool {
    true
}

impl AgentProfile {
    /// Built-in profile for an envelope-stream agent with structured input.
    #[must_use]
    pub fn claude() -> Self {
        Self {
            command: "claude".into(),
            local_install: Some("~/.claude/local/claude".into()),
            args: vec![
                "-p".into(),
                "--output-format".into(),
                "stream-json".into(),
                "--verbose".into(),
            ],
            structured_args: vec!["--input-format".into(), "stream-json".into()],
            resume_flag: "--resume".into(),
            env: HashMap::new(),
            benign_stderr: default_benign_stderr(),
            supports_structured_input: true,
            supports_in_band_answers: true,
            supports_resume: true,
        }
    }

    /// Built-in profile for a one-shot agent reading plain text on stdin.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            command: "agent".into(),
            local_install: None,
            args: vec![
                "--print".into(),
                "--output-format".into(),
                "stream-json".into(),
            ],
            structured_args: Vec::new(),
            resume_flag: default_resume_flag(),
            env: HashMap::new(),
            benign_stderr: default_benign_stderr(),
            supports_structured_input: false,
            supports_in_band_answers: false,
            supports_resume: true,
        }
    }

    /// Build a profile around an arbitrary command with default settings.
    #[must_use]
    pub fn for_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::plain()
        }
    }

    /// Resolve the program to execute.
    ///
    /// Prefers [`local_install`](Self::local_install) when it names an
    /// existing file; otherwise returns the bare command for `PATH` lookup.
    #[must_use]
    pub fn resolve_program(&self, home: Option<&Path>) -> PathBuf {
        let local = self
            .local_install
            .as_deref()
            .and_then(|raw| expand_home(raw, home));
        if let Some(path) = local.filter(|p| p.is_file()) {
            debug!(path = %path.display(), "using user-local agent install");
            return path;
        }
        PathBuf::from(&self.command)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(AppError::Config(format!(
                "agent {name}: command must not be empty"
            )));
        }

        if self.supports_in_band_answers && !self.supports_structured_input {
            return Err(AppError::Config(format!(
                "agent {name}: in-band answers require structured input"
            )));
        }

        for pattern in &self.benign_stderr {
            regex::Regex::new(pattern).map_err(|err| {
                AppError::Config(format!(
                    "agent {name}: invalid benign_stderr pattern {pattern:?}: {err}"
                ))
            })?;
        }

        Ok(())
    }
}

fn expand_home(raw: &str, home: Option<&Path>) -> Option<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => home.map(|h| h.join(rest)),
        None => Some(PathBuf::from(raw)),
    }
}

fn default_agent() -> String {
    CLAUDE_PROFILE.into()
}

fn default_event_buffer() -> usize {
    32
}

fn default_exit_wait_seconds() -> u64 {
    10
}

fn default_termination_grace_seconds() -> u64 {
    5
}

/// Global bridge configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Profile used when the caller does not name one.
    #[serde(default = "default_agent")]
    pub default_agent: String,
    /// Capacity of the bounded event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Seconds to wait for process exit after stdout closes.
    #[serde(default = "default_exit_wait_seconds")]
    pub exit_wait_seconds: u64,
    /// Seconds between the graceful terminate signal and a forced kill.
    #[serde(default = "default_termination_grace_seconds")]
    pub termination_grace_seconds: u64,
    /// Agent profiles by name; merged over the built-ins.
    #[serde(default)]
    pub agents: HashMap<String, AgentProfile>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut config = Self {
            default_agent: default_agent(),
            event_buffer: default_event_buffer(),
            exit_wait_seconds: default_exit_wait_seconds(),
            termination_grace_seconds: default_termination_grace_seconds(),
            agents: HashMap::new(),
        };
        config.install_builtins();
        config
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, merge built-in profiles, and
    /// validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.install_builtins();
        config.validate()?;
        Ok(config)
    }

    /// Look up an agent profile, falling back to the default agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the named profile does not exist.
    pub fn profile(&self, name: Option<&str>) -> Result<&AgentProfile> {
        let name = name.unwrap_or(&self.default_agent);
        self.agents
            .get(name)
            .ok_or_else(|| AppError::Config(format!("unknown agent profile: {name}")))
    }

    /// Time to wait for the child to exit once stdout has closed.
    #[must_use]
    pub fn exit_wait(&self) -> Duration {
        Duration::from_secs(self.exit_wait_seconds)
    }

    /// Grace period between the terminate signal and a forced kill.
    #[must_use]
    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_seconds)
    }

    fn install_builtins(&mut self) {
        self.agents
            .entry(CLAUDE_PROFILE.into())
            .or_insert_with(AgentProfile::claude);
        self.agents
            .entry(PLAIN_PROFILE.into())
            .or_insert_with(AgentProfile::plain);
    }

    fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(AppError::Config(
                "event_buffer must be greater than zero".into(),
            ));
        }

        if !self.agents.contains_key(&self.default_agent) {
            return Err(AppError::Config(format!(
                "default_agent {} has no profile",
                self.default_agent
            )));
        }

        for (name, profile) in &self.agents {
            profile.validate(name)?;
        }

        Ok(())
    }
}
