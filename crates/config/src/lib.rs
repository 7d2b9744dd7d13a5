//! Configuration loading, validation, and management for AgentRelay.
//!
//! Loads configuration from `~/.agentrelay/config.toml` with environment
//! variable overrides. Agents are declared here; tool handlers are code and
//! are registered separately.

use agentrelay_core::agent::{AgentDefinition, SuccessorTransfer, ToolChoice, find_successor_cycle};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The root configuration structure.
///
/// Maps directly to `~/.agentrelay/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model for agents that do not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Loop settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Batch run settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Declared agents
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("runtime", &self.runtime)
            .field("batch", &self.batch)
            .field("providers", &self.providers)
            .field("agents", &self.agents)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Assistant turns allowed per run; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    /// Per-tool timeout; none when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,

    /// Execute sibling tool calls concurrently
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,

    /// Agent new sessions start with when the caller does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_agent: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            tool_timeout_secs: None,
            parallel_tool_calls: true,
            entry_agent: None,
        }
    }
}

/// Batch run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Sessions in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Requests per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_concurrency() -> usize {
    3
}
fn default_batch_size() -> usize {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// A declared agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// System instructions
    pub system_message: String,

    /// Tools this agent may call
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub tool_choice: ToolChoice,

    /// Agent to defer to once this one stops calling tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successor: Option<String>,
}

impl AgentConfig {
    /// Build the runtime definition for this agent.
    pub fn to_definition(&self) -> AgentDefinition {
        let mut agent = AgentDefinition::new(&self.name, self.system_message.clone())
            .with_description(&self.description)
            .with_tools(self.allowed_tools.iter().cloned())
            .with_tool_choice(self.tool_choice.clone());
        if let Some(model) = &self.model {
            agent = agent.with_model(model);
        }
        if let Some(successor) = &self.successor {
            agent = agent.with_transfer(Arc::new(SuccessorTransfer::new(successor)));
        }
        agent
    }
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            name: "triage".into(),
            description: "Routes each request to the right specialist".into(),
            system_message: concat!(
                "You are a triage agent. Decide which specialist should handle the ",
                "request and call switch_agent with its name. Specialists: ",
                "math (arithmetic), weather (current conditions)."
            )
            .into(),
            allowed_tools: vec!["switch_agent".into()],
            model: None,
            tool_choice: ToolChoice::Auto,
            successor: None,
        },
        AgentConfig {
            name: "math".into(),
            description: "Solves arithmetic with the calculator".into(),
            system_message: "You solve arithmetic problems. Use the calculator tool for every computation.".into(),
            allowed_tools: vec!["calculator".into()],
            model: None,
            tool_choice: ToolChoice::Auto,
            successor: None,
        },
        AgentConfig {
            name: "weather".into(),
            description: "Reports current weather conditions".into(),
            system_message: "You report current weather. Use weather_lookup for every location mentioned.".into(),
            allowed_tools: vec!["weather_lookup".into()],
            model: None,
            tool_choice: ToolChoice::Auto,
            successor: None,
        },
    ]
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentrelay/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `AGENTRELAY_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load `path`, then apply the environment overrides `load` applies.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("AGENTRELAY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("AGENTRELAY_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("AGENTRELAY_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentrelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.runtime.max_turns == Some(0) {
            return Err(ConfigError::ValidationError(
                "runtime.max_turns must be at least 1".into(),
            ));
        }

        if self.batch.concurrency == 0 || self.batch.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch.concurrency and batch.batch_size must be at least 1".into(),
            ));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("agent name must not be empty".into()));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
        }

        for agent in &self.agents {
            if let Some(successor) = &agent.successor
                && !names.contains(successor.as_str())
            {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}' names unknown successor '{}'",
                    agent.name, successor
                )));
            }
        }

        let edges = self
            .agents
            .iter()
            .map(|a| (a.name.as_str(), a.successor.as_deref()));
        if let Some(cycle) = find_successor_cycle(edges) {
            return Err(ConfigError::ValidationError(format!(
                "successor cycle: {}",
                cycle.join(" -> ")
            )));
        }

        if let Some(entry) = &self.runtime.entry_agent
            && !names.contains(entry.as_str())
        {
            return Err(ConfigError::ValidationError(format!(
                "runtime.entry_agent '{entry}' is not a declared agent"
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The agent new sessions start with: `runtime.entry_agent`, else the
    /// first declared agent.
    pub fn entry_agent(&self) -> Option<&str> {
        self.runtime
            .entry_agent
            .as_deref()
            .or_else(|| self.agents.first().map(|a| a.name.as_str()))
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            runtime: RuntimeConfig::default(),
            batch: BatchConfig::default(),
            providers: HashMap::new(),
            agents: default_agents(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for agentrelay_core::Error {
    fn from(e: ConfigError) -> Self {
        agentrelay_core::Error::Config {
            message: e.to_string(),
        }
    }
}
