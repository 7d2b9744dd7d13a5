//! Subcommand implementations and the setup they share.

pub mod agents;
pub mod batch;
pub mod chat;
pub mod init;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentrelay_agent::Swarm;
use agentrelay_config::AppConfig;
use agentrelay_core::error::{Error, Result};
use agentrelay_core::gateway::CompletionGateway;
use agentrelay_core::tool::ToolRegistry;

pub type CliResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Where the config lives: `--config`, else `~/.agentrelay/config.toml`.
pub fn config_path(overridden: Option<&Path>) -> PathBuf {
    overridden
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(overridden: Option<&Path>) -> Result<AppConfig> {
    Ok(AppConfig::load_with_env(&config_path(overridden))?)
}

/// Built-ins plus a `transfer_to_<agent>` tool for every declared agent.
pub fn build_tools(config: &AppConfig) -> Result<ToolRegistry> {
    let agents = config
        .agents
        .iter()
        .map(|a| (a.name.as_str(), a.description.as_str()));
    Ok(agentrelay_tools::registry_with_transfers(agents)?)
}

pub fn build_gateway(config: &AppConfig) -> Result<Arc<dyn CompletionGateway>> {
    if !config.has_api_key() && !agentrelay_providers::is_local_provider(&config.default_provider)
    {
        return Err(Error::Initialization(format!(
            "no API key for provider '{}'. Set AGENTRELAY_API_KEY, OPENROUTER_API_KEY or \
             OPENAI_API_KEY, or add api_key to {}",
            config.default_provider,
            AppConfig::config_dir().join("config.toml").display()
        )));
    }
    Ok(agentrelay_providers::build_from_config(config).default_gateway()?)
}

pub fn build_swarm(config: &AppConfig) -> Result<Swarm> {
    Swarm::init(config, build_gateway(config)?, build_tools(config)?)
}

/// Print an error as `[KIND] message`.
pub fn report(error: &(dyn std::error::Error + 'static)) {
    match error.downcast_ref::<Error>() {
        Some(e) => eprintln!("[{}] {e}", e.kind()),
        None => eprintln!("[ERROR] {error}"),
    }
}
