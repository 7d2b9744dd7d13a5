//! `agentrelay status`: show configuration and check the gateway.

use std::path::Path;

use agentrelay_core::gateway::CompletionGateway;

use super::{CliResult, build_gateway, config_path, load_config};

pub async fn run(config_override: Option<&Path>) -> CliResult {
    let path = config_path(config_override);
    let config = load_config(config_override)?;

    println!("AgentRelay Status");
    println!("=================");
    println!("  Config:       {}", path.display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Temperature:  {}", config.default_temperature);
    println!(
        "  Max turns:    {}",
        config
            .runtime
            .max_turns
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!(
        "  Batch:        concurrency {}, batch size {}",
        config.batch.concurrency, config.batch.batch_size
    );
    println!("  Agents:       {}", config.agents.len());
    println!(
        "  Entry agent:  {}",
        config.entry_agent().unwrap_or("(none)")
    );

    if !path.exists() {
        println!("\n  No config file; run `agentrelay init` first");
        return Ok(());
    }

    match build_gateway(&config) {
        Ok(gateway) => match gateway.health_check().await {
            Ok(true) => println!("\n  Gateway '{}' reachable", gateway.name()),
            Ok(false) => println!("\n  Gateway '{}' responded with an error", gateway.name()),
            Err(e) => println!("\n  Gateway '{}' unreachable: {e}", gateway.name()),
        },
        Err(e) => println!("\n  Gateway not configured: {e}"),
    }
    Ok(())
}
