//! `agentrelay agents`: list declared agents.

use std::path::Path;

use super::{CliResult, load_config};

pub async fn run(config: Option<&Path>) -> CliResult {
    let config = load_config(config)?;
    let entry = config.entry_agent().unwrap_or_default().to_string();

    for agent in &config.agents {
        let marker = if agent.name == entry { "*" } else { " " };
        println!("{marker} {:<12} {}", agent.name, agent.description);
        if !agent.allowed_tools.is_empty() {
            println!("    tools:     {}", agent.allowed_tools.join(", "));
        }
        if let Some(model) = &agent.model {
            println!("    model:     {model}");
        }
        if let Some(successor) = &agent.successor {
            println!("    successor: {successor}");
        }
    }
    println!();
    println!("* entry agent");
    Ok(())
}
