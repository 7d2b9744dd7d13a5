//! `agentrelay chat`: interactive session on stdin.

use std::io::Write;
use std::path::Path;

use agentrelay_agent::RunOptions;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::run::stream_goal;
use super::{CliResult, build_swarm, load_config, report};

pub async fn run(config_override: Option<&Path>, agent: Option<String>) -> CliResult {
    let config = load_config(config_override)?;
    let swarm = build_swarm(&config)?;
    let handle = swarm.create_session(agent.as_deref()).await?;

    println!();
    println!("  AgentRelay: interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Agent:     {}", handle.agent);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        if let Err(e) = stream_goal(&swarm, &handle.id, line, RunOptions::default()).await {
            report(&e);
        }
        if let Ok(status) = swarm.get_status(&handle.id).await {
            tracing::debug!(agent = %status.agent, turns = status.turns, "Turn finished");
        }
        println!();
    }

    swarm.shutdown().await;
    println!("  Goodbye!");
    Ok(())
}
