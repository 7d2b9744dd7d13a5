//! `agentrelay run`: run one goal in a fresh session.

use std::io::Write;
use std::path::{Path, PathBuf};

use agentrelay_agent::{AgentStreamEvent, RunOptions, Swarm};
use futures::StreamExt;

use super::{CliResult, build_swarm, load_config};

pub struct RunArgs {
    pub goal: String,
    pub agent: Option<String>,
    pub script: Option<PathBuf>,
    pub stream: bool,
}

pub async fn run(config: Option<&Path>, args: RunArgs) -> CliResult {
    let config = load_config(config)?;
    let swarm = build_swarm(&config)?;

    let script = args.script.as_deref().map(std::fs::read_to_string).transpose()?;
    let options = RunOptions { script };

    let handle = swarm.create_session(args.agent.as_deref()).await?;
    tracing::debug!(session_id = %handle.id, agent = %handle.agent, "Session ready");

    let result = if args.stream {
        stream_goal(&swarm, &handle.id, &args.goal, options).await
    } else {
        swarm
            .run_session(&handle.id, &args.goal, options)
            .await
            .map(|output| println!("{output}"))
    };

    // Best effort: the run's error is the one worth reporting.
    if let Err(e) = swarm.end_session(&handle.id).await {
        tracing::warn!(error = %e, "Failed to end session");
    }

    result.map_err(Into::into)
}

/// Print deltas as they arrive; tool activity goes to stderr.
pub async fn stream_goal(
    swarm: &Swarm,
    session_id: &str,
    goal: &str,
    options: RunOptions,
) -> agentrelay_core::Result<()> {
    let mut events = swarm.run_session_stream(session_id, goal, options).await?;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        let event = event?;
        if let Some(text) = event.text() {
            print!("{text}");
            let _ = stdout.flush();
            continue;
        }
        match event {
            AgentStreamEvent::ToolResult(record) => {
                eprintln!("  [{}] {}", record.tool_name, record.output);
            }
            AgentStreamEvent::Handoff { from, to, .. } => {
                eprintln!("  [handoff] {from} -> {to}");
            }
            AgentStreamEvent::Done(_) => println!(),
            _ => {}
        }
    }
    Ok(())
}
