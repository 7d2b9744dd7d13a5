//! AgentRelay CLI entry point.
//!
//! Commands:
//! - `init`     Write a starter config
//! - `run`      Run one goal in a fresh session
//! - `chat`     Interactive session
//! - `batch`    Run a file of goals in parallel sessions
//! - `agents`   List declared agents
//! - `status`   Show configuration and gateway health

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentrelay",
    about = "Multi-agent orchestration with tool calls and handoffs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.agentrelay/config.toml
    #[arg(short, long, global = true, env = "AGENTRELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run one goal and print the final answer
    Run {
        goal: String,

        /// Agent to start with (defaults to the entry agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// Plan file appended to the goal
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Print output as it streams
        #[arg(long)]
        stream: bool,
    },

    /// Chat interactively in one session
    Chat {
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Run a JSON array of goals in parallel sessions
    Batch {
        input: PathBuf,

        #[arg(long)]
        concurrency: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// List declared agents
    Agents,

    /// Show configuration and gateway health
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Init { force } => commands::init::run(config, force).await,
        Commands::Run {
            goal,
            agent,
            script,
            stream,
        } => {
            let args = commands::run::RunArgs {
                goal,
                agent,
                script,
                stream,
            };
            commands::run::run(config, args).await
        }
        Commands::Chat { agent } => commands::chat::run(config, agent).await,
        Commands::Batch {
            input,
            concurrency,
            batch_size,
        } => commands::batch::run(config, &input, concurrency, batch_size).await,
        Commands::Agents => commands::agents::run(config).await,
        Commands::Status => commands::status::run(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::report(e.as_ref());
            ExitCode::FAILURE
        }
    }
}
