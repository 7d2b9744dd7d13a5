//! `agentrelay batch`: run a JSON file of goals in parallel sessions.
//!
//! Input is an array of `{"id", "goal", "agent"?, "script"?}` objects;
//! the results are printed as a JSON array in the same order.

use std::path::Path;

use agentrelay_agent::{BatchOptions, BatchRequest};

use super::{CliResult, build_swarm, load_config};

pub async fn run(
    config_override: Option<&Path>,
    input: &Path,
    concurrency: Option<usize>,
    batch_size: Option<usize>,
) -> CliResult {
    let config = load_config(config_override)?;
    let swarm = build_swarm(&config)?;

    let requests: Vec<BatchRequest> = serde_json::from_str(&std::fs::read_to_string(input)?)?;
    let defaults = swarm.options().batch;
    let options = BatchOptions {
        concurrency: concurrency.unwrap_or(defaults.concurrency),
        batch_size: batch_size.unwrap_or(defaults.batch_size),
    };
    if options.concurrency == 0 || options.batch_size == 0 {
        return Err("concurrency and batch size must be greater than 0".into());
    }

    let results = swarm.run_batch(requests, Some(options)).await;
    let failed = results.iter().filter(|r| !r.is_ok()).count();

    println!("{}", serde_json::to_string_pretty(&results)?);
    if failed > 0 {
        eprintln!("{failed} of {} requests failed", results.len());
    }
    Ok(())
}
