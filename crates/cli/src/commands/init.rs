//! `agentrelay init`: write a starter config.

use std::path::Path;

use agentrelay_config::AppConfig;

use super::{CliResult, config_path};

pub async fn run(config: Option<&Path>, force: bool) -> CliResult {
    let path = config_path(config);

    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;

    println!("Created {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Add your API key to the file or export AGENTRELAY_API_KEY");
    println!("  2. Adjust the [[agents]] entries");
    println!("  3. Run: agentrelay run \"What is 12 * 7?\"");
    Ok(())
}
