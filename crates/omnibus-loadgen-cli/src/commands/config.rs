//! Configuration commands.

use std::path::Path;

use anyhow::{Context, Result, bail};

/// Prints the merged configuration.
pub fn show(project_dir: Option<&Path>, format: &str) -> Result<()> {
    let config = super::load_config(project_dir).context("Failed to load configuration")?;

    match format {
        "toml" => print!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        other => bail!("unknown format '{other}' (expected toml or json)"),
    }
    Ok(())
}
