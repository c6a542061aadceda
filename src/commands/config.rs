use anyhow::{Context, Result};
use std::path::Path;

use pacer::config::Config;

/// Print the effective configuration as TOML
pub fn config_show(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Write the effective configuration to a file
pub fn config_init(config: &Config, output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    config
        .save_to_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Wrote configuration to {}", output.display());
    Ok(())
}
