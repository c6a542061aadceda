use anyhow::{Context, Result};
use chrono::Utc;

use pacer::config::Config;
use pacer::scheduler::{compute, DistributionStatus, PersistenceAdapter};
use pacer::storage::open_store;

/// Print the persisted run, if any
pub fn status(config: &Config, json: bool) -> Result<()> {
    let store = open_store(&config.storage)?;

    let Some(state) = store.load().context("Failed to read saved state")? else {
        println!("No saved distribution");
        return Ok(());
    };

    let delays = compute(&state.spec, &state.local_start())?;
    let status = DistributionStatus::from_state(&state, &delays, Utc::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", status.display());
    }
    Ok(())
}

/// Discard the persisted run
pub fn clear(config: &Config) -> Result<()> {
    let store = open_store(&config.storage)?;
    store.clear().context("Failed to clear saved state")?;

    tracing::info!(backend = %config.storage.backend, "Cleared saved distribution state");
    println!("Saved distribution cleared");
    Ok(())
}
