use anyhow::{Context, Result};
use std::path::Path;

use programsync_runtime_config::{SyncConfig, config_path, load_config};

/// Print the effective configuration as TOML, with the API key masked.
pub fn run(explicit: Option<&Path>) -> Result<()> {
    let path = config_path(explicit)?;
    let config = load_config(explicit)?;

    let state = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("# Config file: {}{state}", path.display());
    print!("{}", render(&config)?);
    Ok(())
}

fn render(config: &SyncConfig) -> Result<String> {
    let mut shown = config.clone();
    shown.server.api_key = mask_key(&config.server.api_key);
    toml::to_string_pretty(&shown).context("Failed to render config")
}

fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let prefix: String = key.chars().take(8).collect();
    format!("{prefix}...")
}
