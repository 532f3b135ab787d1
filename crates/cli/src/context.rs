use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use programsync_api_client::{ApiClient, RetryConfig};
use programsync_runtime_config::{SyncConfig, load_config};
use programsync_sync::{Orchestrator, ProgramSource, SyncStreamOpener};

/// Load config and wire an orchestrator to the configured server.
pub fn connect(config_path: Option<&Path>) -> Result<(SyncConfig, Orchestrator)> {
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config)?;
    Ok((config, orchestrator))
}

pub fn build_orchestrator(config: &SyncConfig) -> Result<Orchestrator> {
    let mut client = ApiClient::new(&config.server.url, config.server.timeout())
        .context("Failed to build HTTP client")?
        .with_retry(RetryConfig::exponential(config.server.max_retries as usize));
    client.set_auth(config.server.api_key.clone());
    debug!(
        "Using server {} (auth: {})",
        client.base_url(),
        client.auth_token().is_some()
    );

    let client = Arc::new(client);
    let source: Arc<dyn ProgramSource> = client.clone();
    let opener: Arc<dyn SyncStreamOpener> = client;
    Ok(Orchestrator::new(config, source, opener)?)
}
