use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use programsync_sync::Orchestrator;

use crate::context;
use crate::output;
use crate::sync_cmd::sync_with_progress;

/// `programsync watch`: sync now, then every `watch_interval_secs` until
/// SIGINT/SIGTERM.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let (config, orchestrator) = context::connect(config_path)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let interval = config.sync.watch_interval();
    let handle = tokio::spawn(watch_loop(orchestrator, interval, shutdown_rx));

    wait_for_shutdown().await;
    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;
    Ok(())
}

async fn watch_loop(
    orchestrator: Orchestrator,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Watching for program changes every {}s", period.as_secs());
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tokio::select! {
                    _ = sync_with_progress(&orchestrator) => report(&orchestrator),
                    _ = shutdown.wait_for(|stop| *stop) => {
                        info!("Watch loop shutting down mid-sync");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Watch loop shutting down");
                    break;
                }
            }
        }
    }
}

fn report(orchestrator: &Orchestrator) {
    match orchestrator.active_view() {
        Some(view) => {
            println!("{}", output::view_header(&view, view.records.len()));
            if let Some(notice) = output::degraded_notice(&view.diagnostics) {
                println!("{notice}");
            }
        }
        None => warn!("No data loaded for {} yet", orchestrator.active_key()),
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to register signal handlers: {e}"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
