use anyhow::{Result, bail};
use std::path::Path;

use programsync_core::SyncProgressEvent;
use programsync_sync::{Orchestrator, SyncOutcome, SyncProgress};

use crate::context;
use crate::output;

/// `programsync sync`: one session, rendered as it progresses.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let (_, orchestrator) = context::connect(config_path)?;
    match sync_with_progress(&orchestrator).await {
        SyncOutcome::Finished {
            terminal: SyncProgressEvent::Error { message },
            ..
        } => bail!("Sync failed: {message}"),
        _ => Ok(()),
    }
}

/// Run a sync, printing a line per progress change and the refreshed counts.
pub async fn sync_with_progress(orchestrator: &Orchestrator) -> SyncOutcome {
    let mut updates = orchestrator.subscribe_progress();
    let mut last = String::new();
    let sync = orchestrator.sync();
    tokio::pin!(sync);

    let outcome = loop {
        tokio::select! {
            outcome = &mut sync => break outcome,
            Ok(()) = updates.changed() => {
                print_if_new(&mut last, render(&updates.borrow_and_update()));
            }
        }
    };
    print_if_new(&mut last, render(&orchestrator.progress()));

    if let SyncOutcome::Finished {
        sessions_run,
        refreshed,
        ..
    } = &outcome
    {
        if *sessions_run > 1 {
            println!("Ran {sessions_run} sync sessions (queued triggers)");
        }
        println!("Refreshed:");
        for refresh in refreshed {
            println!("{}", output::refresh_line(refresh));
        }
    }
    outcome
}

fn print_if_new(last: &mut String, line: String) {
    if *last != line {
        println!("{line}");
        *last = line;
    }
}

fn render(progress: &SyncProgress) -> String {
    format!("[sync {}] {}", progress.session, progress.summary())
}
