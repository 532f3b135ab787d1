use serde::Serialize;

use programsync_core::event::{clamp_percent, percent_of};
use programsync_core::{CompletionStatus, SyncProgressEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Started,
    Discovering,
    Syncing,
    Complete,
    Failed,
}

impl SyncPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started | Self::Discovering | Self::Syncing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Projection of a sync session's events, as shown to the UI.
///
/// Counters only move forward within a session; a `progress` event reporting
/// less than what was already seen is clamped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Number of sessions started so far; 0 before the first sync
    pub session: u64,
    pub to_sync: Option<u64>,
    pub synced: u64,
    pub total: u64,
    pub percent: u8,
    pub completion: Option<CompletionStatus>,
    pub added: Option<u64>,
    pub error: Option<String>,
    pub last_event: Option<SyncProgressEvent>,
}

impl SyncProgress {
    /// Reset for a new session.
    pub fn begin_session(&mut self) {
        *self = Self {
            session: self.session + 1,
            ..Self::default()
        };
    }

    /// Apply one event. Events arriving after the terminal one are ignored.
    pub fn apply(&mut self, event: &SyncProgressEvent) {
        if self.phase.is_terminal() {
            return;
        }
        match event {
            SyncProgressEvent::Start => {
                self.phase = SyncPhase::Started;
            }
            SyncProgressEvent::Info { to_sync, .. } => {
                self.to_sync = Some(*to_sync);
                self.total = self.total.max(*to_sync);
                if self.phase != SyncPhase::Syncing {
                    self.phase = SyncPhase::Discovering;
                }
            }
            SyncProgressEvent::Progress {
                synced,
                total,
                percent,
            } => {
                self.phase = SyncPhase::Syncing;
                self.synced = self.synced.max(*synced);
                self.total = self.total.max(*total);
                let reported = percent
                    .map(clamp_percent)
                    .unwrap_or_else(|| percent_of(self.synced, self.total));
                self.percent = self.percent.max(reported);
            }
            SyncProgressEvent::Complete { status, added } => {
                self.phase = SyncPhase::Complete;
                self.completion = Some(*status);
                self.added = *added;
                self.percent = 100;
            }
            SyncProgressEvent::Error { message } => {
                self.phase = SyncPhase::Failed;
                self.error = Some(message.clone());
            }
        }
        self.last_event = Some(event.clone());
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match self.phase {
            SyncPhase::Idle => "idle".to_string(),
            SyncPhase::Started => "sync started".to_string(),
            SyncPhase::Discovering => match self.to_sync {
                Some(n) => format!("{n} programs to sync"),
                None => "discovering".to_string(),
            },
            SyncPhase::Syncing => {
                format!("{}/{} synced ({}%)", self.synced, self.total, self.percent)
            }
            SyncPhase::Complete => match (self.completion, self.added) {
                (Some(CompletionStatus::UpToDate), _) => "already up to date".to_string(),
                (_, Some(added)) => format!("synced {added} new programs"),
                _ => "sync complete".to_string(),
            },
            SyncPhase::Failed => format!(
                "sync failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
