//! Sync progress events as pushed by the server's sync stream.
//!
//! The stream body is line oriented:
//! ```text
//! data: {"type":"start"}
//! data: {"type":"info","to_sync":12}
//! data: {"type":"progress","synced":6,"total":12}
//!
//! data: {"type":"complete","status":"synced","added":12}
//! ```
//!
//! Blank lines are separators. Every other line must carry the `data:` marker
//! followed by one JSON event.

use serde::{Deserialize, Deserializer, Serialize};

/// Marker that prefixes every event line.
pub const EVENT_MARKER: &str = "data:";

/// How a sync session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Nothing new on the remote side
    #[serde(alias = "already_up_to_date")]
    UpToDate,
    /// New programs were pulled in
    Synced,
}

/// One event of a sync session.
///
/// `complete` and `error` are terminal: exactly one of them ends a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncProgressEvent {
    Start,
    Info {
        /// Number of programs the server discovered that need syncing
        to_sync: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        already_synced: Option<u64>,
    },
    Progress {
        synced: u64,
        total: u64,
        /// Server-derived percentage; may be fractional or out of range.
        #[serde(
            default,
            deserialize_with = "lenient_percent",
            skip_serializing_if = "Option::is_none"
        )]
        percent: Option<f64>,
    },
    Complete {
        status: CompletionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        added: Option<u64>,
    },
    Error {
        message: String,
    },
}

impl SyncProgressEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Event name as it appears in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Info { .. } => "info",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// Percentage of `synced` over `total`, clamped to 0..=100.
pub fn percent_of(synced: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = synced.saturating_mul(100) / total;
    pct.min(100) as u8
}

/// Project a reported percentage onto 0..=100, rounding to the nearest point.
pub fn clamp_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Accept numbers of any shape and numeric strings (`"42"`, `"42%"`).
/// Anything else reads as absent rather than failing the whole event.
fn lenient_percent<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }))
}

/// Errors for a single stream line
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EventLineError {
    #[error("line is missing the `data:` marker: {0:?}")]
    MissingMarker(String),
    #[error("invalid event JSON {line:?}: {source}")]
    InvalidJson {
        line: String,
        source: serde_json::Error,
    },
}

/// Parse one complete stream line.
///
/// Returns `Ok(None)` for blank lines and lines whose payload is empty.
pub fn parse_event_line(line: &str) -> Result<Option<SyncProgressEvent>, EventLineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let Some(payload) = line.strip_prefix(EVENT_MARKER) else {
        return Err(EventLineError::MissingMarker(line.to_string()));
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|source| EventLineError::InvalidJson {
            line: line.to_string(),
            source,
        })
}
