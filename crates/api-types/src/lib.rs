//! Request/response types for the programs API.
//!
//! Only the client side lives in this workspace; the server is a black box that
//! answers with these shapes.

use serde::{Deserialize, Serialize};

pub use programsync_core::{BusinessRef, Program, ProgramStatus, SyncProgressEvent};

// ─── Programs ────────────────────────────────────────────────────────────────

/// Query string for `GET /api/programs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramListQuery {
    pub status: String,
    pub offset: u64,
    pub limit: u64,
}

/// Query string for `GET /api/programs/all`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramBulkQuery {
    pub status: String,
}

/// Response of both the paged and the bulk list endpoints.
///
/// `total` may be absent, in which case callers fall back to the number of
/// programs in the page. The diagnostic fields are set when the server
/// answered from a degraded source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgramListResponse {
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
}

impl ProgramListResponse {
    pub fn page(programs: Vec<Program>, total: u64) -> Self {
        Self {
            programs,
            total: Some(total),
            ..Self::default()
        }
    }

    /// Reported total, or the page length when the server omitted it.
    pub fn total_or_len(&self) -> u64 {
        self.total.unwrap_or(self.programs.len() as u64)
    }
}

// ─── Sync ────────────────────────────────────────────────────────────────────

/// Body of `POST /api/programs/sync`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRequest {
    /// Restrict the sync to these status keys; empty means everything
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}
