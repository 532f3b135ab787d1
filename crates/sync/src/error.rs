use programsync_core::QueryKey;

/// Errors surfaced by the sync layer.
///
/// Cloneable so one failed load can be handed to every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("failed to load programs for {key}: {message}")]
    Load { key: QueryKey, message: String },

    #[error("load task for {key} ended without a result")]
    TaskAborted { key: QueryKey },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn load(key: &QueryKey, err: &anyhow::Error) -> Self {
        Self::Load {
            key: key.clone(),
            message: format!("{err:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
