pub mod cache;
pub mod coalesce;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod progress;
pub mod source;
pub mod stream;

pub use cache::{CacheEntry, CacheStore, CacheView, Diagnostics};
pub use coalesce::Coalescer;
pub use error::{Result, SyncError};
pub use loader::AdaptiveLoader;
pub use orchestrator::{KeyRefresh, Orchestrator, OrchestratorSettings, SyncOutcome};
pub use progress::{SyncPhase, SyncProgress};
pub use source::{ChunkSource, ProgramSource, SyncStreamOpener};
pub use stream::{LineBuffer, SyncStreamConsumer};
