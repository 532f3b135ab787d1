//! Sync-then-load cycle over one client session's cache.
//!
//! A sync session streams remote progress; its terminal event (success or
//! failure) invalidates the active and cached keys and force-refreshes them
//! through the coalescer. Sessions never overlap: a trigger that arrives while
//! one is running is queued and runs right after it.

use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use programsync_core::{
    BusinessOption, FilterSpec, Program, QueryKey, SyncProgressEvent, build_options,
    filter_records,
};
use programsync_runtime_config::SyncConfig;

use crate::cache::{CacheEntry, CacheStore, CacheView};
use crate::coalesce::Coalescer;
use crate::error::{Result, SyncError};
use crate::loader::AdaptiveLoader;
use crate::progress::SyncProgress;
use crate::source::{ProgramSource, SyncStreamOpener};
use crate::stream::SyncStreamConsumer;

/// Values the orchestrator needs from [`SyncConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub ttl: Duration,
    pub page_size: u64,
    pub bulk_threshold: u64,
    pub active_key: QueryKey,
    pub prefetch_keys: Vec<QueryKey>,
    pub sync_on_start: bool,
    pub stall_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            ttl: config.cache.ttl(),
            page_size: config.cache.page_size,
            bulk_threshold: config.cache.bulk_threshold,
            active_key: QueryKey::new(config.cache.active_key.trim()),
            prefetch_keys: config
                .cache
                .prefetch_keys
                .iter()
                .map(|k| QueryKey::new(k.trim()))
                .collect(),
            sync_on_start: config.sync.sync_on_start,
            stall_timeout: config.sync.stall_timeout(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Outcome of a forced refresh for one key.
#[derive(Debug, Clone)]
pub struct KeyRefresh {
    pub key: QueryKey,
    pub result: Result<Arc<CacheEntry>>,
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// This call ran one or more sessions (queued reruns included).
    Finished {
        /// Terminal event of the last session
        terminal: SyncProgressEvent,
        sessions_run: u32,
        /// Refresh results from the last session
        refreshed: Vec<KeyRefresh>,
    },
    /// A session was already running; a rerun was queued behind it.
    Queued,
}

#[derive(Debug, Default)]
struct SessionState {
    running: bool,
    rerun_requested: bool,
}

struct Inner {
    settings: OrchestratorSettings,
    coalescer: Coalescer,
    loader: Arc<AdaptiveLoader>,
    opener: Arc<dyn SyncStreamOpener>,
    active_key: Mutex<QueryKey>,
    session: Mutex<SessionState>,
    progress: watch::Sender<SyncProgress>,
}

/// Clears the running flag if a sync is dropped before it finishes.
struct RunningGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.running = false;
        state.rerun_requested = false;
        self.inner.progress.send_modify(|progress| {
            if !progress.phase.is_terminal() {
                progress.apply(&SyncProgressEvent::error("sync session cancelled"));
            }
        });
    }
}

/// Owns the cache, pending-request table and progress state of one client
/// session. Cloning shares that state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: &SyncConfig,
        source: Arc<dyn ProgramSource>,
        opener: Arc<dyn SyncStreamOpener>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        Self::with_settings(OrchestratorSettings::from_config(config), source, opener)
    }

    pub fn with_settings(
        settings: OrchestratorSettings,
        source: Arc<dyn ProgramSource>,
        opener: Arc<dyn SyncStreamOpener>,
    ) -> Result<Self> {
        let loader = AdaptiveLoader::new(source, settings.page_size, settings.bulk_threshold)?;
        let coalescer = Coalescer::new(Arc::new(CacheStore::new()), settings.ttl);
        let (progress, _) = watch::channel(SyncProgress::default());
        Ok(Self {
            inner: Arc::new(Inner {
                active_key: Mutex::new(settings.active_key.clone()),
                settings,
                coalescer,
                loader: Arc::new(loader),
                opener,
                session: Mutex::new(SessionState::default()),
                progress,
            }),
        })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.inner.coalescer.cache()
    }

    pub fn active_key(&self) -> QueryKey {
        self.inner
            .active_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_active_key(&self, key: QueryKey) {
        *self
            .inner
            .active_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = key;
    }

    // ── Loading ───────────────────────────────────────────────────────────

    /// Cached entry for `key` if fresh, otherwise a (coalesced) load.
    pub async fn ensure(&self, key: &QueryKey) -> Result<Arc<CacheEntry>> {
        self.ensure_with(key, false).await
    }

    pub async fn ensure_with(&self, key: &QueryKey, force: bool) -> Result<Arc<CacheEntry>> {
        let loader = Arc::clone(&self.inner.loader);
        self.inner
            .coalescer
            .ensure(key, force, move |key| async move { loader.load(&key).await })
            .await
    }

    /// Invalidate and force-refresh the active, prefetch and cached keys.
    pub async fn refresh(&self) -> Vec<KeyRefresh> {
        let keys = self.refresh_keys();
        for key in &keys {
            self.cache().invalidate(key);
        }
        let results =
            futures::future::join_all(keys.iter().map(|key| self.ensure_with(key, true))).await;

        keys.into_iter()
            .zip(results)
            .map(|(key, result)| {
                match &result {
                    Ok(entry) => info!(
                        "Refreshed {key}: {} of {} programs",
                        entry.records.len(),
                        entry.total_count
                    ),
                    Err(e) => warn!("Refresh of {key} failed, keeping cached data: {e}"),
                }
                KeyRefresh { key, result }
            })
            .collect()
    }

    fn refresh_keys(&self) -> Vec<QueryKey> {
        let mut keys = vec![self.active_key()];
        let candidates = self
            .inner
            .settings
            .prefetch_keys
            .iter()
            .cloned()
            .chain(self.cache().keys());
        for key in candidates {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    // ── Sync sessions ─────────────────────────────────────────────────────

    /// Initial sync for a freshly mounted consumer, then the active entry.
    pub async fn mount(&self) -> Result<Arc<CacheEntry>> {
        if self.inner.settings.sync_on_start {
            self.sync().await;
        }
        self.ensure(&self.active_key()).await
    }

    pub fn is_syncing(&self) -> bool {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
    }

    /// Run a sync session to its terminal event and refresh the cache.
    ///
    /// If a session is already running this only queues a rerun and returns
    /// [`SyncOutcome::Queued`]; the running call picks the rerun up.
    pub async fn sync(&self) -> SyncOutcome {
        {
            let mut state = self
                .inner
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.running {
                state.rerun_requested = true;
                info!("Sync already running; queued a rerun");
                return SyncOutcome::Queued;
            }
            state.running = true;
        }
        let mut guard = RunningGuard {
            inner: &self.inner,
            armed: true,
        };

        let mut sessions_run = 0u32;
        loop {
            let (terminal, refreshed) = self.run_session().await;
            sessions_run += 1;

            let mut state = self
                .inner
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.rerun_requested {
                state.rerun_requested = false;
                continue;
            }
            state.running = false;
            guard.armed = false;
            return SyncOutcome::Finished {
                terminal,
                sessions_run,
                refreshed,
            };
        }
    }

    /// Run [`Self::sync`] on a background task.
    pub fn spawn_sync(&self) -> JoinHandle<SyncOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.sync().await })
    }

    async fn run_session(&self) -> (SyncProgressEvent, Vec<KeyRefresh>) {
        let progress = &self.inner.progress;
        progress.send_modify(SyncProgress::begin_session);
        info!("Sync session {} started", progress.borrow().session);

        let terminal = match self.inner.opener.open().await {
            Ok(source) => {
                SyncStreamConsumer::new(source)
                    .with_idle_timeout(self.inner.settings.stall_timeout)
                    .run(|event| progress.send_modify(|p| p.apply(event)))
                    .await
            }
            Err(e) => {
                let event = SyncProgressEvent::error(format!("failed to open sync stream: {e:#}"));
                warn!("{e:#}");
                progress.send_modify(|p| p.apply(&event));
                event
            }
        };

        let (session, summary) = {
            let state = progress.borrow();
            (state.session, state.summary())
        };
        info!("Sync session {session} ended: {summary}");
        let refreshed = self.refresh().await;
        (terminal, refreshed)
    }

    // ── Read side ─────────────────────────────────────────────────────────

    pub fn view(&self, key: &QueryKey) -> Option<CacheView> {
        self.cache().view(key, self.inner.settings.ttl, Utc::now())
    }

    pub fn active_view(&self) -> Option<CacheView> {
        self.view(&self.active_key())
    }

    pub fn progress(&self) -> SyncProgress {
        self.inner.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<SyncProgress> {
        self.inner.progress.subscribe()
    }

    /// Ensure `key`, then apply `spec` to its records.
    pub async fn filtered(&self, key: &QueryKey, spec: &FilterSpec) -> Result<Vec<Program>> {
        let entry = self.ensure(key).await?;
        Ok(filter_records(&entry.records, spec))
    }

    /// Ensure `key`, then derive business options from its records.
    pub async fn options(
        &self,
        key: &QueryKey,
        type_filter: Option<&str>,
    ) -> Result<Vec<BusinessOption>> {
        let entry = self.ensure(key).await?;
        let visible = filter_records(&entry.records, &FilterSpec::for_key(key));
        Ok(build_options(&visible, type_filter))
    }
}
