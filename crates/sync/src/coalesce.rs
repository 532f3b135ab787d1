//! At most one in-flight load per query key.
//!
//! `ensure` does all of its bookkeeping (fresh-cache check, pending lookup,
//! registration of a new load) under one lock with no await in between, so two
//! callers can never both decide to start a load for the same key. The load
//! itself runs on its own task: it finishes even if every caller stops
//! waiting, and its pending entry is removed whether it succeeds, fails or
//! panics.

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use programsync_core::QueryKey;

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{Result, SyncError};

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<CacheEntry>>>>;

struct PendingLoad {
    id: u64,
    load: SharedLoad,
}

type PendingTable = Arc<Mutex<HashMap<QueryKey, PendingLoad>>>;

/// Removes a pending entry when the load task ends, however it ends.
struct PendingGuard {
    table: PendingTable,
    key: QueryKey,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table.get(&self.key).is_some_and(|p| p.id == self.id) {
            table.remove(&self.key);
        }
    }
}

pub struct Coalescer {
    cache: Arc<CacheStore>,
    ttl: Duration,
    pending: PendingTable,
    next_id: AtomicU64,
}

impl Coalescer {
    pub fn new(cache: Arc<CacheStore>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_pending(&self, key: &QueryKey) -> bool {
        let table = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        table.contains_key(key)
    }

    /// Return a fresh cached entry, join the in-flight load for `key`, or start
    /// `loader` for it.
    ///
    /// `force` skips the freshness check but still joins a pending load. On
    /// failure the previously cached entry is left untouched.
    pub async fn ensure<F, Fut>(&self, key: &QueryKey, force: bool, loader: F) -> Result<Arc<CacheEntry>>
    where
        F: FnOnce(QueryKey) -> Fut,
        Fut: Future<Output = Result<CacheEntry>> + Send + 'static,
    {
        let load = {
            let mut table = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if !force {
                if let Some(entry) = self.cache.fresh(key, self.ttl, Utc::now()) {
                    debug!("Cache hit for {key}");
                    return Ok(entry);
                }
            }

            if let Some(pending) = table.get(key) {
                debug!("Joining in-flight load for {key}");
                pending.load.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let load = self.start(key, id, loader(key.clone()));
                table.insert(
                    key.clone(),
                    PendingLoad {
                        id,
                        load: load.clone(),
                    },
                );
                load
            }
        };
        load.await
    }

    fn start<Fut>(&self, key: &QueryKey, id: u64, body: Fut) -> SharedLoad
    where
        Fut: Future<Output = Result<CacheEntry>> + Send + 'static,
    {
        let guard = PendingGuard {
            table: Arc::clone(&self.pending),
            key: key.clone(),
            id,
        };
        let cache = Arc::clone(&self.cache);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match body.await {
                Ok(entry) => {
                    let entry = Arc::new(entry);
                    cache.put(task_key, Arc::clone(&entry));
                    Ok(entry)
                }
                Err(e) => {
                    debug!("Load task failed: {e}");
                    Err(e)
                }
            }
        });

        let key = key.clone();
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    warn!("Load task for {key} failed: {join_err}");
                    Err(SyncError::TaskAborted { key })
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Diagnostics;
    use programsync_core::testing;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    const TTL: Duration = Duration::from_secs(300);

    fn entry(n: usize) -> CacheEntry {
        CacheEntry::new(testing::programs(0, n), n as u64, Diagnostics::default())
    }

    async fn exploding_load() -> Result<CacheEntry> {
        panic!("loader blew up")
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let coalescer = Arc::new(Coalescer::new(Arc::new(CacheStore::new()), TTL));
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let key = QueryKey::current();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .ensure(&key, false, move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(entry(7))
                    })
                    .await
            }));
        }

        while !coalescer.is_pending(&key) {
            tokio::task::yield_now().await;
        }
        // let every caller reach the join point before the load finishes
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert!(!coalescer.is_pending(&key));
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_loader() {
        let coalescer = Coalescer::new(Arc::new(CacheStore::new()), TTL);
        let key = QueryKey::current();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            coalescer
                .ensure(&key, false, move |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(entry(2))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_freshness() {
        let coalescer = Coalescer::new(Arc::new(CacheStore::new()), TTL);
        let key = QueryKey::current();
        coalescer
            .ensure(&key, false, |_| async { Ok(entry(1)) })
            .await
            .unwrap();
        let refreshed = coalescer
            .ensure(&key, true, |_| async { Ok(entry(4)) })
            .await
            .unwrap();
        assert_eq!(refreshed.records.len(), 4);
        assert_eq!(coalescer.cache().get(&key).unwrap().records.len(), 4);
    }

    #[tokio::test]
    async fn test_force_joins_pending_load() {
        let coalescer = Arc::new(Coalescer::new(Arc::new(CacheStore::new()), TTL));
        let key = QueryKey::all();
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let coalescer = Arc::clone(&coalescer);
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            let key = key.clone();
            tokio::spawn(async move {
                coalescer
                    .ensure(&key, false, move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(entry(3))
                    })
                    .await
            })
        };
        while !coalescer.is_pending(&key) {
            tokio::task::yield_now().await;
        }

        let forced = {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            let key = key.clone();
            tokio::spawn(async move {
                coalescer
                    .ensure(&key, true, move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(entry(9))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        let a = first.await.unwrap().unwrap();
        let b = forced.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.records.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_entry_and_releases_key() {
        let coalescer = Coalescer::new(Arc::new(CacheStore::new()), TTL);
        let key = QueryKey::current();
        coalescer
            .ensure(&key, false, |_| async { Ok(entry(2)) })
            .await
            .unwrap();

        let err = coalescer
            .ensure(&key, true, |key| async move {
                Err(SyncError::Load {
                    key,
                    message: "502 Bad Gateway".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Load { .. }));
        assert_eq!(coalescer.cache().get(&key).unwrap().records.len(), 2);
        assert!(!coalescer.is_pending(&key));

        // the key is not locked by the failed load
        let next = coalescer
            .ensure(&key, true, |_| async { Ok(entry(5)) })
            .await
            .unwrap();
        assert_eq!(next.records.len(), 5);
    }

    #[tokio::test]
    async fn test_panicking_loader_releases_key() {
        let coalescer = Coalescer::new(Arc::new(CacheStore::new()), TTL);
        let key = QueryKey::current();
        let err = coalescer
            .ensure(&key, false, |_| exploding_load())
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::TaskAborted { key: key.clone() });
        assert!(!coalescer.is_pending(&key));
    }

    #[tokio::test]
    async fn test_different_keys_load_independently() {
        let coalescer = Coalescer::new(Arc::new(CacheStore::new()), TTL);
        let current = QueryKey::current();
        let all = QueryKey::all();
        let (a, b) = tokio::join!(
            coalescer.ensure(&current, false, |_| async { Ok(entry(1)) }),
            coalescer.ensure(&all, false, |_| async { Ok(entry(2)) }),
        );
        assert_eq!(a.unwrap().records.len(), 1);
        assert_eq!(b.unwrap().records.len(), 2);
    }
}
