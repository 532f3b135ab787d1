//! Per-key program cache with TTL freshness.
//!
//! Entries are never evicted or patched. A newer load replaces an entry
//! wholesale; invalidation only marks an entry as not fresh so it can keep
//! serving as last-known-good data while a refresh runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

use programsync_api_types::ProgramListResponse;
use programsync_core::{Program, QueryKey};

/// Degraded-source signals reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub warning: Option<String>,
    pub stale_count: Option<u64>,
    pub served_from_fallback: Option<bool>,
}

impl Diagnostics {
    pub fn from_response(resp: &ProgramListResponse) -> Self {
        let mut diagnostics = Self::default();
        diagnostics.absorb(resp);
        diagnostics
    }

    /// Fill fields that are still unset from `resp`. Values already taken from
    /// an earlier response are kept.
    pub fn absorb(&mut self, resp: &ProgramListResponse) {
        if self.warning.is_none() {
            self.warning = resp.warning.clone();
        }
        if self.stale_count.is_none() {
            self.stale_count = resp.stale_count;
        }
        if self.served_from_fallback.is_none() {
            self.served_from_fallback = resp.from_cache;
        }
    }

    /// True when the UI should flag the data as possibly outdated.
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
            || self.stale_count.is_some_and(|n| n > 0)
            || self.served_from_fallback == Some(true)
    }
}

/// The result of one successful load for a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    /// In server page order
    pub records: Vec<Program>,
    pub total_count: u64,
    pub fetched_at: DateTime<Utc>,
    pub diagnostics: Diagnostics,
}

impl CacheEntry {
    pub fn new(records: Vec<Program>, total_count: u64, diagnostics: Diagnostics) -> Self {
        Self {
            records,
            total_count,
            fetched_at: Utc::now(),
            diagnostics,
        }
    }

    /// Fewer records than the server claimed.
    pub fn is_truncated(&self) -> bool {
        (self.records.len() as u64) < self.total_count
    }
}

/// `now - fetched_at < ttl`.
pub fn is_fresh(entry: &CacheEntry, ttl: Duration, now: DateTime<Utc>) -> bool {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        return true;
    };
    now.signed_duration_since(entry.fetched_at) < ttl
}

/// Read model handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheView {
    pub key: QueryKey,
    pub records: Vec<Program>,
    pub total_count: u64,
    pub fetched_at: DateTime<Utc>,
    pub is_fresh: bool,
    pub diagnostics: Diagnostics,
}

struct Slot {
    entry: Arc<CacheEntry>,
    invalidated: bool,
    /// Survives `put`, so it counts every invalidation of the key
    invalidations: u64,
}

/// Keyed map of [`CacheEntry`] values, one per [`QueryKey`].
#[derive(Default)]
pub struct CacheStore {
    slots: RwLock<HashMap<QueryKey, Slot>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map(|slot| Arc::clone(&slot.entry))
    }

    /// Store `entry` for `key`, replacing any previous entry and clearing its
    /// invalidation mark.
    pub fn put(&self, key: QueryKey, entry: Arc<CacheEntry>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let invalidations = slots.get(&key).map_or(0, |slot| slot.invalidations);
        slots.insert(
            key,
            Slot {
                entry,
                invalidated: false,
                invalidations,
            },
        );
    }

    /// Mark the entry for `key` as not fresh. Returns false if nothing is cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots.get_mut(key) {
            Some(slot) => {
                slot.invalidated = true;
                slot.invalidations += 1;
                debug!("Invalidated cache entry for {key}");
                true
            }
            None => false,
        }
    }

    /// How many times `key` has been invalidated.
    pub fn invalidations(&self, key: &QueryKey) -> u64 {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map_or(0, |slot| slot.invalidations)
    }

    /// The entry for `key` if it is within `ttl` at `now` and not invalidated.
    pub fn fresh(&self, key: &QueryKey, ttl: Duration, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(key)
            .filter(|slot| !slot.invalidated && is_fresh(&slot.entry, ttl, now))
            .map(|slot| Arc::clone(&slot.entry))
    }

    pub fn is_fresh_at(&self, key: &QueryKey, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.fresh(key, ttl, now).is_some()
    }

    pub fn view(&self, key: &QueryKey, ttl: Duration, now: DateTime<Utc>) -> Option<CacheView> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map(|slot| CacheView {
            key: key.clone(),
            records: slot.entry.records.clone(),
            total_count: slot.entry.total_count,
            fetched_at: slot.entry.fetched_at,
            is_fresh: !slot.invalidated && is_fresh(&slot.entry, ttl, now),
            diagnostics: slot.entry.diagnostics.clone(),
        })
    }

    /// Cached keys, sorted.
    pub fn keys(&self) -> Vec<QueryKey> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<QueryKey> = slots.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use programsync_core::testing;

    const TTL: Duration = Duration::from_secs(300);

    fn entry_at(fetched_at: DateTime<Utc>) -> Arc<CacheEntry> {
        Arc::new(CacheEntry {
            records: testing::programs(0, 3),
            total_count: 3,
            fetched_at,
            diagnostics: Diagnostics::default(),
        })
    }

    #[test]
    fn test_is_fresh_boundary() {
        let now = Utc::now();
        let entry = entry_at(now - chrono::Duration::seconds(299));
        assert!(is_fresh(&entry, TTL, now));
        let entry = entry_at(now - chrono::Duration::seconds(300));
        assert!(!is_fresh(&entry, TTL, now));
    }

    #[test]
    fn test_stale_entry_is_kept() {
        let store = CacheStore::new();
        let key = QueryKey::current();
        let now = Utc::now();
        store.put(key.clone(), entry_at(now - chrono::Duration::minutes(10)));

        assert!(store.fresh(&key, TTL, now).is_none());
        assert_eq!(store.get(&key).unwrap().records.len(), 3);
        let view = store.view(&key, TTL, now).unwrap();
        assert!(!view.is_fresh);
    }

    #[test]
    fn test_invalidate_then_put_restores_freshness() {
        let store = CacheStore::new();
        let key = QueryKey::current();
        let now = Utc::now();
        store.put(key.clone(), entry_at(now));
        assert!(store.is_fresh_at(&key, TTL, now));

        assert!(store.invalidate(&key));
        assert!(!store.is_fresh_at(&key, TTL, now));
        assert!(store.get(&key).is_some());

        store.put(key.clone(), entry_at(now));
        assert!(store.is_fresh_at(&key, TTL, now));
        assert_eq!(store.invalidations(&key), 1);
    }

    #[test]
    fn test_invalidate_missing_key() {
        let store = CacheStore::new();
        assert!(!store.invalidate(&QueryKey::all()));
        assert_eq!(store.invalidations(&QueryKey::all()), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = CacheStore::new();
        let now = Utc::now();
        store.put(QueryKey::current(), entry_at(now));
        store.put(QueryKey::all(), entry_at(now));
        store.invalidate(&QueryKey::all());

        assert!(store.is_fresh_at(&QueryKey::current(), TTL, now));
        assert!(!store.is_fresh_at(&QueryKey::all(), TTL, now));
        assert_eq!(store.keys(), vec![QueryKey::all(), QueryKey::current()]);
    }

    #[test]
    fn test_diagnostics_keep_first_value() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.absorb(&ProgramListResponse {
            warning: Some("served from replica".into()),
            ..ProgramListResponse::default()
        });
        diagnostics.absorb(&ProgramListResponse {
            warning: Some("later".into()),
            stale_count: Some(4),
            from_cache: Some(false),
            ..ProgramListResponse::default()
        });
        assert_eq!(diagnostics.warning.as_deref(), Some("served from replica"));
        assert_eq!(diagnostics.stale_count, Some(4));
        assert_eq!(diagnostics.served_from_fallback, Some(false));
        assert!(diagnostics.is_degraded());
        assert!(!Diagnostics::default().is_degraded());
    }
}
