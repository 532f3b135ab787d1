//! Loads the full program collection for a key, choosing between one bulk
//! request and sequential pages based on the reported total.

use std::sync::Arc;
use tracing::{debug, info, warn};

use programsync_core::QueryKey;

use crate::cache::{CacheEntry, Diagnostics};
use crate::error::{Result, SyncError};
use crate::source::ProgramSource;

pub struct AdaptiveLoader {
    source: Arc<dyn ProgramSource>,
    page_size: u64,
    bulk_threshold: u64,
}

impl AdaptiveLoader {
    pub fn new(source: Arc<dyn ProgramSource>, page_size: u64, bulk_threshold: u64) -> Result<Self> {
        if page_size == 0 {
            return Err(SyncError::Config("page size must be greater than 0".into()));
        }
        Ok(Self {
            source,
            page_size,
            bulk_threshold,
        })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn bulk_threshold(&self) -> u64 {
        self.bulk_threshold
    }

    /// Fetch page 0 to learn the total, then either bulk-load or page through
    /// the rest.
    ///
    /// Paging stops when the aggregate reaches the total or a page comes back
    /// short. A short page before the total is reached is tolerated: the entry
    /// simply holds fewer records than `total_count`.
    pub async fn load(&self, key: &QueryKey) -> Result<CacheEntry> {
        let first = self
            .source
            .fetch_page(key, 0, self.page_size)
            .await
            .map_err(|e| SyncError::load(key, &e))?;
        let total = first.total_or_len();

        if total >= self.bulk_threshold {
            info!(
                "Loading {key} in bulk ({total} programs, threshold {})",
                self.bulk_threshold
            );
            let bulk = self
                .source
                .fetch_all(key)
                .await
                .map_err(|e| SyncError::load(key, &e))?;
            let diagnostics = Diagnostics::from_response(&bulk);
            let total = bulk.total_or_len();
            return Ok(CacheEntry::new(bulk.programs, total, diagnostics));
        }

        let mut diagnostics = Diagnostics::from_response(&first);
        let mut last_len = first.programs.len() as u64;
        let mut records = first.programs;
        let mut offset = self.page_size;

        while (records.len() as u64) < total && last_len >= self.page_size {
            debug!("Fetching {key} page at offset {offset}");
            let page = self
                .source
                .fetch_page(key, offset, self.page_size)
                .await
                .map_err(|e| SyncError::load(key, &e))?;
            diagnostics.absorb(&page);
            last_len = page.programs.len() as u64;
            records.extend(page.programs);
            offset += self.page_size;
        }

        if (records.len() as u64) < total {
            warn!(
                "Loaded {} of {total} programs for {key}: source ran out of pages early",
                records.len()
            );
        }
        info!(
            "Loaded {key} page by page ({} programs, {} requests)",
            records.len(),
            offset / self.page_size
        );
        Ok(CacheEntry::new(records, total, diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use programsync_api_types::ProgramListResponse;
    use programsync_core::testing;
    use std::sync::Mutex;

    /// In-memory source holding `len` programs, reporting `claimed_total`.
    struct FakeSource {
        len: usize,
        claimed_total: Option<u64>,
        short_page_at: Option<(u64, usize)>,
        first_page_warning: Option<String>,
        bulk_from_cache: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(len: usize) -> Self {
            Self {
                len,
                claimed_total: Some(len as u64),
                short_page_at: None,
                first_page_warning: None,
                bulk_from_cache: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgramSource for FakeSource {
        async fn fetch_page(
            &self,
            _key: &QueryKey,
            offset: u64,
            limit: u64,
        ) -> anyhow::Result<ProgramListResponse> {
            self.calls.lock().unwrap().push(format!("page@{offset}"));
            let start = offset as usize;
            let mut count = (limit as usize).min(self.len.saturating_sub(start));
            if let Some((at, len)) = self.short_page_at {
                if at == offset {
                    count = len;
                }
            }
            let mut resp = ProgramListResponse {
                programs: testing::programs(start, count),
                total: self.claimed_total,
                ..ProgramListResponse::default()
            };
            if offset == 0 {
                resp.warning = self.first_page_warning.clone();
            } else {
                resp.warning = Some("later page warning".into());
            }
            Ok(resp)
        }

        async fn fetch_all(&self, _key: &QueryKey) -> anyhow::Result<ProgramListResponse> {
            self.calls.lock().unwrap().push("bulk".into());
            Ok(ProgramListResponse {
                programs: testing::programs(0, self.len),
                total: Some(self.len as u64),
                from_cache: Some(self.bulk_from_cache),
                ..ProgramListResponse::default()
            })
        }
    }

    fn loader(source: &Arc<FakeSource>) -> AdaptiveLoader {
        let source: Arc<dyn ProgramSource> = source.clone();
        AdaptiveLoader::new(source, 100, 500).unwrap()
    }

    #[tokio::test]
    async fn test_paginated_load_preserves_page_order() {
        let source = Arc::new(FakeSource::new(250));
        let entry = loader(&source).load(&QueryKey::current()).await.unwrap();

        assert_eq!(source.calls(), vec!["page@0", "page@100", "page@200"]);
        assert_eq!(entry.records.len(), 250);
        assert_eq!(entry.total_count, 250);
        let ids: Vec<String> = entry.records.iter().map(|p| p.id.clone()).collect();
        let expected: Vec<String> = (0..250).map(|n| format!("p-{n}")).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_total_at_threshold_uses_bulk() {
        let mut fake = FakeSource::new(500);
        fake.bulk_from_cache = true;
        let source = Arc::new(fake);
        let entry = loader(&source).load(&QueryKey::all()).await.unwrap();

        assert_eq!(source.calls(), vec!["page@0", "bulk"]);
        assert_eq!(entry.records.len(), 500);
        assert_eq!(entry.diagnostics.served_from_fallback, Some(true));
    }

    #[tokio::test]
    async fn test_total_below_threshold_pages() {
        let source = Arc::new(FakeSource::new(499));
        let entry = loader(&source).load(&QueryKey::all()).await.unwrap();

        let calls = source.calls();
        assert!(!calls.contains(&"bulk".to_string()));
        assert_eq!(calls.len(), 5);
        assert_eq!(entry.records.len(), 499);
    }

    #[tokio::test]
    async fn test_short_page_ends_load_early() {
        let mut fake = FakeSource::new(400);
        fake.short_page_at = Some((200, 40));
        let source = Arc::new(fake);
        let entry = loader(&source).load(&QueryKey::current()).await.unwrap();

        assert_eq!(source.calls(), vec!["page@0", "page@100", "page@200"]);
        assert_eq!(entry.records.len(), 240);
        assert_eq!(entry.total_count, 400);
        assert!(entry.is_truncated());
    }

    #[tokio::test]
    async fn test_overstated_total_terminates() {
        let mut fake = FakeSource::new(120);
        fake.claimed_total = Some(450);
        let source = Arc::new(fake);
        let entry = loader(&source).load(&QueryKey::current()).await.unwrap();

        assert_eq!(source.calls(), vec!["page@0", "page@100"]);
        assert_eq!(entry.records.len(), 120);
    }

    #[tokio::test]
    async fn test_missing_total_falls_back_to_page_length() {
        let mut fake = FakeSource::new(30);
        fake.claimed_total = None;
        let source = Arc::new(fake);
        let entry = loader(&source).load(&QueryKey::current()).await.unwrap();

        assert_eq!(source.calls(), vec!["page@0"]);
        assert_eq!(entry.total_count, 30);
    }

    #[tokio::test]
    async fn test_first_supplied_diagnostics_win() {
        let mut fake = FakeSource::new(150);
        fake.first_page_warning = None;
        let source = Arc::new(fake);
        let entry = loader(&source).load(&QueryKey::current()).await.unwrap();
        assert_eq!(entry.diagnostics.warning.as_deref(), Some("later page warning"));

        let mut fake = FakeSource::new(150);
        fake.first_page_warning = Some("degraded".into());
        let source = Arc::new(fake);
        let entry = loader(&source).load(&QueryKey::current()).await.unwrap();
        assert_eq!(entry.diagnostics.warning.as_deref(), Some("degraded"));
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let source: Arc<dyn ProgramSource> = Arc::new(FakeSource::new(0));
        assert!(matches!(
            AdaptiveLoader::new(source, 0, 500),
            Err(SyncError::Config(_))
        ));
    }
}
