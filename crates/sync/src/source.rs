//! Seams between the sync layer and the remote programs API.

use anyhow::Result;
use async_trait::async_trait;

use programsync_api_client::ApiClient;
use programsync_api_types::{ProgramBulkQuery, ProgramListQuery, ProgramListResponse, SyncRequest};
use programsync_core::QueryKey;

/// Paged and bulk program listing for one query key.
#[async_trait]
pub trait ProgramSource: Send + Sync {
    async fn fetch_page(&self, key: &QueryKey, offset: u64, limit: u64) -> Result<ProgramListResponse>;

    async fn fetch_all(&self, key: &QueryKey) -> Result<ProgramListResponse>;
}

/// A response body read incrementally.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk of bytes, or `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Stop reading and release the underlying connection.
    fn cancel(self: Box<Self>) {}
}

/// Starts a remote sync and hands back its progress stream.
#[async_trait]
pub trait SyncStreamOpener: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ChunkSource>>;
}

#[async_trait]
impl ProgramSource for ApiClient {
    async fn fetch_page(&self, key: &QueryKey, offset: u64, limit: u64) -> Result<ProgramListResponse> {
        self.list_programs(&ProgramListQuery {
            status: key.to_string(),
            offset,
            limit,
        })
        .await
    }

    async fn fetch_all(&self, key: &QueryKey) -> Result<ProgramListResponse> {
        self.list_all_programs(&ProgramBulkQuery {
            status: key.to_string(),
        })
        .await
    }
}

#[async_trait]
impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl SyncStreamOpener for ApiClient {
    async fn open(&self) -> Result<Box<dyn ChunkSource>> {
        let resp = self.start_sync(&SyncRequest::default()).await?;
        Ok(Box::new(resp))
    }
}
