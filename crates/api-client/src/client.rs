use std::time::Duration;

use anyhow::{Result, bail};

use programsync_api_types::*;

use crate::retry::{RetryConfig, send_with_retry};

/// Typed HTTP client for the programs API.
///
/// List requests are bounded by the per-request timeout and retried according
/// to [`RetryConfig`]. The sync stream is long lived, so it only gets a connect
/// timeout and is never retried.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a new client with the given base URL and request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url).with_timeout(timeout))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn set_auth(&mut self, token: String) {
        if token.trim().is_empty() {
            self.auth_token = None;
        } else {
            self.auth_token = Some(token);
        }
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .get(self.url(path))
            .timeout(self.request_timeout);
        match self.auth_token.as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    // ── Programs ──────────────────────────────────────────────────────────

    /// One page of programs for a status key.
    pub async fn list_programs(&self, query: &ProgramListQuery) -> Result<ProgramListResponse> {
        let resp = send_with_retry(
            || self.get("/programs").query(query),
            &self.retry,
            "GET /programs",
        )
        .await?;
        parse_response(resp).await
    }

    /// The whole collection for a status key in one round trip.
    pub async fn list_all_programs(
        &self,
        query: &ProgramBulkQuery,
    ) -> Result<ProgramListResponse> {
        let resp = send_with_retry(
            || self.get("/programs/all").query(query),
            &self.retry,
            "GET /programs/all",
        )
        .await?;
        parse_response(resp).await
    }

    // ── Sync ──────────────────────────────────────────────────────────────

    /// Start a remote sync and return the streamed progress response.
    ///
    /// The body has not been read yet; callers consume it chunk by chunk.
    pub async fn start_sync(&self, req: &SyncRequest) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(self.url("/programs/sync"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(req);
        if let Some(token) = self.auth_token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("{status}: {body}");
        }
        Ok(resp)
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{status}: {body}");
    }
    Ok(resp.json().await?)
}
