use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

const MAX_DELAY_SECS: u64 = 16;

/// Configuration for retry behaviour on idempotent GET requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub delays: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential(3)
    }
}

impl RetryConfig {
    /// 1s, 2s, 4s, ... capped at 16s.
    pub fn exponential(max_retries: usize) -> Self {
        let delays = (0..max_retries)
            .map(|attempt| Duration::from_secs((1u64 << attempt.min(4)).min(MAX_DELAY_SECS)))
            .collect();
        Self {
            max_retries,
            delays,
        }
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delays: Vec::new(),
        }
    }

    fn delay(&self, attempt: usize) -> Option<Duration> {
        if attempt < self.max_retries {
            self.delays.get(attempt).copied()
        } else {
            None
        }
    }
}

/// Send a request built by `build`, retrying with backoff.
///
/// Retries on network errors and 5xx responses.
/// Returns immediately on success or 4xx.
pub async fn send_with_retry<F>(
    build: F,
    config: &RetryConfig,
    label: &str,
) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match build().send().await {
            Ok(resp) if resp.status().is_server_error() => match config.delay(attempt) {
                Some(delay) => {
                    warn!(
                        "{label} attempt {}/{} failed (HTTP {}), retrying in {:?}",
                        attempt + 1,
                        max_attempts,
                        resp.status(),
                        delay,
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Ok(resp),
            },
            Ok(resp) => return Ok(resp),
            Err(e) => match config.delay(attempt) {
                Some(delay) => {
                    warn!(
                        "{label} attempt {}/{} failed ({}), retrying in {:?}",
                        attempt + 1,
                        max_attempts,
                        e,
                        delay,
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(e)
                        .with_context(|| format!("{label} failed after {max_attempts} attempts"));
                }
            },
        }
        attempt += 1;
    }
}
