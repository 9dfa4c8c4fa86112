//! Bounded, retrying download layer.
//!
//! [`DownloadManager`] wraps an [`HttpFetcher`] and adds:
//! - An identifying query parameter on every URL
//! - A counting semaphore capping simultaneous attempts (excess calls queue)
//! - Retry with backoff on transient statuses (429, 500, 503 by default)
//! - Cooperative cancellation, checked before each slot wait and each retry
//!   wait and passed through to the fetcher
//!
//! The slot is held for one attempt only. Backoff waits happen without a
//! slot so that queued calls can proceed meanwhile.

use std::sync::Arc;

use http::HeaderMap;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::fetcher::{FetchRequest, FetchResponse, HttpFetcher};
use super::retry::RetryPolicy;
use crate::error::FetchError;

/// Default number of simultaneous attempts.
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Query parameter appended to every request URL.
pub const CLIENT_QUERY_PARAM: &str = "client";

/// Value of [`CLIENT_QUERY_PARAM`].
pub const CLIENT_QUERY_VALUE: &str = concat!("geodata-tiles-rs/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Configuration
// =============================================================================

/// Settings fixed for the lifetime of a [`DownloadManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    /// Maximum simultaneous attempts
    pub max_concurrent: usize,

    /// Retry behavior for transient statuses
    pub retry: RetryPolicy,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Headers sent with every attempt
    pub headers: HeaderMap,

    /// Cancels queued waits, backoff waits and (via the fetcher) the
    /// in-flight attempt
    pub cancel: Option<CancellationToken>,
}

impl DownloadOptions {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

// =============================================================================
// Download Manager
// =============================================================================

/// Turns a URL into a completed response, absorbing transient failures and
/// capping concurrent network use.
///
/// Shared between resolvers via `Arc`; the bound applies across all of them.
///
/// # Example
///
/// ```ignore
/// use geodata_tiles::io::{DownloadConfig, DownloadManager, DownloadOptions, ReqwestFetcher};
///
/// let manager = DownloadManager::new(ReqwestFetcher::default(), DownloadConfig::default());
/// let response = manager
///     .download("https://blob.example.com/layers/l/data/h", DownloadOptions::default())
///     .await?;
/// ```
pub struct DownloadManager<F> {
    fetcher: F,
    slots: Semaphore,
    max_concurrent: usize,
    retry: RetryPolicy,
}

impl<F: HttpFetcher> DownloadManager<F> {
    /// Create a manager. A `max_concurrent` of 0 is raised to 1.
    pub fn new(fetcher: F, config: DownloadConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            fetcher,
            slots: Semaphore::new(max_concurrent),
            max_concurrent,
            retry: config.retry,
        }
    }

    /// Download `url`, retrying transient failures.
    ///
    /// Returns the first response whose status is not retryable, whatever it
    /// is; interpreting 2xx/3xx/4xx is left to the caller.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Cancelled`] if the token fires before or between attempts
    /// - [`FetchError::Http`] once retries are exhausted, with the last status
    /// - [`FetchError::InvalidUrl`] if `url` does not parse
    /// - any error of the fetcher itself, unretried
    pub async fn download(
        &self,
        url: &str,
        options: DownloadOptions,
    ) -> Result<FetchResponse, FetchError> {
        let cancel = options.cancel.unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let url = tag_url(url)?;
        let mut retries = 0u32;

        loop {
            let response = {
                let _slot = self.acquire_slot(&cancel).await?;
                self.fetcher
                    .fetch(FetchRequest {
                        url: url.clone(),
                        headers: options.headers.clone(),
                        cancel: cancel.clone(),
                    })
                    .await?
            };

            if !self.retry.is_retryable(response.status) {
                debug!(url = %url, status = response.status, retries, "download complete");
                return Ok(response);
            }

            retries += 1;
            if retries > self.retry.max_retries {
                warn!(
                    url = %url,
                    status = response.status,
                    "giving up after {} retries",
                    self.retry.max_retries
                );
                return Err(FetchError::Http {
                    status: response.status,
                    message: response.status_text(),
                });
            }

            let delay = self.retry.delay_for_retry(retries);
            warn!(
                url = %url,
                status = response.status,
                "retry {}/{} in {:?}",
                retries,
                self.retry.max_retries,
                delay
            );

            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Maximum simultaneous attempts.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// The retry policy in use.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The wrapped fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Wrap in an `Arc` for sharing between resolvers.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Wait for a slot. The permit is released when dropped, on every path.
    async fn acquire_slot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SemaphorePermit<'_>, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            permit = self.slots.acquire() => {
                permit.map_err(|_| FetchError::Transport("download pool closed".to_string()))
            }
        }
    }
}

/// Append the client identification parameter to a URL.
pub fn tag_url(url: &str) -> Result<String, FetchError> {
    let mut parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    parsed
        .query_pairs_mut()
        .append_pair(CLIENT_QUERY_PARAM, CLIENT_QUERY_VALUE);
    Ok(parsed.into())
}

// =============================================================================
// Tests
// =============================================================================
