//! Download layer.
//!
//! - [`HttpFetcher`]: the raw one-attempt fetch primitive
//! - [`ReqwestFetcher`]: reqwest-backed implementation
//! - [`DownloadManager`]: bounded concurrency, retry and cancellation on top
//! - [`RetryPolicy`]: backoff settings and retryable statuses

mod download;
mod fetcher;
mod retry;

pub use download::{
    tag_url, DownloadConfig, DownloadManager, DownloadOptions, CLIENT_QUERY_PARAM,
    CLIENT_QUERY_VALUE, DEFAULT_MAX_CONCURRENT,
};
pub use fetcher::{FetchRequest, FetchResponse, HttpFetcher, ReqwestFetcher};
pub use retry::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRYABLE_STATUSES,
};
