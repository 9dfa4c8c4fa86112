//! Test utilities for integration tests.
//!
//! Provides a scripted HTTP fetcher that answers by URL prefix and records
//! every attempt, plus helpers that build the URLs and index bodies the
//! resolver works with.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use serde_json::json;

use geodata_tiles::endpoint::{StaticEndpoints, StaticHeaders};
use geodata_tiles::io::{FetchRequest, FetchResponse, HttpFetcher};
use geodata_tiles::{
    DownloadConfig, FetchError, RetryPolicy, Session, SessionConfig, TileKey, BLOB_SERVICE,
    QUERY_SERVICE, SERVICE_VERSION, VOLATILE_BLOB_SERVICE,
};

pub const CATALOG: &str = "hrn:test:catalog";
pub const LAYER: &str = "roads";
pub const VERSION: u64 = 42;
pub const TOKEN: &str = "test-token";

pub const QUERY_BASE: &str = "https://query.test/v1/catalogs/{resource}";
pub const BLOB_BASE: &str = "https://blob.test/v1/catalogs/{resource}";
pub const VOLATILE_BLOB_BASE: &str = "https://volatile-blob.test/v1/catalogs/{resource}";

// =============================================================================
// Mock Fetcher with Request Tracking
// =============================================================================

/// A recorded attempt.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Full URL including the query string
    pub url: String,
    pub headers: HeaderMap,
}

struct Route {
    prefix: String,
    responses: VecDeque<FetchResponse>,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Scripted fetcher.
///
/// Each route holds a queue of responses for URLs starting with its prefix
/// (query string ignored, longest prefix wins). Responses are consumed in
/// order; the last one repeats. Unrouted URLs get a 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    state: Arc<MockState>,
    delay: Duration,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every attempt for `delay` (cancellable).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a response for URLs starting with `prefix`.
    pub fn respond(
        &self,
        prefix: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> &Self {
        let prefix = prefix.into();
        let response = FetchResponse::new(status, body.into());
        let mut routes = self.state.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.prefix == prefix) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                prefix,
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    /// Every attempt so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    /// Attempts whose URL starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.url.starts_with(prefix))
            .count()
    }

    /// Highest number of simultaneous attempts observed.
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &str) -> FetchResponse {
        let path = url.split('?').next().unwrap_or(url);
        let mut routes = self.state.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .filter(|r| path.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len());

        match route {
            Some(route) if route.responses.len() > 1 => route.responses.pop_front().unwrap(),
            Some(route) => route.responses.front().cloned().unwrap(),
            None => FetchResponse::new(404, r#"{"statusText": "No route"}"#),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HttpFetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.state.calls.lock().unwrap().push(RecordedCall {
            url: request.url.clone(),
            headers: request.headers.clone(),
        });

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.state.in_flight);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = request.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        Ok(self.next_response(&request.url))
    }
}

// =============================================================================
// URL and Body Helpers
// =============================================================================

fn catalog_base(base: &str) -> String {
    base.replace("{resource}", CATALOG)
}

/// Index URL of the versioned test layer.
pub fn tree_url(root: TileKey, depth: u32) -> String {
    versioned_tree_url(VERSION, root, depth)
}

pub fn versioned_tree_url(version: u64, root: TileKey, depth: u32) -> String {
    format!(
        "{}/layers/{LAYER}/versions/{version}/quadkeys/{}/depths/{depth}",
        catalog_base(QUERY_BASE),
        root.to_here_tile()
    )
}

pub fn volatile_tree_url(root: TileKey, depth: u32) -> String {
    format!(
        "{}/layers/{LAYER}/quadkeys/{}/depths/{depth}",
        catalog_base(QUERY_BASE),
        root.to_here_tile()
    )
}

pub fn blob_url(data_handle: &str) -> String {
    format!("{}/layers/{LAYER}/data/{data_handle}", catalog_base(BLOB_BASE))
}

pub fn volatile_blob_url(data_handle: &str) -> String {
    format!(
        "{}/layers/{LAYER}/data/{data_handle}",
        catalog_base(VOLATILE_BLOB_BASE)
    )
}

/// Prefix matching every index request.
pub fn query_prefix() -> String {
    catalog_base(QUERY_BASE)
}

/// Prefix matching every versioned blob request.
pub fn blob_prefix() -> String {
    catalog_base(BLOB_BASE)
}

/// Index body from `(subQuadKey, dataHandle)` and `(partition, dataHandle)`
/// pairs.
pub fn index_body(sub_quads: &[(&str, &str)], parent_quads: &[(&str, &str)]) -> String {
    let sub_quads: Vec<_> = sub_quads
        .iter()
        .map(|(key, handle)| json!({ "subQuadKey": key, "version": VERSION, "dataHandle": handle }))
        .collect();
    let parent_quads: Vec<_> = parent_quads
        .iter()
        .map(|(partition, handle)| {
            json!({ "partition": partition, "version": VERSION, "dataHandle": handle })
        })
        .collect();
    json!({ "subQuads": sub_quads, "parentQuads": parent_quads }).to_string()
}

// =============================================================================
// Session Helpers
// =============================================================================

pub fn test_endpoints() -> StaticEndpoints {
    StaticEndpoints::new()
        .with_service(QUERY_SERVICE, SERVICE_VERSION, QUERY_BASE)
        .with_service(BLOB_SERVICE, SERVICE_VERSION, BLOB_BASE)
        .with_service(VOLATILE_BLOB_SERVICE, SERVICE_VERSION, VOLATILE_BLOB_BASE)
}

/// Session defaults with a fast retry policy.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        download: DownloadConfig {
            retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
            ..DownloadConfig::default()
        },
        ..SessionConfig::default()
    }
}

pub fn test_session(fetcher: MockFetcher) -> Session<MockFetcher> {
    test_session_with(fetcher, test_config())
}

pub fn test_session_with(fetcher: MockFetcher, config: SessionConfig) -> Session<MockFetcher> {
    Session::new(
        fetcher,
        Arc::new(test_endpoints()),
        Arc::new(StaticHeaders::bearer(TOKEN).unwrap()),
        config,
    )
}
