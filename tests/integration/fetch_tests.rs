//! Download layer integration tests.
//!
//! Tests verify:
//! - Transient statuses are retried, others returned as-is
//! - Exhausted retries surface the last status
//! - The shared pool bounds simultaneous attempts across resolvers
//! - Cancellation of queued and backing-off downloads

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use geodata_tiles::io::{DownloadConfig, DownloadManager, DownloadOptions, RetryPolicy};
use geodata_tiles::{FetchError, SessionConfig, TileError, TileKey, TileRequest};

use super::test_utils::{
    blob_prefix, blob_url, index_body, query_prefix, test_config, test_session_with, tree_url,
    MockFetcher, CATALOG, LAYER, VERSION,
};

const URL: &str = "https://blob.test/v1/catalogs/c/layers/l/data/h";

fn manager(
    fetcher: MockFetcher,
    max_concurrent: usize,
    retries: u32,
) -> DownloadManager<MockFetcher> {
    DownloadManager::new(
        fetcher,
        DownloadConfig {
            max_concurrent,
            retry: RetryPolicy::fixed(retries, Duration::from_millis(1)),
        },
    )
}

// =============================================================================
// Retries
// =============================================================================

#[tokio::test]
async fn test_retries_until_success() {
    let fetcher = MockFetcher::new();
    fetcher
        .respond(URL, 429, "")
        .respond(URL, 500, "")
        .respond(URL, 503, "")
        .respond(URL, 200, "payload");
    let downloads = manager(fetcher.clone(), 4, 3);

    let response = downloads.download(URL, DownloadOptions::default()).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"payload");
    assert_eq!(fetcher.call_count(), 4);
}

#[tokio::test]
async fn test_gives_up_with_last_status() {
    let fetcher = MockFetcher::new();
    fetcher
        .respond(URL, 503, "")
        .respond(URL, 429, r#"{"statusText": "Slow down"}"#);
    let downloads = manager(fetcher.clone(), 4, 2);

    let err = downloads
        .download(URL, DownloadOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::Http {
            status: 429,
            message: "Slow down".to_string()
        }
    );
    assert_eq!(fetcher.call_count(), 3);
}

#[tokio::test]
async fn test_other_statuses_are_not_retried() {
    for status in [200, 204, 400, 401, 403, 404, 502] {
        let fetcher = MockFetcher::new();
        fetcher.respond(URL, status, "");
        let downloads = manager(fetcher.clone(), 4, 3);

        let response = downloads.download(URL, DownloadOptions::default()).await.unwrap();
        assert_eq!(response.status, status);
        assert_eq!(fetcher.call_count(), 1, "status {status}");
    }
}

#[tokio::test]
async fn test_resolver_retries_index_fetch() {
    let root = TileKey::new(0, 0, 2);
    let fetcher = MockFetcher::new();
    fetcher
        .respond(tree_url(root, 4), 503, "")
        .respond(tree_url(root, 4), 200, index_body(&[("1", "handle-root")], &[]));
    fetcher.respond(blob_url("handle-root"), 500, "");
    fetcher.respond(blob_url("handle-root"), 200, "root-bytes");
    let session = test_session_with(fetcher.clone(), test_config());

    let data = session
        .resolve_tile(&TileRequest::versioned(CATALOG, LAYER, VERSION, TileKey::new(5, 9, 6)))
        .await
        .unwrap();

    assert_eq!(&data.blob().unwrap().data[..], b"root-bytes");
    assert_eq!(fetcher.calls_to(&query_prefix()), 2);
    assert_eq!(fetcher.calls_to(&blob_prefix()), 2);
}

#[tokio::test]
async fn test_invalid_url_is_rejected() {
    let fetcher = MockFetcher::new();
    let downloads = manager(fetcher.clone(), 4, 3);

    let err = downloads
        .download("not a url", DownloadOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::InvalidUrl { .. }));
    assert_eq!(fetcher.call_count(), 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_pool_bounds_attempts() {
    let fetcher = MockFetcher::new().with_delay(Duration::from_millis(5));
    fetcher.respond(URL, 200, "ok");
    let downloads = Arc::new(manager(fetcher.clone(), 3, 0));

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let downloads = Arc::clone(&downloads);
            tokio::spawn(async move { downloads.download(URL, DownloadOptions::default()).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, 200);
    }

    assert_eq!(fetcher.call_count(), 24);
    assert!(fetcher.peak_in_flight() <= 3);
    assert_eq!(downloads.available_slots(), 3);
}

#[tokio::test]
async fn test_pool_is_shared_across_resolvers() {
    let fetcher = MockFetcher::new().with_delay(Duration::from_millis(5));
    fetcher.respond(query_prefix(), 200, index_body(&[("1", "handle-root")], &[]));
    fetcher.respond(blob_url("handle-root"), 200, "root-bytes");
    let session = test_session_with(
        fetcher.clone(),
        SessionConfig {
            download: DownloadConfig {
                max_concurrent: 2,
                ..DownloadConfig::default()
            },
            ..test_config()
        },
    );

    // Tiles under distinct level-2 roots, resolved through separate resolvers.
    let handles: Vec<_> = (0..4u32)
        .flat_map(|row| (0..4u32).map(move |column| TileKey::new(row << 4, column << 4, 6)))
        .map(|tile| {
            let resolver = session.resolver();
            tokio::spawn(async move {
                resolver
                    .resolve_tile(&TileRequest::versioned(CATALOG, LAYER, VERSION, tile))
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert!(fetcher.peak_in_flight() <= 2);
    assert_eq!(session.downloads().available_slots(), 2);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_while_queued() {
    let fetcher = MockFetcher::new().with_delay(Duration::from_millis(200));
    fetcher.respond(URL, 200, "ok");
    let downloads = Arc::new(manager(fetcher.clone(), 1, 0));

    let busy = {
        let downloads = Arc::clone(&downloads);
        tokio::spawn(async move { downloads.download(URL, DownloadOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let cancel = CancellationToken::new();
    let queued = {
        let downloads = Arc::clone(&downloads);
        let options = DownloadOptions::default().with_cancel(cancel.clone());
        tokio::spawn(async move { downloads.download(URL, options).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    assert_eq!(queued.await.unwrap().unwrap_err(), FetchError::Cancelled);
    assert_eq!(busy.await.unwrap().unwrap().status, 200);
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let fetcher = MockFetcher::new();
    fetcher.respond(URL, 503, "");
    let downloads = DownloadManager::new(
        fetcher.clone(),
        DownloadConfig {
            max_concurrent: 1,
            retry: RetryPolicy::fixed(5, Duration::from_secs(10)),
        },
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = downloads
        .download(URL, DownloadOptions::default().with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(downloads.available_slots(), 1);
}

#[tokio::test]
async fn test_cancelled_resolution_reports_cancelled() {
    let fetcher = MockFetcher::new().with_delay(Duration::from_secs(10));
    let session = test_session_with(fetcher.clone(), test_config());

    let cancel = CancellationToken::new();
    let request = TileRequest::versioned(CATALOG, LAYER, VERSION, TileKey::new(5, 9, 6))
        .with_cancel(cancel.clone());

    let resolution = tokio::spawn(async move { session.resolve_tile(&request).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let err = resolution.await.unwrap().unwrap_err();
    assert!(matches!(err, TileError::Fetch(FetchError::Cancelled)));
}
