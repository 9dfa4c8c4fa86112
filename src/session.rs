//! Session: the shared state behind tile resolution.
//!
//! A [`Session`] owns one download pool and one set of caches and hands out
//! [`TileResolver`]s that share them. Everything a resolver needs is injected
//! here; there is no process-wide cache.

use std::sync::Arc;

use crate::cache::{BlobCache, TileTreeCache, DEFAULT_TREE_CACHE_CAPACITY};
use crate::endpoint::{EndpointResolver, HeaderProvider};
use crate::error::TileError;
use crate::io::{DownloadConfig, DownloadManager, HttpFetcher};
use crate::tile::{TileData, TileRequest, TileResolver, DEFAULT_TREE_DEPTH};

// =============================================================================
// Configuration
// =============================================================================

/// Settings for a [`Session`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Concurrency and retry settings of the download pool
    pub download: DownloadConfig,

    /// Maximum number of quad-tree indexes kept in memory
    pub tree_cache_capacity: usize,

    /// Byte budget of the blob cache; `None` disables blob caching
    pub blob_cache_bytes: Option<usize>,

    /// Levels covered by each index request
    pub tree_depth: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            tree_cache_capacity: DEFAULT_TREE_CACHE_CAPACITY,
            blob_cache_bytes: None,
            tree_depth: DEFAULT_TREE_DEPTH,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Shared download pool, caches and collaborators.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use geodata_tiles::{ReqwestFetcher, Session, SessionConfig, StaticEndpoints, StaticHeaders};
///
/// let session = Session::new(
///     ReqwestFetcher::default(),
///     Arc::new(StaticEndpoints::new()),
///     Arc::new(StaticHeaders::none()),
///     SessionConfig::default(),
/// );
/// let data = session.resolve_tile(&request).await?;
/// ```
pub struct Session<F> {
    downloads: Arc<DownloadManager<F>>,
    endpoints: Arc<dyn EndpointResolver>,
    headers: Arc<dyn HeaderProvider>,
    trees: TileTreeCache,
    blobs: Option<BlobCache>,
    tree_depth: u32,
}

impl<F: HttpFetcher> Session<F> {
    pub fn new(
        fetcher: F,
        endpoints: Arc<dyn EndpointResolver>,
        headers: Arc<dyn HeaderProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            downloads: DownloadManager::new(fetcher, config.download).shared(),
            endpoints,
            headers,
            trees: TileTreeCache::with_capacity(config.tree_cache_capacity),
            blobs: config.blob_cache_bytes.map(BlobCache::with_capacity),
            tree_depth: config.tree_depth,
        }
    }

    /// A resolver sharing this session's pool and caches.
    pub fn resolver(&self) -> TileResolver<F> {
        let resolver = TileResolver::new(
            Arc::clone(&self.downloads),
            Arc::clone(&self.endpoints),
            Arc::clone(&self.headers),
            self.trees.clone(),
        )
        .with_depth(self.tree_depth);

        match &self.blobs {
            Some(blobs) => resolver.with_blob_cache(blobs.clone()),
            None => resolver,
        }
    }

    /// Shorthand for `self.resolver().resolve_tile(request)`.
    pub async fn resolve_tile(&self, request: &TileRequest) -> Result<TileData, TileError> {
        self.resolver().resolve_tile(request).await
    }

    pub fn downloads(&self) -> &Arc<DownloadManager<F>> {
        &self.downloads
    }

    pub fn tree_cache(&self) -> &TileTreeCache {
        &self.trees
    }

    pub fn blob_cache(&self) -> Option<&BlobCache> {
        self.blobs.as_ref()
    }
}
