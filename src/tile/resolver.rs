//! Tile resolution over quad-tree indexes.
//!
//! Answers "give me the data for tile T" with as few round-trips as
//! possible:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          resolve_tile(T)                         │
//! │                                                                  │
//! │  1. R = T moved up D levels (D = 4)                              │
//! │  2. Probe tree cache for T-1 .. T-D        ──► TileTreeCache     │
//! │  3. Miss: fetch index rooted at R, depth D ──► DownloadManager   │
//! │     and cache it                                                 │
//! │  4. Empty index (no sub quads, no parents) ──► NoContent         │
//! │  5. Walk T, parent(T), ... up to the tree root and take the      │
//! │     first level with a sub quad            ──► blob download     │
//! │  6. Nothing matched                        ──► NotFound          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The resolver keeps no state between requests apart from the shared
//! caches and download pool. Two concurrent resolutions under the same
//! root may both miss the cache and both fetch the index.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::index::QuadTreeIndex;
use super::key::{TileKey, MAX_LEVEL};
use crate::cache::{BlobCache, BlobCacheKey, TileTreeCache, TreeCacheKey};
use crate::endpoint::{
    EndpointResolver, HeaderProvider, BLOB_SERVICE, QUERY_SERVICE, SERVICE_VERSION,
    VOLATILE_BLOB_SERVICE,
};
use crate::error::TileError;
use crate::io::{DownloadManager, DownloadOptions, HttpFetcher};

/// Levels covered by one quad-tree index request.
pub const DEFAULT_TREE_DEPTH: u32 = 4;

/// Status a server uses for "no index under this root".
const NO_CONTENT: u16 = 204;

// =============================================================================
// Tile Request
// =============================================================================

/// Whether caches may be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Use cached indexes and blobs when present, fetch otherwise
    #[default]
    OnlineIfNotFound,

    /// Always fetch; never read or write caches
    OnlineOnly,
}

/// Kind of layer, which selects the endpoints used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayerType {
    /// Immutable, version-addressed data
    #[default]
    Versioned,

    /// Mutable data without versions
    Volatile,
}

/// A request for one tile of one layer.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Catalog identity
    pub catalog: String,

    /// Layer id
    pub layer: String,

    pub layer_type: LayerType,

    /// Layer version, required for versioned layers
    pub version: Option<u64>,

    /// The requested tile
    pub tile: TileKey,

    pub fetch_mode: FetchMode,

    /// Cancels all downloads of this request
    pub cancel: Option<CancellationToken>,
}

impl TileRequest {
    /// Request a tile of a versioned layer at a given version.
    pub fn versioned(
        catalog: impl Into<String>,
        layer: impl Into<String>,
        version: u64,
        tile: TileKey,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            layer: layer.into(),
            layer_type: LayerType::Versioned,
            version: Some(version),
            tile,
            fetch_mode: FetchMode::default(),
            cancel: None,
        }
    }

    /// Request a tile of a volatile layer.
    pub fn volatile(catalog: impl Into<String>, layer: impl Into<String>, tile: TileKey) -> Self {
        Self {
            catalog: catalog.into(),
            layer: layer.into(),
            layer_type: LayerType::Volatile,
            version: None,
            tile,
            fetch_mode: FetchMode::default(),
            cancel: None,
        }
    }

    pub fn with_fetch_mode(mut self, fetch_mode: FetchMode) -> Self {
        self.fetch_mode = fetch_mode;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn uses_cache(&self) -> bool {
        self.fetch_mode != FetchMode::OnlineOnly
    }

    fn tree_cache_key(&self, root: TileKey, depth: u32) -> TreeCacheKey {
        TreeCacheKey::new(
            self.catalog.as_str(),
            self.layer.as_str(),
            self.version,
            root,
            depth,
        )
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Data found for a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBlob {
    /// The blob bytes
    pub data: Bytes,

    /// Tile the data belongs to: the requested tile or one of its ancestors
    pub tile: TileKey,

    /// Handle the blob was fetched with
    pub data_handle: String,

    /// Whether the blob came from the blob cache
    pub cache_hit: bool,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileData {
    /// Data for the tile or its nearest ancestor with data
    Blob(TileBlob),

    /// The index under the tile's root is empty: no data exists at any level
    NoContent,
}

impl TileData {
    /// The blob, if any.
    pub fn blob(&self) -> Option<&TileBlob> {
        match self {
            TileData::Blob(blob) => Some(blob),
            TileData::NoContent => None,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, TileData::NoContent)
    }
}

// =============================================================================
// Tile Resolver
// =============================================================================

/// Resolves tiles to blobs through cached quad-tree indexes.
///
/// Cloning is cheap; clones share the download pool and caches.
pub struct TileResolver<F> {
    downloads: Arc<DownloadManager<F>>,
    endpoints: Arc<dyn EndpointResolver>,
    headers: Arc<dyn HeaderProvider>,
    trees: TileTreeCache,
    blobs: Option<BlobCache>,
    depth: u32,
}

impl<F> Clone for TileResolver<F> {
    fn clone(&self) -> Self {
        Self {
            downloads: Arc::clone(&self.downloads),
            endpoints: Arc::clone(&self.endpoints),
            headers: Arc::clone(&self.headers),
            trees: self.trees.clone(),
            blobs: self.blobs.clone(),
            depth: self.depth,
        }
    }
}

impl<F: HttpFetcher> TileResolver<F> {
    /// Create a resolver without a blob cache, using [`DEFAULT_TREE_DEPTH`].
    pub fn new(
        downloads: Arc<DownloadManager<F>>,
        endpoints: Arc<dyn EndpointResolver>,
        headers: Arc<dyn HeaderProvider>,
        trees: TileTreeCache,
    ) -> Self {
        Self {
            downloads,
            endpoints,
            headers,
            trees,
            blobs: None,
            depth: DEFAULT_TREE_DEPTH,
        }
    }

    /// Cache blobs in addition to indexes.
    pub fn with_blob_cache(mut self, blobs: BlobCache) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Levels covered by each index request, clamped to `1..=MAX_LEVEL`.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth.clamp(1, MAX_LEVEL);
        self
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Resolve a tile to its blob, falling back to the nearest ancestor
    /// inside the index that has data.
    ///
    /// # Errors
    ///
    /// - [`TileError::NotFound`] if no level between the tile and the index
    ///   root has data
    /// - [`TileError::Fetch`] / [`TileError::Endpoint`] from the index or
    ///   blob download, unmodified
    /// - [`TileError::InvalidTileKey`] / [`TileError::MissingVersion`] for
    ///   malformed requests
    pub async fn resolve_tile(&self, request: &TileRequest) -> Result<TileData, TileError> {
        let tile = request.tile;
        if !tile.is_valid() {
            return Err(TileError::InvalidTileKey(format!(
                "tile {tile} is outside the grid of its level"
            )));
        }
        self.require_version(request)?;

        let cached = if request.uses_cache() {
            self.cached_tree(request).await
        } else {
            None
        };

        let (root, tree) = match cached {
            Some(found) => found,
            None => {
                let root = tile.changed_level_by(-(self.depth as i32));
                let tree = Arc::new(self.fetch_quad_tree_index(request, root, self.depth).await?);
                if request.uses_cache() {
                    let key = request.tree_cache_key(root, self.depth);
                    if let Err(e) = self.trees.put(key, Arc::clone(&tree)).await {
                        warn!(root = %root, "not caching quad-tree index: {}", e);
                    }
                }
                (root, tree)
            }
        };

        if tree.is_empty() {
            debug!(tile = %tile, root = %root, "empty quad-tree index, no content");
            return Ok(TileData::NoContent);
        }

        let mut current = tile;
        loop {
            let key = current.relative_key(current.level - root.level);
            if let Some(quad) = tree.find_sub_quad(&key) {
                debug!(
                    tile = %tile,
                    resolved = %current,
                    data_handle = %quad.data_handle,
                    "resolved tile"
                );
                let (data, cache_hit) = self.fetch_blob(request, &quad.data_handle).await?;
                return Ok(TileData::Blob(TileBlob {
                    data,
                    tile: current,
                    data_handle: quad.data_handle.clone(),
                    cache_hit,
                }));
            }

            if current.level <= root.level {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(TileError::NotFound {
            tile: tile.to_string(),
        })
    }

    /// Download the quad-tree index rooted at `root` covering `depth` levels.
    ///
    /// Does not consult or fill the tree cache. A 204 response is an empty
    /// index.
    pub async fn fetch_quad_tree_index(
        &self,
        request: &TileRequest,
        root: TileKey,
        depth: u32,
    ) -> Result<QuadTreeIndex, TileError> {
        if !root.is_valid() {
            return Err(TileError::InvalidTileKey(format!(
                "index root {root} is outside the grid of its level"
            )));
        }
        let base = self
            .endpoints
            .base_url(QUERY_SERVICE, SERVICE_VERSION, Some(&request.catalog))
            .await?;

        let url = match request.layer_type {
            LayerType::Versioned => {
                let version = request.version.ok_or_else(|| TileError::MissingVersion {
                    layer: request.layer.clone(),
                })?;
                format!(
                    "{base}/layers/{}/versions/{version}/quadkeys/{}/depths/{depth}",
                    request.layer,
                    root.to_here_tile()
                )
            }
            LayerType::Volatile => format!(
                "{base}/layers/{}/quadkeys/{}/depths/{depth}",
                request.layer,
                root.to_here_tile()
            ),
        };

        debug!(root = %root, depth, layer = %request.layer, "fetching quad-tree index");
        let response = self
            .downloads
            .download(&url, self.download_options(request).await?)
            .await?
            .error_for_status()?;

        if response.status == NO_CONTENT {
            return Ok(QuadTreeIndex::default());
        }
        QuadTreeIndex::from_slice(&response.body)
    }

    /// Probe the tree cache for indexes rooted 1 to `depth` levels above the
    /// tile. Every level is probed and the last hit wins.
    async fn cached_tree(&self, request: &TileRequest) -> Option<(TileKey, Arc<QuadTreeIndex>)> {
        let mut found = None;
        for up in 1..=self.depth {
            let root = request.tile.changed_level_by(-(up as i32));
            if let Some(tree) = self.trees.get(&request.tree_cache_key(root, self.depth)).await {
                found = Some((root, tree));
            }
        }
        found
    }

    async fn fetch_blob(
        &self,
        request: &TileRequest,
        data_handle: &str,
    ) -> Result<(Bytes, bool), TileError> {
        let cache_key = BlobCacheKey::new(
            request.catalog.as_str(),
            request.layer.as_str(),
            data_handle,
        );
        let blobs = self.blobs.as_ref().filter(|_| request.uses_cache());

        if let Some(blobs) = blobs {
            if let Some(data) = blobs.get(&cache_key).await {
                return Ok((data, true));
            }
        }

        let service = match request.layer_type {
            LayerType::Versioned => BLOB_SERVICE,
            LayerType::Volatile => VOLATILE_BLOB_SERVICE,
        };
        let base = self
            .endpoints
            .base_url(service, SERVICE_VERSION, Some(&request.catalog))
            .await?;
        let url = format!("{base}/layers/{}/data/{data_handle}", request.layer);

        let response = self
            .downloads
            .download(&url, self.download_options(request).await?)
            .await?
            .error_for_status()?;

        if let Some(blobs) = blobs {
            if let Err(e) = blobs.put(cache_key, response.body.clone()).await {
                warn!(data_handle, "not caching blob: {}", e);
            }
        }

        Ok((response.body, false))
    }

    async fn download_options(&self, request: &TileRequest) -> Result<DownloadOptions, TileError> {
        let mut options = DownloadOptions::new(self.headers.headers().await?);
        options.cancel = request.cancel.clone();
        Ok(options)
    }

    fn require_version(&self, request: &TileRequest) -> Result<(), TileError> {
        if request.layer_type == LayerType::Versioned && request.version.is_none() {
            return Err(TileError::MissingVersion {
                layer: request.layer.clone(),
            });
        }
        Ok(())
    }
}
