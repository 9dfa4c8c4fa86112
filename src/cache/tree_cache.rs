//! Cache for quad-tree index responses.
//!
//! Trees are cached by a composite key:
//! - Resource identity (catalog)
//! - Layer id
//! - Optional layer version
//! - Root tile of the tree
//! - Requested depth
//!
//! There is no TTL. Entries stay valid until capacity pressure evicts them.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::lru::EvictionCache;
use crate::error::CacheError;
use crate::tile::{QuadTreeIndex, TileKey};

/// Default number of trees to keep.
pub const DEFAULT_TREE_CACHE_CAPACITY: usize = 1000;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for a quad-tree index.
///
/// A key without a version and a key with any version are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeCacheKey {
    /// Catalog identity
    pub resource: Arc<str>,

    /// Layer id within the catalog
    pub layer: Arc<str>,

    /// Layer version, `None` for volatile layers
    pub version: Option<u64>,

    /// Root tile of the tree
    pub root: TileKey,

    /// Number of levels below the root the tree covers
    pub depth: u32,
}

impl TreeCacheKey {
    /// Create a new cache key.
    pub fn new(
        resource: impl Into<Arc<str>>,
        layer: impl Into<Arc<str>>,
        version: Option<u64>,
        root: TileKey,
        depth: u32,
    ) -> Self {
        Self {
            resource: resource.into(),
            layer: layer.into(),
            version,
            root,
            depth,
        }
    }
}

// =============================================================================
// Tree Cache
// =============================================================================

/// Eviction cache of trees shared between facades and their owner.
pub type SharedTrees = Arc<Mutex<EvictionCache<TreeCacheKey, Arc<QuadTreeIndex>>>>;

/// Shared cache of quad-tree index responses.
///
/// Cloning is cheap and every clone sees the same entries, so all resolvers
/// of one session share cache pressure.
#[derive(Clone)]
pub struct TileTreeCache {
    inner: SharedTrees,
}

impl TileTreeCache {
    /// Create a cache holding up to `capacity` trees.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_shared(Arc::new(Mutex::new(EvictionCache::new(capacity))))
    }

    /// Wrap an existing eviction cache owned by the caller.
    pub fn from_shared(inner: SharedTrees) -> Self {
        Self { inner }
    }

    /// Look up a tree, marking it as recently used.
    pub async fn get(&self, key: &TreeCacheKey) -> Option<Arc<QuadTreeIndex>> {
        let mut trees = self.inner.lock().await;
        let hit = trees.get(key).cloned();
        debug!(
            root = %key.root,
            layer = %key.layer,
            hit = hit.is_some(),
            "tree cache lookup"
        );
        hit
    }

    /// Store a tree.
    pub async fn put(&self, key: TreeCacheKey, tree: Arc<QuadTreeIndex>) -> Result<(), CacheError> {
        let mut trees = self.inner.lock().await;
        trees.set(key, tree)
    }

    /// Number of cached trees.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no trees are cached.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Drop every cached tree.
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Maximum number of trees.
    pub async fn capacity(&self) -> usize {
        self.inner.lock().await.capacity()
    }
}

impl Default for TileTreeCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TREE_CACHE_CAPACITY)
    }
}

// =============================================================================
// Tests
// =============================================================================
