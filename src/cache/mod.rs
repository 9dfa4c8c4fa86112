//! Caching layer.
//!
//! - [`EvictionCache`]: general-purpose LRU cache with per-entry cost
//! - [`TileTreeCache`]: shared cache of quad-tree index responses
//! - [`BlobCache`]: shared byte-budgeted cache of tile blobs

mod blob_cache;
mod lru;
mod tree_cache;

pub use blob_cache::{BlobCache, BlobCacheKey};
pub use lru::{CostFn, EvictionCache, EvictionHook, Iter};
pub use tree_cache::{SharedTrees, TileTreeCache, TreeCacheKey, DEFAULT_TREE_CACHE_CAPACITY};
