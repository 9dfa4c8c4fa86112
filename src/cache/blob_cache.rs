//! Byte-budgeted cache for tile blobs.
//!
//! Blobs are keyed by catalog, layer and data handle. The capacity is a byte
//! budget: each blob costs its length.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use super::lru::EvictionCache;
use crate::error::CacheError;

/// Cache key for a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobCacheKey {
    pub resource: Arc<str>,
    pub layer: Arc<str>,
    pub data_handle: Arc<str>,
}

impl BlobCacheKey {
    pub fn new(
        resource: impl Into<Arc<str>>,
        layer: impl Into<Arc<str>>,
        data_handle: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            resource: resource.into(),
            layer: layer.into(),
            data_handle: data_handle.into(),
        }
    }
}

/// Shared LRU cache of blob bytes with a total byte budget.
#[derive(Clone)]
pub struct BlobCache {
    inner: Arc<Mutex<EvictionCache<BlobCacheKey, Bytes>>>,
}

impl BlobCache {
    /// Create a cache holding at most `max_bytes` of blob data.
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EvictionCache::with_cost_fn(
                max_bytes,
                |data: &Bytes| data.len(),
            ))),
        }
    }

    /// Look up a blob, marking it as recently used.
    pub async fn get(&self, key: &BlobCacheKey) -> Option<Bytes> {
        self.inner.lock().await.get(key).cloned()
    }

    /// Store a blob. Fails if the blob alone exceeds the byte budget.
    pub async fn put(&self, key: BlobCacheKey, data: Bytes) -> Result<(), CacheError> {
        self.inner.lock().await.set(key, data)
    }

    /// Total cached bytes.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size()
    }

    /// Number of cached blobs.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}
