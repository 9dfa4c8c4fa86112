//! # geodata-tiles
//!
//! Client-side tile resolution for layers of a geospatial data platform
//! whose data is partitioned into a quad-tree of tiles.
//!
//! Given a tile, the library finds the blob holding its data (or, if the
//! tile has none, the blob of its nearest ancestor that does) with as few
//! network round-trips as possible.
//!
//! ## Features
//!
//! - **Quad-tree indexes**: one request describes a root tile and the four
//!   levels below it, and is cached for later lookups
//! - **Ancestor fallback**: tiles without data resolve to the nearest
//!   ancestor with data inside the index
//! - **Bounded downloads**: a shared pool caps simultaneous requests and
//!   retries 429/500/503 with backoff
//! - **Cancellation**: every request can be cancelled cooperatively
//! - **LRU caching**: a generic cost-based LRU cache with eviction hooks
//!
//! ## Architecture
//!
//! - [`cache`] - `EvictionCache` and the index and blob caches built on it
//! - [`io`] - the download layer: fetch primitive, retries, concurrency
//! - [`tile`] - tile keys, index responses and the resolver
//! - [`endpoint`] - base-URL discovery and request headers
//! - [`session`] - shared pool and caches handing out resolvers
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use geodata_tiles::{
//!     ReqwestFetcher, Session, SessionConfig, StaticEndpoints, StaticHeaders, TileData, TileKey,
//!     TileRequest, BLOB_SERVICE, QUERY_SERVICE, SERVICE_VERSION,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let query = "https://query.example.com/v1/catalogs/{resource}";
//!     let blob = "https://blob.example.com/v1/catalogs/{resource}";
//!     let endpoints = StaticEndpoints::new()
//!         .with_service(QUERY_SERVICE, SERVICE_VERSION, query)
//!         .with_service(BLOB_SERVICE, SERVICE_VERSION, blob);
//!
//!     let session = Session::new(
//!         ReqwestFetcher::default(),
//!         Arc::new(endpoints),
//!         Arc::new(StaticHeaders::bearer("token")?),
//!         SessionConfig::default(),
//!     );
//!
//!     let request = TileRequest::versioned("hrn:catalog", "roads", 42, TileKey::new(5, 9, 4));
//!     match session.resolve_tile(&request).await? {
//!         TileData::Blob(blob) => println!("{} bytes for {}", blob.data.len(), blob.tile),
//!         TileData::NoContent => println!("no data"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod io;
pub mod session;
pub mod tile;

// Re-export commonly used types
pub use cache::{
    BlobCache, BlobCacheKey, EvictionCache, TileTreeCache, TreeCacheKey,
    DEFAULT_TREE_CACHE_CAPACITY,
};
pub use config::{Cli, Command};
pub use endpoint::{
    EndpointResolver, HeaderProvider, StaticEndpoints, StaticHeaders, BLOB_SERVICE,
    QUERY_SERVICE, SERVICE_VERSION, VOLATILE_BLOB_SERVICE,
};
pub use error::{CacheError, EndpointError, FetchError, TileError};
pub use io::{
    DownloadConfig, DownloadManager, DownloadOptions, FetchRequest, FetchResponse, HttpFetcher,
    ReqwestFetcher, RetryPolicy, DEFAULT_MAX_CONCURRENT,
};
pub use session::{Session, SessionConfig};
pub use tile::{
    FetchMode, LayerType, ParentQuad, QuadTreeIndex, SubQuad, TileBlob, TileData, TileKey,
    TileRequest, TileResolver, DEFAULT_TREE_DEPTH,
};
