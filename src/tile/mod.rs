//! Quad-tree tiles and tile resolution.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Caller                  │
//! └────────────────────┬────────────────────┘
//!                      │ resolve_tile(T)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileResolver               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ TileTreeCache│  │   BlobCache     │  │
//! │  │ (quad-tree   │  │   (optional)    │  │
//! │  │  indexes)    │  │                 │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            DownloadManager              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileKey`]: `(row, column, level)` quad-tree key with Morton encoding
//! - [`QuadTreeIndex`]: index response listing sub quads and parent quads
//! - [`TileResolver`]: walks from the requested tile towards the index root
//!   and downloads the first blob found
//! - [`TileRequest`] / [`TileData`]: request parameters and outcome

mod index;
mod key;
mod resolver;

pub use index::{ParentQuad, QuadTreeIndex, SubQuad};
pub use key::{TileKey, MAX_LEVEL};
pub use resolver::{
    FetchMode, LayerType, TileBlob, TileData, TileRequest, TileResolver, DEFAULT_TREE_DEPTH,
};
