//! Quad-tree index responses.
//!
//! A quad-tree index describes, for a root tile and a depth, which tiles have
//! retrievable data:
//!
//! ```json
//! {
//!   "subQuads": [
//!     { "subQuadKey": "1", "version": 12, "dataHandle": "1f2e..." }
//!   ],
//!   "parentQuads": [
//!     { "partition": "23", "version": 9, "dataHandle": "a7c3..." }
//!   ]
//! }
//! ```
//!
//! `subQuadKey` is the key of a descendant relative to the root (see
//! [`TileKey::relative_key`](super::TileKey::relative_key)); `partition` is
//! the absolute Morton code of an ancestor of the root.

use serde::{Deserialize, Serialize};

use crate::error::TileError;

/// A descendant of the root (or the root itself) that has data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuad {
    /// Path key relative to the root
    pub sub_quad_key: String,

    /// Layer version that last wrote this tile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    /// Handle used to fetch the blob
    pub data_handle: String,
}

/// An ancestor of the root that has aggregated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentQuad {
    /// Absolute tile identifier (decimal Morton code)
    pub partition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    pub data_handle: String,
}

/// Quad-tree index rooted at one tile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuadTreeIndex {
    #[serde(default)]
    pub sub_quads: Vec<SubQuad>,

    #[serde(default)]
    pub parent_quads: Vec<ParentQuad>,
}

impl QuadTreeIndex {
    /// Decode a JSON response body. An empty body is an empty index.
    pub fn from_slice(body: &[u8]) -> Result<Self, TileError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| TileError::InvalidIndex(e.to_string()))
    }

    /// No data exists under the root at any level.
    pub fn is_empty(&self) -> bool {
        self.sub_quads.is_empty() && self.parent_quads.is_empty()
    }

    /// Find the descendant entry with the given relative key.
    pub fn find_sub_quad(&self, sub_quad_key: &str) -> Option<&SubQuad> {
        self.sub_quads
            .iter()
            .find(|quad| quad.sub_quad_key == sub_quad_key)
    }
}
