use thiserror::Error;

/// Errors raised by [`EvictionCache`](crate::cache::EvictionCache).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The value alone costs more than the cache can ever hold
    #[error("Value cost {cost} exceeds cache capacity {capacity}")]
    Capacity { cost: usize, capacity: usize },
}

/// Errors raised by the download layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Terminal HTTP failure (non-retryable status, or retries exhausted)
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The caller's cancellation token fired
    #[error("Request cancelled")]
    Cancelled,

    /// The request URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The raw fetch primitive failed without producing a response
    #[error("Transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Whether this error is the expected outcome of a cancelled request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors from the collaborators that supply base URLs and request headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// No base URL is known for the requested service
    #[error("No base URL for service '{service}' version '{version}'")]
    UnknownService { service: String, version: String },

    /// Request headers could not be produced
    #[error("Header error: {0}")]
    Headers(String),
}

/// Errors that can occur when resolving a tile.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Download failed (including cancellation)
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Base URL or header resolution failed
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// The quad-tree walk found no data for the tile at any covered level
    #[error("No data found for tile {tile}")]
    NotFound { tile: String },

    /// Malformed tile key (out of range row/column/level, bad Morton code)
    #[error("Invalid tile key: {0}")]
    InvalidTileKey(String),

    /// The quad-tree index response body could not be decoded
    #[error("Invalid quad-tree index: {0}")]
    InvalidIndex(String),

    /// Versioned layers require a version for this operation
    #[error("Layer '{layer}' is versioned but no version was given")]
    MissingVersion { layer: String },
}

impl TileError {
    /// Whether this error stems from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TileError::Fetch(e) if e.is_cancelled())
    }
}
