//! Command-line configuration for the `geodata-tiles` binary.
//!
//! Supports:
//! - Command-line arguments via clap
//! - Environment variables with the `GEODATA_` prefix
//! - Defaults matching the library defaults
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use geodata_tiles::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Tile(config) = cli.command {
//!     config.validate()?;
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `GEODATA_QUERY_URL` - Base URL of the query service (required for `tile` and `tree`)
//! - `GEODATA_BLOB_URL` - Base URL of the blob service (versioned layers)
//! - `GEODATA_VOLATILE_BLOB_URL` - Base URL of the volatile blob service
//! - `GEODATA_TOKEN` - Bearer token sent with every request
//! - `GEODATA_MAX_CONCURRENT` - Simultaneous downloads (default: 16)
//! - `GEODATA_MAX_RETRIES` - Retries on 429/500/503 (default: 3)
//! - `GEODATA_RETRY_DELAY_MS` - Initial backoff in milliseconds (default: 200)
//! - `GEODATA_TIMEOUT_SECS` - Per-attempt timeout in seconds (default: 30)
//! - `GEODATA_CACHE_TREES` - Quad-tree indexes to cache (default: 1000)
//! - `GEODATA_CACHE_BLOB_BYTES` - Blob cache budget in bytes (default: disabled)
//!
//! Base URLs may contain a `{resource}` placeholder that is replaced by the
//! catalog.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::cache::DEFAULT_TREE_CACHE_CAPACITY;
use crate::endpoint::{
    StaticEndpoints, StaticHeaders, BLOB_SERVICE, QUERY_SERVICE, SERVICE_VERSION,
    VOLATILE_BLOB_SERVICE,
};
use crate::io::{
    DownloadConfig, RetryPolicy, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MAX_RETRIES,
};
use crate::session::SessionConfig;
use crate::tile::{FetchMode, LayerType, TileKey, TileRequest, DEFAULT_TREE_DEPTH, MAX_LEVEL};

// =============================================================================
// Default Values
// =============================================================================

/// Default per-attempt timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// CLI Arguments
// =============================================================================

/// geodata-tiles - resolve quad-tree tiles of catalog layers to blobs.
#[derive(Parser, Debug, Clone)]
#[command(name = "geodata-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve a tile and write its blob (or the nearest ancestor's).
    Tile(TileConfig),

    /// Fetch and print a quad-tree index.
    Tree(TreeConfig),

    /// Convert between Morton codes and level/row/column.
    Key(KeyConfig),
}

/// Service endpoints, credentials and download tuning.
#[derive(Args, Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL of the query service.
    #[arg(long, env = "GEODATA_QUERY_URL")]
    pub query_url: String,

    /// Base URL of the blob service (versioned layers).
    #[arg(long, env = "GEODATA_BLOB_URL")]
    pub blob_url: Option<String>,

    /// Base URL of the volatile blob service (volatile layers).
    #[arg(long, env = "GEODATA_VOLATILE_BLOB_URL")]
    pub volatile_blob_url: Option<String>,

    /// Bearer token sent in the Authorization header.
    #[arg(long, env = "GEODATA_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Maximum simultaneous downloads.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT, env = "GEODATA_MAX_CONCURRENT")]
    pub max_concurrent: usize,

    /// Retries after the first attempt on 429, 500 and 503.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, env = "GEODATA_MAX_RETRIES")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_INITIAL_DELAY_MS, env = "GEODATA_RETRY_DELAY_MS")]
    pub retry_delay_ms: u64,

    /// Timeout of a single attempt, in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "GEODATA_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Maximum number of quad-tree indexes to cache.
    #[arg(long, default_value_t = DEFAULT_TREE_CACHE_CAPACITY, env = "GEODATA_CACHE_TREES")]
    pub cache_trees: usize,

    /// Byte budget of the blob cache. Blobs are not cached when unset.
    #[arg(long, env = "GEODATA_CACHE_BLOB_BYTES")]
    pub cache_blob_bytes: Option<usize>,
}

/// The layer a tile belongs to.
#[derive(Args, Debug, Clone)]
pub struct LayerConfig {
    /// Catalog identity.
    #[arg(long)]
    pub catalog: String,

    /// Layer id.
    #[arg(long)]
    pub layer: String,

    /// The layer is volatile (no versions).
    #[arg(long, default_value_t = false)]
    pub volatile: bool,

    /// Layer version (required for versioned layers).
    #[arg(long)]
    pub version: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    #[command(flatten)]
    pub connection: ConnectionConfig,

    #[command(flatten)]
    pub layer: LayerConfig,

    /// Tile as `level/row/column` or decimal Morton code.
    pub tile: String,

    /// Bypass the caches.
    #[arg(long, default_value_t = false)]
    pub online_only: bool,

    /// Write the blob to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Levels covered by each index request.
    #[arg(long, default_value_t = DEFAULT_TREE_DEPTH)]
    pub depth: u32,
}

#[derive(Args, Debug, Clone)]
pub struct TreeConfig {
    #[command(flatten)]
    pub connection: ConnectionConfig,

    #[command(flatten)]
    pub layer: LayerConfig,

    /// Root tile as `level/row/column` or decimal Morton code.
    pub root: String,

    /// Levels below the root to include.
    #[arg(long, default_value_t = DEFAULT_TREE_DEPTH)]
    pub depth: u32,
}

#[derive(Args, Debug, Clone)]
pub struct KeyConfig {
    /// Tile as `level/row/column` or decimal Morton code.
    pub tile: String,
}

// =============================================================================
// Validation and Conversion
// =============================================================================

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.query_url.is_empty() {
            return Err(
                "Query service URL is required. Set --query-url or GEODATA_QUERY_URL".to_string(),
            );
        }
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".to_string());
        }
        if self.cache_trees == 0 {
            return Err("cache_trees must be greater than 0".to_string());
        }
        if self.cache_blob_bytes == Some(0) {
            return Err("cache_blob_bytes must be greater than 0 when set".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Session settings for a given tree depth.
    pub fn session_config(&self, tree_depth: u32) -> SessionConfig {
        SessionConfig {
            download: DownloadConfig {
                max_concurrent: self.max_concurrent,
                retry: RetryPolicy {
                    max_retries: self.max_retries,
                    initial_delay: Duration::from_millis(self.retry_delay_ms),
                    ..RetryPolicy::default()
                },
            },
            tree_cache_capacity: self.cache_trees,
            blob_cache_bytes: self.cache_blob_bytes,
            tree_depth,
        }
    }

    /// Endpoint table with every configured service.
    pub fn endpoints(&self) -> StaticEndpoints {
        let mut endpoints =
            StaticEndpoints::new().with_service(QUERY_SERVICE, SERVICE_VERSION, &self.query_url);
        if let Some(ref url) = self.blob_url {
            endpoints = endpoints.with_service(BLOB_SERVICE, SERVICE_VERSION, url);
        }
        if let Some(ref url) = self.volatile_blob_url {
            endpoints = endpoints.with_service(VOLATILE_BLOB_SERVICE, SERVICE_VERSION, url);
        }
        endpoints
    }

    pub fn headers(&self) -> Result<StaticHeaders, String> {
        match self.token {
            Some(ref token) => StaticHeaders::bearer(token).map_err(|e| e.to_string()),
            None => Ok(StaticHeaders::none()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LayerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.catalog.is_empty() {
            return Err("catalog must not be empty".to_string());
        }
        if self.layer.is_empty() {
            return Err("layer must not be empty".to_string());
        }
        if self.volatile && self.version.is_some() {
            return Err("--version cannot be used with --volatile".to_string());
        }
        if !self.volatile && self.version.is_none() {
            return Err("Versioned layers require --version (or pass --volatile)".to_string());
        }
        Ok(())
    }

    /// Build a request for `tile` in this layer.
    pub fn request(&self, tile: TileKey) -> TileRequest {
        if self.volatile {
            return TileRequest::volatile(&self.catalog, &self.layer, tile);
        }
        TileRequest {
            catalog: self.catalog.clone(),
            layer: self.layer.clone(),
            layer_type: LayerType::Versioned,
            version: self.version,
            tile,
            fetch_mode: FetchMode::default(),
            cancel: None,
        }
    }
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.connection.validate()?;
        self.layer.validate()?;
        validate_depth(self.depth)?;
        self.tile_key()?;

        let blob_missing = if self.layer.volatile {
            self.connection.volatile_blob_url.is_none()
        } else {
            self.connection.blob_url.is_none()
        };
        if blob_missing {
            let (flag, env) = if self.layer.volatile {
                ("--volatile-blob-url", "GEODATA_VOLATILE_BLOB_URL")
            } else {
                ("--blob-url", "GEODATA_BLOB_URL")
            };
            return Err(format!("Blob service URL is required. Set {flag} or {env}"));
        }
        Ok(())
    }

    pub fn tile_key(&self) -> Result<TileKey, String> {
        parse_tile(&self.tile)
    }

    pub fn fetch_mode(&self) -> FetchMode {
        if self.online_only {
            FetchMode::OnlineOnly
        } else {
            FetchMode::OnlineIfNotFound
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.connection.validate()?;
        self.layer.validate()?;
        validate_depth(self.depth)?;
        self.root_key()?;
        Ok(())
    }

    pub fn root_key(&self) -> Result<TileKey, String> {
        parse_tile(&self.root)
    }
}

impl KeyConfig {
    pub fn tile_key(&self) -> Result<TileKey, String> {
        parse_tile(&self.tile)
    }
}

fn parse_tile(tile: &str) -> Result<TileKey, String> {
    tile.parse::<TileKey>().map_err(|e| e.to_string())
}

fn validate_depth(depth: u32) -> Result<(), String> {
    if depth == 0 || depth > MAX_LEVEL {
        return Err(format!("depth must be between 1 and {MAX_LEVEL}"));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
