//! geodata-tiles - resolve quad-tree tiles of catalog layers from the command line.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geodata_tiles::{
    config::{Cli, Command, ConnectionConfig, KeyConfig, TileConfig, TreeConfig},
    ReqwestFetcher, Session, TileData, TileError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Tile(config) => run_tile(config).await,
        Command::Tree(config) => run_tree(config).await,
        Command::Key(config) => run_key(config),
    }
}

/// Initialize the tracing/logging subsystem. Logs go to stderr so that blobs
/// written to stdout stay clean.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "geodata_tiles=debug"
    } else {
        "geodata_tiles=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Build a session from connection settings.
fn open_session(
    connection: &ConnectionConfig,
    tree_depth: u32,
) -> Result<Session<ReqwestFetcher>, String> {
    let fetcher = ReqwestFetcher::with_timeout(connection.timeout()).map_err(|e| e.to_string())?;
    let headers = connection.headers()?;

    Ok(Session::new(
        fetcher,
        Arc::new(connection.endpoints()),
        Arc::new(headers),
        connection.session_config(tree_depth),
    ))
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let tile = match config.tile_key() {
        Ok(tile) => tile,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let session = match open_session(&config.connection, config.depth) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to set up session: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = config
        .layer
        .request(tile)
        .with_fetch_mode(config.fetch_mode())
        .with_cancel(interrupt_token());

    match session.resolve_tile(&request).await {
        Ok(TileData::NoContent) => {
            info!("No data exists for tile {} or any of its ancestors", tile);
            ExitCode::SUCCESS
        }
        Ok(TileData::Blob(blob)) => {
            if blob.tile != tile {
                info!("Tile {} has no data, using ancestor {}", tile, blob.tile);
            }
            info!(
                "Resolved {} bytes (data handle {})",
                blob.data.len(),
                blob.data_handle
            );

            let written = match config.output {
                Some(ref path) => tokio::fs::write(path, &blob.data).await,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&blob.data).and_then(|_| stdout.flush())
                }
            };
            if let Err(e) = written {
                error!("Failed to write blob: {}", e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

// =============================================================================
// Tree Command
// =============================================================================

async fn run_tree(config: TreeConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let root = match config.root_key() {
        Ok(root) => root,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let session = match open_session(&config.connection, config.depth) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to set up session: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = config.layer.request(root).with_cancel(interrupt_token());
    let index = match session
        .resolver()
        .fetch_quad_tree_index(&request, root, config.depth)
        .await
    {
        Ok(index) => index,
        Err(e) => return report_error(&e),
    };

    match serde_json::to_string_pretty(&index) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize index: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Key Command
// =============================================================================

fn run_key(config: KeyConfig) -> ExitCode {
    let tile = match config.tile_key() {
        Ok(tile) => tile,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let json = serde_json::json!({
        "level": tile.level,
        "row": tile.row,
        "column": tile.column,
        "mortonCode": tile.morton_code(),
        "parent": tile.parent().map(|p| p.to_here_tile()),
        "children": tile.children().iter().map(|c| c.to_here_tile()).collect::<Vec<_>>(),
    });

    match serde_json::to_string_pretty(&json) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(e: &TileError) -> ExitCode {
    if e.is_cancelled() {
        info!("Cancelled");
    } else {
        error!("{}", e);
    }
    ExitCode::FAILURE
}
