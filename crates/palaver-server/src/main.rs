//! # palaver-server
//!
//! HTTP backend for the Palaver chat application.
//!
//! This binary provides:
//! - **REST API** (axum) exposing the full client surface: conversations,
//!   messages, reactions, typing signals, presence and unread counts
//! - **Identity webhook** that keeps the user directory in sync with the
//!   external identity provider
//! - **SQLite storage** via `palaver-store`, opened in the platform data
//!   directory (or `PALAVER_DB_PATH`)

mod api;
mod config;
mod error;
mod webhook;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_engine::ChatEngine;
use palaver_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,palaver_server=debug")),
        )
        .init();

    info!("Starting Palaver server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open storage and build the engine
    // -----------------------------------------------------------------------
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let engine = Arc::new(ChatEngine::new(database));

    let app_state = AppState { engine };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
