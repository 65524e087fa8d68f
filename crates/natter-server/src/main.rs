//! # natter-server
//!
//! HTTP and WebSocket front end for natter.
//!
//! This binary provides:
//! - **REST API** (axum) for registration, login, profiles, user search,
//!   friend requests and message history
//! - **WebSocket push** of new messages to open conversation views
//! - **SQLite persistence** through `natter-store`

mod api;
mod config;
mod error;

use std::sync::Arc;

use natter_core::Core;
use natter_shared::{PasswordHasher, SessionKeys};
use natter_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

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
                .unwrap_or_else(|_| EnvFilter::new("info,natter_server=debug,natter_core=debug")),
        )
        .init();

    info!("Starting natter server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env()?;
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            info!(path = %path.display(), "opening database");
            Database::open_at(path)?
        }
        None => Database::open_default()?,
    };

    let keys = SessionKeys::from_secret(config.session_secret.as_bytes())?
        .with_ttl(chrono::Duration::days(config.session_ttl_days));
    let hasher = PasswordHasher::new(config.password_memory_kib, config.password_iterations)?;

    let app_state = AppState {
        core: Core::new(db, keys, hasher),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
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
