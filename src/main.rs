// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Wiki Saver Service
//!
//! Serves two endpoints for a browser-hosted wiki:
//!
//! - `POST /api/auth`: exchange the page password for the access token
//! - `POST /save`: commit the wiki (sent with an `X-Password` header) to a
//!   file in a GitHub repository
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables, optionally seeded
//! from a `.env` file:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `PAGE_PASSWORD`, `ACCESS_TOKEN`: auth gate password and released token
//! - `SAVE_PASSWORD`: password required on save
//! - `GITHUB_TOKEN`, `GITHUB_REPO`, `FILE_PATH`, `GITHUB_BRANCH`: commit target
//! - `MAX_CONTENT_SIZE`: content limit in bytes (default: 50 MB)
//! - `RATE_LIMIT_WINDOW_MS`, `RATE_LIMIT_MAX`: rate limit (default: 30 per 60s)
//! - `MAX_RETRIES`, `RETRY_BACKOFF_MS`, `REREAD_ON_CONFLICT`: retry policy

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wiki_saver::{config::Config, handlers::{self, AppState}};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load environment variables
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            warn!(error = %err, "Failed to read .env file");
        }
    }

    // Load configuration
    let config = Config::from_env()?;
    let state = Arc::new(AppState::from_config(config)?);
    let config = &state.config;

    info!(
        bind_addr = %config.bind_addr,
        target = ?state.target.as_ref().map(ToString::to_string),
        gate_configured = config.credentials.gate_password.is_some(),
        save_configured = config.credentials.save_password.is_some(),
        max_content_size = config.publish.max_content_size,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_ms = config.rate_limit.window_ms,
        "Starting wiki saver"
    );
    if state.target.is_none() {
        warn!("GITHUB_REPO is not set; saves will fail as misconfigured");
    }

    // Spawn cleanup task
    let cleanup_state = state.clone();
    let cleanup_interval = config.rate_limit.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            cleanup_state.limiter.cleanup().await;
        }
    });

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let app = handlers::router(state.clone());
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
