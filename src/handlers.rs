// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the wiki saver service.
//!
//! `/api/auth` releases the access token to callers who know the gate
//! password. `/save` commits a wiki to GitHub after rate limiting,
//! password, content and size checks. Both answer preflight `OPTIONS` and
//! reject other methods with 405.

use crate::config::{Config, ConfigError};
use crate::cors;
use crate::error::PublishError;
use crate::gate::AuthGate;
use crate::github::GitHubClient;
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::publisher::Publisher;
use crate::store::{CommitInfo, ContentStore, RepoTarget};
use crate::validator::PublishValidator;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http_body_util::LengthLimitError;
use serde::Serialize;
use serde_json::json;
use std::error::Error as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub gate: AuthGate,
    pub limiter: RateLimiter,
    pub validator: PublishValidator,
    pub publisher: Publisher,
    pub target: Option<RepoTarget>,
    pub config: Config,
}

impl AppState {
    /// Build state that publishes to GitHub.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let store = Arc::new(GitHubClient::new(&config.github)?);
        Self::with_store(config, store)
    }

    /// Build state around an arbitrary content store.
    pub fn with_store(config: Config, store: Arc<dyn ContentStore>) -> Result<Self, ConfigError> {
        let credentials = &config.credentials;
        Ok(Self {
            gate: AuthGate::new(
                credentials.gate_password.clone(),
                credentials.access_token.clone(),
            ),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            validator: PublishValidator::new(
                credentials.save_password.clone(),
                config.publish.max_content_size,
            ),
            publisher: Publisher::new(store, &config.publish),
            target: config.github.target()?,
            config,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Save success response.
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub message: &'static str,
    pub commit: String,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route(
            "/api/auth",
            post(auth)
                .fallback(auth_method_not_allowed)
                .layer(cors::auth_cors_layer()),
        )
        .route(
            "/save",
            post(save)
                .options(save_preflight)
                .fallback(save_method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "wiki-saver",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Auth gate: trade the gate password for the access token.
pub async fn auth(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let outcome = state.gate.check_body(&body);
    info!(outcome = outcome.label(), "Auth gate attempt");
    outcome.into_response()
}

async fn auth_method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "success": false,
            "message": "Method not allowed. Use POST.",
        })),
    )
        .into_response()
}

/// Preflight for the save endpoint.
pub async fn save_preflight(headers: HeaderMap) -> Response {
    (
        StatusCode::OK,
        cors::save_headers(headers.get(header::ORIGIN)),
    )
        .into_response()
}

async fn save_method_not_allowed(headers: HeaderMap) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        cors::save_headers(headers.get(header::ORIGIN)),
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

/// Save endpoint: commit the submitted wiki to the configured file.
pub async fn save(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let cors_headers = cors::save_headers(headers.get(header::ORIGIN));
    let client = client_id(&headers, peer.map(|ConnectInfo(addr)| addr));

    match publish(&state, &client, &headers, body).await {
        Ok(commit) => (
            cors_headers,
            Json(SaveResponse {
                success: true,
                message: "Wiki saved successfully",
                commit: commit.commit_sha,
            }),
        )
            .into_response(),
        Err(err) => {
            warn!(
                client = %client,
                status = err.status().as_u16(),
                error = %err,
                "Save rejected"
            );
            (cors_headers, err).into_response()
        }
    }
}

async fn publish(
    state: &AppState,
    client: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<CommitInfo, PublishError> {
    if let RateLimitResult::Limited { retry_after } = state.limiter.check(client).await {
        return Err(PublishError::RateLimited { retry_after });
    }

    let password = headers
        .get(cors::password_header())
        .and_then(|v| v.to_str().ok());
    state.validator.authorize(password)?;

    let limit = state.config.publish.body_limit();
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(PublishError::BodyTooLarge { limit });
    }
    let body = to_bytes(body, limit).await.map_err(|err| {
        debug!(error = %err, limit, "Failed to read save body");
        if exceeds_limit(&err) {
            PublishError::BodyTooLarge { limit }
        } else {
            PublishError::BodyRead(err.to_string())
        }
    })?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let content = state.validator.extract_content(content_type, &body)?;
    state.validator.check_size(&content)?;

    let target = state
        .target
        .as_ref()
        .ok_or(PublishError::Misconfigured("no target repository"))?;

    info!(client, %target, bytes = content.len(), "Saving wiki");
    state.publisher.publish(target, content.as_bytes()).await
}

/// Whether a body read failed because it hit the size cap rather than
/// because the stream broke.
fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if inner.is::<LengthLimitError>() {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Identify the caller for rate limiting: the CDN-supplied client IP, then
/// the first forwarded hop, then the socket peer.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header_value("cf-connecting-ip")
        .or_else(|| {
            header_value("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
