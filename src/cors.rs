// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CORS policies for the two endpoints.
//!
//! The auth gate uses a plain wildcard `CorsLayer`. The save endpoint echoes
//! the caller's origin but answers `*` for a missing origin or the literal
//! `null` origin browsers send from `file://` pages, which `CorsLayer` cannot
//! express, so its headers are built here and attached by the handler.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::validator::PASSWORD_HEADER;

/// Preflight cache lifetime for the save endpoint.
pub const SAVE_MAX_AGE_SECS: u64 = 86_400;

/// Wildcard policy for the auth gate: POST/OPTIONS with `Content-Type`.
pub fn auth_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// CORS headers for a save endpoint response.
pub fn save_headers(origin: Option<&HeaderValue>) -> HeaderMap {
    let allow_origin = match origin {
        Some(value) if !value.is_empty() && value != "null" => value.clone(),
        _ => HeaderValue::from_static("*"),
    };

    let mut headers = HeaderMap::with_capacity(5);
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-Password"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(SAVE_MAX_AGE_SECS));
    // The allowed origin depends on the request
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    headers
}

/// Name of the save password header.
pub fn password_header() -> HeaderName {
    HeaderName::from_static(PASSWORD_HEADER)
}
