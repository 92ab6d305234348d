// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Password gate that releases the access token.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::Secret;

/// Auth gate request body.
#[derive(Debug, Deserialize)]
pub struct GateRequest {
    #[serde(default)]
    pub password: Option<String>,
}

/// Auth gate response body.
#[derive(Debug, Serialize)]
pub struct GateResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Granted(Secret),
    Denied,
    MissingPassword,
    Misconfigured,
}

impl GateOutcome {
    /// Short label for logs. Never includes either secret.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Granted(_) => "granted",
            Self::Denied => "denied",
            Self::MissingPassword => "missing_password",
            Self::Misconfigured => "misconfigured",
        }
    }
}

/// Compares a candidate against the configured gate password.
pub struct AuthGate {
    password: Option<Secret>,
    token: Option<Secret>,
}

impl AuthGate {
    pub fn new(password: Option<Secret>, token: Option<Secret>) -> Self {
        Self { password, token }
    }

    /// Check a candidate password. Configuration problems take precedence
    /// so a broken deployment is never reported as a bad password.
    pub fn check(&self, candidate: Option<&str>) -> GateOutcome {
        let (Some(password), Some(token)) = (&self.password, &self.token) else {
            return GateOutcome::Misconfigured;
        };

        match candidate {
            None => GateOutcome::MissingPassword,
            Some(candidate) if password.matches(candidate) => GateOutcome::Granted(token.clone()),
            Some(_) => GateOutcome::Denied,
        }
    }

    /// Parse a raw request body and check it. Bodies that are not a JSON
    /// object with a string `password` count as a missing password.
    pub fn check_body(&self, body: &[u8]) -> GateOutcome {
        let candidate = serde_json::from_slice::<GateRequest>(body)
            .ok()
            .and_then(|req| req.password);
        self.check(candidate.as_deref())
    }
}

impl IntoResponse for GateOutcome {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Granted(token) => (
                StatusCode::OK,
                GateResponse {
                    success: true,
                    message: "Authentication successful",
                    token: Some(token.expose().to_string()),
                },
            ),
            Self::Denied => (
                StatusCode::UNAUTHORIZED,
                GateResponse {
                    success: false,
                    message: "Invalid password",
                    token: None,
                },
            ),
            Self::MissingPassword => (
                StatusCode::BAD_REQUEST,
                GateResponse {
                    success: false,
                    message: "Password is required",
                    token: None,
                },
            ),
            Self::Misconfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                GateResponse {
                    success: false,
                    message: "Server misconfigured",
                    token: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}
