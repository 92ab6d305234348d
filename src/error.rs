// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the save endpoint and their JSON responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::store::RemoteError;
use crate::validator::ValidationError;

/// Everything that can end a save request without a commit.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Server misconfigured: {0}")]
    Misconfigured(&'static str),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Write conflict persisted after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Remote API error {status}: {message}")]
    RemoteApi { status: u16, message: String },
}

impl From<RemoteError> for PublishError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Conflict => Self::Conflict { attempts: 1 },
            RemoteError::Api { status, message } => Self::RemoteApi { status, message },
            RemoteError::Transport(message) => Self::RemoteApi {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message,
            },
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    fn new(error: &'static str) -> Self {
        Self {
            error,
            message: None,
            details: None,
        }
    }
}

impl PublishError {
    /// HTTP status for this error. Remote statuses pass through when they
    /// are error statuses; anything else becomes 502.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(ValidationError::PasswordUnconfigured) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Validation(ValidationError::Unauthorized) => StatusCode::UNAUTHORIZED,
            Self::Validation(ValidationError::NoContent | ValidationError::InvalidJson)
            | Self::BodyRead(_) => StatusCode::BAD_REQUEST,
            Self::Validation(ValidationError::TooLarge { .. }) | Self::BodyTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::RemoteApi { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            Self::Misconfigured(_) | Self::Validation(ValidationError::PasswordUnconfigured) => {
                ErrorResponse::new("Server misconfigured")
            }
            Self::RateLimited { .. } => ErrorResponse::new("Rate limit exceeded"),
            Self::Validation(ValidationError::Unauthorized) => ErrorResponse::new("Unauthorized"),
            Self::Validation(ValidationError::NoContent) => {
                ErrorResponse::new("No content provided")
            }
            Self::Validation(ValidationError::InvalidJson) => {
                ErrorResponse::new("Invalid JSON body")
            }
            Self::BodyRead(_) => ErrorResponse::new("Could not read request body"),
            Self::Validation(err @ ValidationError::TooLarge { .. }) => ErrorResponse {
                message: Some(err.to_string()),
                ..ErrorResponse::new("Content too large")
            },
            Self::BodyTooLarge { .. } => ErrorResponse {
                message: Some(self.to_string()),
                ..ErrorResponse::new("Content too large")
            },
            Self::Conflict { .. } => ErrorResponse::new("Conflict - please retry"),
            Self::RemoteApi { message, .. } => ErrorResponse {
                details: Some(message.clone()),
                ..ErrorResponse::new("GitHub API error")
            },
        }
    }
}

impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(self.body());

        match self {
            Self::RateLimited { retry_after } => {
                // Round up so clients never retry inside the same window
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                (status, [(header::RETRY_AFTER, secs.max(1).to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
