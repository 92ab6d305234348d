// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Save request validator.
//!
//! Implements the checks that run before anything touches the remote store:
//! - Save password presence and equality
//! - Content extraction from a JSON payload or a raw text body
//! - Content size limit (UTF-8 byte length)

use crate::config::Secret;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Header carrying the save password.
pub const PASSWORD_HEADER: &str = "x-password";

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Save password is not configured")]
    PasswordUnconfigured,

    #[error("Missing or incorrect save password")]
    Unauthorized,

    #[error("No content provided")]
    NoContent,

    #[error("Request body is not valid JSON")]
    InvalidJson,

    #[error("Content is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
}

/// Save request validator.
pub struct PublishValidator {
    save_password: Option<Secret>,
    max_content_size: usize,
}

impl PublishValidator {
    /// Create a new validator.
    pub fn new(save_password: Option<Secret>, max_content_size: usize) -> Self {
        Self {
            save_password,
            max_content_size,
        }
    }

    /// Check the password supplied with a save request.
    pub fn authorize(&self, supplied: Option<&str>) -> Result<(), ValidationError> {
        let expected = self
            .save_password
            .as_ref()
            .ok_or(ValidationError::PasswordUnconfigured)?;

        match supplied {
            Some(candidate) if !candidate.is_empty() && expected.matches(candidate) => Ok(()),
            Some(_) => {
                debug!("Save password mismatch");
                Err(ValidationError::Unauthorized)
            }
            None => {
                debug!("Save password header missing");
                Err(ValidationError::Unauthorized)
            }
        }
    }

    /// Pull the wiki content out of a request body.
    ///
    /// JSON bodies (any `Content-Type` mentioning `application/json`) carry
    /// the content in `content`, falling back to `wiki`. Falsy values (null,
    /// `false`, zero and the empty string) count as absent. Any other
    /// non-string value is stored as its JSON text.
    /// Any other body is taken verbatim as text.
    pub fn extract_content(
        &self,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<String, ValidationError> {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);

        let content = if is_json {
            let payload: Value =
                serde_json::from_slice(body).map_err(|_| ValidationError::InvalidJson)?;
            payload_field(&payload, "content")
                .or_else(|| payload_field(&payload, "wiki"))
                .unwrap_or_default()
        } else {
            String::from_utf8_lossy(body).into_owned()
        };

        if content.is_empty() {
            debug!(is_json, "Save request carried no content");
            return Err(ValidationError::NoContent);
        }

        Ok(content)
    }

    /// Enforce the content size limit. `size == max` is accepted.
    pub fn check_size(&self, content: &str) -> Result<(), ValidationError> {
        let size = content.len();
        if size > self.max_content_size {
            debug!(size, max = self.max_content_size, "Content too large");
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_content_size,
            });
        }
        Ok(())
    }
}

fn payload_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
