// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Wiki Saver
//!
//! A password-gated save endpoint that lets a single-file wiki commit itself
//! to a GitHub repository:
//!
//! - Auth gate that trades a shared password for an access token
//! - Per-client fixed-window rate limiting (30 requests per minute default)
//! - Save password, content and size validation
//! - Chunked base64 encoding of the wiki
//! - Optimistic-concurrency commits with bounded retry on conflicts

pub mod config;
pub mod cors;
pub mod encoding;
pub mod error;
pub mod gate;
pub mod github;
pub mod handlers;
pub mod limiter;
pub mod publisher;
pub mod store;
pub mod validator;

pub use config::Config;
pub use error::PublishError;
pub use limiter::{RateLimitResult, RateLimiter};
pub use publisher::Publisher;
pub use store::{ContentStore, RemoteError, RepoTarget, RevisionMarker};
