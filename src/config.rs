// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the wiki saver.
//!
//! Everything is read once from the environment at startup (optionally
//! seeded from a `.env` file by `main`) and is immutable afterwards.
//! Secrets are wrapped in [`Secret`] so they never reach a log line.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::store::RepoTarget;

/// Errors raised while building configuration or startup state.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid repository identifier {0:?}: expected owner/repo")]
    InvalidRepository(String),

    #[error("Invalid GitHub API URL {0:?}")]
    InvalidApiUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// A string that is never printed by `Debug` or `Display` and serializes
/// as `***`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the underlying value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Exact, case-sensitive comparison with no trimming.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// Configuration for the wiki saver service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Passwords and the token released by the auth gate
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Target repository and API client settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Publisher limits and retry policy
    #[serde(default)]
    pub publish: PublishConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Shared secrets. Any of them may be unset; handlers report that as a
/// server misconfiguration rather than a credential failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Password checked by the auth gate
    pub gate_password: Option<Secret>,
    /// Token handed out by the auth gate on success
    pub access_token: Option<Secret>,
    /// Password expected in the `X-Password` header on save
    pub save_password: Option<Secret>,
}

/// GitHub contents API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL (default: https://api.github.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Token used for the contents API
    #[serde(default)]
    pub token: Option<Secret>,

    /// `owner/repo`
    #[serde(default)]
    pub repository: Option<String>,

    /// File to commit to (default: index.html)
    #[serde(default = "default_file_path")]
    pub file_path: String,

    /// Branch to commit to (default: main)
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Publisher limits and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Maximum content size in bytes (default: 50 MB)
    #[serde(default = "default_max_content_size")]
    pub max_content_size: usize,

    /// Hard cap on the raw request body. Defaults to four times
    /// `max_content_size` to leave room for JSON escaping.
    #[serde(default)]
    pub max_body_size: Option<usize>,

    /// Attempts per phase (read, write) before giving up (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit in milliseconds; attempt `n` waits `n` units (default: 1000)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Re-read the revision marker before retrying a conflicted write
    #[serde(default = "default_true")]
    pub reread_on_conflict: bool,
}

/// Fixed-window rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in milliseconds (default: 60000)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum requests per window per client (default: 30)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// How often stale records are evicted, in seconds (default: 60)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_file_path() -> String {
    "index.html".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("wiki-saver/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_content_size() -> usize {
    52_428_800
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u32 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            credentials: CredentialConfig::default(),
            github: GitHubConfig::default(),
            publish: PublishConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            repository: None,
            file_path: default_file_path(),
            branch: default_branch(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_content_size: default_max_content_size(),
            max_body_size: None,
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            reread_on_conflict: default_true(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. `ACCESS_TOKEN` falls back to
    /// `GITHUB_TOKEN` when absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let secret = |key: &str| get(key).map(Secret::new);

        let github_token = secret("GITHUB_TOKEN");
        let defaults = Config::default();

        let config = Config {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            credentials: CredentialConfig {
                gate_password: secret("PAGE_PASSWORD"),
                access_token: secret("ACCESS_TOKEN").or_else(|| github_token.clone()),
                save_password: secret("SAVE_PASSWORD"),
            },
            github: GitHubConfig {
                api_url: get("GITHUB_API_URL").unwrap_or(defaults.github.api_url),
                token: github_token,
                repository: get("GITHUB_REPO"),
                file_path: get("FILE_PATH").unwrap_or(defaults.github.file_path),
                branch: get("GITHUB_BRANCH").unwrap_or(defaults.github.branch),
                timeout_secs: parse_or(
                &get,
                "GITHUB_TIMEOUT_SECS",
                defaults.github.timeout_secs,
            )?,
                user_agent: defaults.github.user_agent,
            },
            publish: PublishConfig {
                max_content_size: parse_or(
                    &get,
                    "MAX_CONTENT_SIZE",
                    defaults.publish.max_content_size,
                )?,
                max_body_size: get("MAX_BODY_SIZE")
                    .map(|v| parse_value("MAX_BODY_SIZE", v))
                    .transpose()?,
                max_attempts: parse_or(&get, "MAX_RETRIES", defaults.publish.max_attempts)?,
                retry_backoff_ms: parse_or(
                    &get,
                    "RETRY_BACKOFF_MS",
                    defaults.publish.retry_backoff_ms,
                )?,
                reread_on_conflict: parse_or(
                    &get,
                    "REREAD_ON_CONFLICT",
                    defaults.publish.reread_on_conflict,
                )?,
            },
            rate_limit: RateLimitConfig {
                window_ms: parse_or(&get, "RATE_LIMIT_WINDOW_MS", defaults.rate_limit.window_ms)?,
                max_requests: parse_or(&get, "RATE_LIMIT_MAX", defaults.rate_limit.max_requests)?,
                cleanup_interval_secs: defaults.rate_limit.cleanup_interval_secs,
            },
        };

        // Fail at startup rather than on the first save.
        config.github.target()?;

        Ok(config)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse_value(key, value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

impl GitHubConfig {
    /// The file the publisher commits to, or `None` when no repository is
    /// configured.
    pub fn target(&self) -> Result<Option<RepoTarget>, ConfigError> {
        self.repository
            .as_deref()
            .map(|repo| RepoTarget::parse(repo, &self.file_path, &self.branch))
            .transpose()
    }

    /// Get the request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PublishConfig {
    /// Effective cap on the raw request body.
    pub fn body_limit(&self) -> usize {
        self.max_body_size
            .unwrap_or_else(|| self.max_content_size.saturating_mul(4))
            .max(self.max_content_size)
    }

    /// Get the backoff unit
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl RateLimitConfig {
    /// Get the rate window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
