// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter for the save endpoint.
//!
//! Each client identifier gets a counter and a window start. A request
//! arriving more than one window after the start opens a new window with a
//! count of one; otherwise the count is incremented. A request is admitted
//! while the count stays at or below the configured maximum.
//!
//! Bursts straddling a window boundary can see up to twice the maximum.
//! That is accepted; this is not a sliding window.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in current window
        remaining: u32,
        /// Time until window resets
        reset_in: Duration,
    },
    /// Request is rate limited
    Limited {
        /// Time until the current window ends
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Record one request and return the resulting count.
    fn hit(&mut self, now: Instant, window: Duration) -> u32 {
        if now.saturating_duration_since(self.window_start) > window {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count = self.count.saturating_add(1);
        }
        self.count
    }

    fn reset_in(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}

/// Thread-safe rate limiter.
pub struct RateLimiter {
    /// Configuration
    config: RateLimitConfig,
    /// Per-client windows
    windows: Arc<RwLock<HashMap<String, WindowCounter>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check and count a request from `client`.
    pub async fn check(&self, client: &str) -> RateLimitResult {
        self.check_at(client, Instant::now()).await
    }

    /// Like [`check`](Self::check) with an explicit clock reading.
    pub async fn check_at(&self, client: &str, now: Instant) -> RateLimitResult {
        let window = self.config.window_duration();
        let max = self.config.max_requests;

        // Increment and check under one write lock so concurrent requests
        // from the same client never lose an update.
        let mut windows = self.windows.write().await;
        let counter = windows
            .entry(client.to_string())
            .or_insert_with(|| WindowCounter::new(now));

        let count = counter.hit(now, window);
        let reset_in = counter.reset_in(now, window);

        if count <= max {
            RateLimitResult::Allowed {
                remaining: max - count,
                reset_in,
            }
        } else {
            debug!(client, count, ?reset_in, "Client rate limit exceeded");
            RateLimitResult::Limited {
                retry_after: reset_in,
            }
        }
    }

    /// Number of clients currently tracked.
    pub async fn tracked_clients(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Clean up expired entries (should be called periodically).
    pub async fn cleanup(&self) {
        self.cleanup_at(Instant::now()).await;
    }

    /// Drop records whose window ended more than one full window ago.
    /// Such a record would be reset on its next hit anyway.
    pub async fn cleanup_at(&self, now: Instant) {
        let stale_after = self.config.window_duration().saturating_mul(2);

        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, counter| {
            now.saturating_duration_since(counter.window_start) <= stale_after
        });
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, remaining = windows.len(), "Evicted stale rate limit records");
        }
    }
}
