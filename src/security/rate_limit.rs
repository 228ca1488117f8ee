//! Rate Limiting Module
//!
//! Sliding-window request counter keyed by client identity. Identities that
//! exhaust their window are promoted to the block list for the rest of the
//! process lifetime.
//!
//! Neither the windows nor the block list are persisted: a restart resets
//! every counter and every block. The window map is never evicted, so it
//! grows with the number of distinct identities seen.

use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::security::clock::Clock;
use crate::security::config::SecuritySettings;
use crate::security::identity::ClientIdentity;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests admitted inside one window
    pub max_requests: u32,
    /// Window size in seconds for sliding window
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 3600,
        }
    }
}

impl RateLimitConfig {
    fn window(&self) -> Duration {
        Duration::seconds(self.window_seconds as i64)
    }
}

/// Identities denied for the lifetime of the process.
#[derive(Debug, Default)]
pub struct BlockList {
    blocked: DashSet<ClientIdentity>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self, identity: &ClientIdentity) -> bool {
        self.blocked.contains(identity)
    }

    /// Add an identity. Returns false if it was already blocked.
    pub fn block(&self, identity: &ClientIdentity, reason: &str) -> bool {
        let inserted = self.blocked.insert(identity.clone());
        if inserted {
            tracing::warn!(target: "security", ip = %identity, reason, "IP blocked");
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

/// Rate limit result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Requests still available in the current window
        remaining: u32,
    },
    /// Request is rate limited
    Limited {
        /// Seconds until the oldest entry leaves the window
        retry_after: u64,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// In-memory rate limiter using sliding window
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Rate limit configuration
    config: RateLimitConfig,
    /// Request history (identity -> timestamps, oldest first)
    windows: Arc<DashMap<ClientIdentity, VecDeque<DateTime<Utc>>>>,
    /// Shared block list, promoted into on exhaustion
    block_list: Arc<BlockList>,
    clock: Arc<dyn Clock>,
    /// Whether rate limiting is enabled
    enabled: bool,
}

impl RateLimiter {
    /// Create new rate limiter
    pub fn new(
        config: RateLimitConfig,
        block_list: Arc<BlockList>,
        clock: Arc<dyn Clock>,
        enabled: bool,
    ) -> Self {
        Self {
            config,
            windows: Arc::new(DashMap::new()),
            block_list,
            clock,
            enabled,
        }
    }

    /// Create from security settings
    pub fn from_settings(
        settings: &SecuritySettings,
        block_list: Arc<BlockList>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = RateLimitConfig {
            max_requests: settings.rate_limit_requests,
            window_seconds: settings.rate_limit_window_seconds,
        };
        Self::new(config, block_list, clock, settings.rate_limit_enabled)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check rate limit for a client and record the request when admitted.
    ///
    /// The purge, count and append happen while holding the entry for this
    /// identity, so concurrent requests from one identity cannot both observe
    /// room in the window. Other identities only contend on the same map shard.
    pub fn check(&self, identity: &ClientIdentity) -> RateLimitResult {
        if !self.enabled {
            return RateLimitResult::Allowed {
                remaining: self.config.max_requests,
            };
        }

        let now = self.clock.now();
        let window = self.config.window();
        let limit = self.config.max_requests as usize;

        let mut history = self.windows.entry(identity.clone()).or_default();

        while let Some(oldest) = history.front() {
            if now - *oldest >= window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() >= limit {
            let retry_after = history
                .front()
                .map(|oldest| (*oldest + window - now).num_seconds().max(1) as u64)
                .unwrap_or(self.config.window_seconds);
            drop(history);

            self.block_list.block(identity, "Rate limit exceeded");
            return RateLimitResult::Limited { retry_after };
        }

        history.push_back(now);
        RateLimitResult::Allowed {
            remaining: (limit - history.len()) as u32,
        }
    }

    /// Boolean form of [`RateLimiter::check`]
    pub fn allow(&self, identity: &ClientIdentity) -> bool {
        self.check(identity).is_allowed()
    }

    /// Requests currently counted for an identity (stale entries included
    /// until the next check purges them)
    pub fn recorded(&self, identity: &ClientIdentity) -> usize {
        self.windows.get(identity).map(|h| h.len()).unwrap_or(0)
    }

    /// Number of identities with a window entry
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }
}
