//! Vote-attempt throttling.
//!
//! A process-local fixed-window limiter keyed by identity token. It guards
//! the vote path against hammering; double votes are already rejected by the
//! ledger document, so this state is advisory, lives in memory only, and is
//! lost on restart. Each process instance enforces its own windows.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::Clock;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum vote attempts per identity within one window
    pub capacity: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            window_ms: 60 * 60 * 1000, // 1 hour
        }
    }
}

/// Attempt counter for one identity's current window
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at_ms: u64,
}

/// Fixed-window rate limiter keyed by identity token
pub struct RateLimiter {
    windows: RwLock<HashMap<String, Window>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Record one attempt for the identity.
    ///
    /// Returns `true` and counts the attempt while the window has capacity
    /// left; returns `false` without counting once it is spent. A window
    /// older than the configured length is discarded first.
    pub async fn allow(&self, identity: &str) -> bool {
        let now = self.clock.now_ms();
        let mut windows = self.windows.write().await;
        let window = windows.entry(identity.to_string()).or_insert_with(|| Window {
            count: 0,
            started_at_ms: now,
        });

        if now.saturating_sub(window.started_at_ms) > self.config.window_ms {
            *window = Window {
                count: 0,
                started_at_ms: now,
            };
        }

        if window.count >= self.config.capacity {
            debug!("rate limit exceeded for identity {}", identity);
            return false;
        }

        window.count += 1;
        true
    }
}
