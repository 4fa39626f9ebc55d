//! Fixed-window download rate limiting over durable client storage.
//!
//! One window is kept per client (not per venture) under
//! [`RATE_LIMIT_KEY`]. [`RateLimiter::check_limit`] first normalizes the
//! window, resetting it when more than the window duration has elapsed since
//! it started, then reports whether another attempt fits.
//! [`RateLimiter::record_attempt`] increments and persists.
//!
//! The policy is fixed-window, not sliding: a burst straddling a window
//! boundary can admit up to twice the nominal rate. The read-modify-write
//! is also not atomic across processes sharing one store, so concurrent
//! clients can race on the counter. Both are known limitations.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use download_gate::clock::ManualClock;
//! use download_gate::gate::RateLimiter;
//! use download_gate::storage::MemoryStore;
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), clock.clone());
//!
//! for _ in 0..3 {
//!     assert!(limiter.check_limit());
//!     limiter.record_attempt();
//! }
//! assert!(!limiter.check_limit());
//!
//! clock.advance(60_001);
//! assert!(limiter.check_limit());
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::storage::{KeyValueStore, load_json, save_json};

/// Storage key holding the persisted window.
pub const RATE_LIMIT_KEY: &str = "download_gate.rate_limit";

/// Default maximum attempts per window.
pub const DEFAULT_MAX_PER_WINDOW: u32 = 3;

/// Default window duration (60 seconds).
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Persisted attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitWindow {
    /// Attempts recorded since `window_start`.
    pub count: u32,
    /// Window start in epoch milliseconds.
    pub window_start: u64,
}

impl RateLimitWindow {
    fn fresh(now_ms: u64) -> Self {
        Self {
            count: 0,
            window_start: now_ms,
        }
    }
}

/// Client-wide fixed-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_per_window: u32,
    window_ms: u64,
}

impl RateLimiter {
    /// Creates a limiter with the default policy (3 attempts per 60 s).
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(store, clock, DEFAULT_MAX_PER_WINDOW, DEFAULT_WINDOW_MS)
    }

    /// Creates a limiter with an explicit policy.
    #[must_use]
    pub fn with_policy(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        max_per_window: u32,
        window_ms: u64,
    ) -> Self {
        Self {
            store,
            clock,
            max_per_window,
            window_ms,
        }
    }

    #[must_use]
    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    #[must_use]
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Normalizes the window and reports whether another attempt is allowed.
    ///
    /// Creates the window lazily on first use.
    #[instrument(skip(self))]
    pub fn check_limit(&self) -> bool {
        let now = self.clock.now_ms();
        let (mut window, existed) = match self.load() {
            Some(window) => (window, true),
            None => (RateLimitWindow::fresh(now), false),
        };

        let expired = now.saturating_sub(window.window_start) > self.window_ms;
        if expired {
            debug!(
                previous_count = window.count,
                previous_start = window.window_start,
                "rate limit window expired, resetting"
            );
            window = RateLimitWindow::fresh(now);
        }
        if expired || !existed {
            self.persist(&window);
        }

        let allowed = window.count < self.max_per_window;
        debug!(
            count = window.count,
            max = self.max_per_window,
            allowed,
            "rate limit checked"
        );
        allowed
    }

    /// Records one accepted attempt.
    #[instrument(skip(self))]
    pub fn record_attempt(&self) {
        let now = self.clock.now_ms();
        let mut window = self.load().unwrap_or_else(|| RateLimitWindow::fresh(now));
        window.count = window.count.saturating_add(1);
        self.persist(&window);
        debug!(count = window.count, "recorded download attempt");
    }

    /// Returns the stored window without normalizing it.
    #[must_use]
    pub fn snapshot(&self) -> Option<RateLimitWindow> {
        self.load()
    }

    /// Milliseconds until the current window resets (zero if already expired).
    #[must_use]
    pub fn retry_after_ms(&self) -> u64 {
        let now = self.clock.now_ms();
        self.load().map_or(0, |window| {
            let elapsed = now.saturating_sub(window.window_start);
            self.window_ms.saturating_sub(elapsed)
        })
    }

    /// Discards the persisted window.
    pub fn reset(&self) {
        if let Err(error) = self.store.delete(RATE_LIMIT_KEY) {
            warn!(error = %error, "failed to clear rate limit window");
        }
    }

    // Read failures fail open: an unreadable window is treated as absent.
    fn load(&self) -> Option<RateLimitWindow> {
        match load_json::<RateLimitWindow>(self.store.as_ref(), RATE_LIMIT_KEY) {
            Ok(window) => window,
            Err(error) => {
                warn!(error = %error, "unreadable rate limit window, starting fresh");
                None
            }
        }
    }

    fn persist(&self, window: &RateLimitWindow) {
        if let Err(error) = save_json(self.store.as_ref(), RATE_LIMIT_KEY, window) {
            warn!(error = %error, "failed to persist rate limit window");
        }
    }
}
