//! Preconditions a download attempt must pass before it starts.
//!
//! # Gates
//!
//! Evaluated in this order; the first failure ends the attempt:
//!
//! 1. [`EnvironmentSnapshot::ensure_supported`] - once, before any attempt
//! 2. [`honeypot::is_tripped`] - hidden form field
//! 3. [`BotHeuristicScorer`] - session score at or above [`BOT_BLOCK_THRESHOLD`]
//! 4. [`RateLimiter`] - fixed-window attempt counter
//!
//! Gates 2 and 3 raise [`GateError::SecurityBlock`] and never touch the rate
//! limit window.

pub mod bot_score;
pub mod environment;
mod error;
pub mod honeypot;
pub mod rate_limiter;

pub use bot_score::{
    BOT_BLOCK_THRESHOLD, BotHeuristicScorer, BotScore, BotSignal, MAX_BOT_SCORE, SignalAccumulator,
};
pub use environment::{Capabilities, EnvironmentSnapshot};
pub use error::{Advisory, GateError};
pub use rate_limiter::{RATE_LIMIT_KEY, RateLimitWindow, RateLimiter};
