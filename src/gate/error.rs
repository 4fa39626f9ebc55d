//! Gating failures and the advisories shown for them.

use thiserror::Error;

/// A precondition that stopped a download attempt before it started.
///
/// These are the only errors the end user ever sees; each maps to an
/// [`Advisory`] through [`GateError::advisory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Bot score at or above threshold, or a tripped honeypot field.
    #[error("security block: {reason} (bot score {score})")]
    SecurityBlock {
        /// Signal key that triggered the block.
        reason: String,
        /// Session bot score at the time of the block.
        score: u8,
    },

    /// The rate-limit window is at capacity.
    #[error("rate limit exceeded: {count}/{max} attempts in current window")]
    RateLimitExceeded {
        /// Attempts recorded in the current window.
        count: u32,
        /// Maximum attempts per window.
        max: u32,
        /// Milliseconds until the window resets.
        retry_after_ms: u64,
    },

    /// A required client capability is missing.
    #[error("environment unsupported: missing {capability}")]
    EnvironmentUnsupported {
        /// Name of the first missing capability.
        capability: &'static str,
    },
}

impl GateError {
    /// Creates a security block error.
    pub fn security_block(reason: impl Into<String>, score: u8) -> Self {
        Self::SecurityBlock {
            reason: reason.into(),
            score,
        }
    }

    /// Returns the user-visible advisory for this failure.
    #[must_use]
    pub fn advisory(&self) -> Advisory {
        match self {
            Self::SecurityBlock { .. } => Advisory::SecurityBlock,
            Self::RateLimitExceeded { retry_after_ms, .. } => Advisory::RateLimited {
                retry_after_secs: retry_after_ms.div_ceil(1000),
            },
            Self::EnvironmentUnsupported { .. } => Advisory::Unsupported,
        }
    }
}

/// Message surfaced to the visitor instead of starting a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// Automated access suspected.
    SecurityBlock,
    /// Too many attempts; try again later.
    RateLimited {
        /// Whole seconds until the window resets.
        retry_after_secs: u64,
    },
    /// The client is missing something the download flow needs.
    Unsupported,
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecurityBlock => write!(
                f,
                "Download blocked for security reasons. Please contact support if you believe this is an error."
            ),
            Self::RateLimited { retry_after_secs } => write!(
                f,
                "Too many download attempts. Please wait {retry_after_secs}s before trying again."
            ),
            Self::Unsupported => write!(
                f,
                "Your browser does not support this download. Please update to a modern browser."
            ),
        }
    }
}
