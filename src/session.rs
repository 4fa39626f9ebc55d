//! Per-visit session context.
//!
//! A [`SessionContext`] is created once per visit and injected into every
//! service that needs a session id or venture id. It is never persisted.

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::clock::Clock;

/// Length of the random suffix in generated session ids.
const SESSION_SUFFIX_LEN: usize = 9;

/// Identity of one visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session_id: String,
    venture: String,
    started_at_ms: u64,
    referrer: Option<String>,
}

impl SessionContext {
    /// Starts a new session for `venture`, generating a fresh session id.
    #[must_use]
    pub fn start(venture: impl Into<String>, clock: &dyn Clock) -> Self {
        let started_at_ms = clock.now_ms();
        Self {
            session_id: generate_session_id(started_at_ms),
            venture: venture.into(),
            started_at_ms,
            referrer: None,
        }
    }

    /// Builds a session with a caller-supplied id. Used by tests and replays.
    #[must_use]
    pub fn with_id(
        session_id: impl Into<String>,
        venture: impl Into<String>,
        started_at_ms: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            venture: venture.into(),
            started_at_ms,
            referrer: None,
        }
    }

    /// Attaches the referrer the visit arrived from.
    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        let referrer = referrer.into();
        self.referrer = if referrer.is_empty() {
            None
        } else {
            Some(referrer)
        };
        self
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn venture(&self) -> &str {
        &self.venture
    }

    #[must_use]
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    #[must_use]
    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }
}

fn generate_session_id(now_ms: u64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("sess_{now_ms}_{suffix}")
}
