//! Lifecycle events and their wire shape.
//!
//! Every event serializes to a flat JSON object:
//!
//! ```text
//! {"event":"download_started","venture":"acme","sessionId":"sess_..","timestamp":1700000000000,"source":"primary_cta"}
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::session::SessionContext;

/// Keys owned by the envelope; payload fields may not shadow them.
const RESERVED_KEYS: [&str; 4] = ["event", "venture", "sessionId", "timestamp"];

/// Kind of lifecycle fact being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Page loaded and session started.
    PageView,
    /// Gates passed, token issued, download initiated.
    DownloadStarted,
    /// Existence probe succeeded.
    DownloadVerified,
    /// Probe failed or timed out.
    DownloadError,
    /// Attempt refused by the rate limiter.
    DownloadRateLimited,
    /// Attempt blocked by a security gate.
    SecurityEvent,
    /// Successful download attributed to the session.
    Conversion,
    /// Download metadata loaded for display.
    DownloadInfoLoaded,
}

impl EventKind {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::DownloadStarted => "download_started",
            Self::DownloadVerified => "download_verified",
            Self::DownloadError => "download_error",
            Self::DownloadRateLimited => "download_rate_limited",
            Self::SecurityEvent => "security_event",
            Self::Conversion => "conversion",
            Self::DownloadInfoLoaded => "download_info_loaded",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle fact. Fire-and-forget; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    event: EventKind,
    venture: String,
    session_id: String,
    timestamp: u64,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl TelemetryEvent {
    /// Creates an event for `session` at `timestamp_ms` with an empty payload.
    #[must_use]
    pub fn new(kind: EventKind, session: &SessionContext, timestamp_ms: u64) -> Self {
        Self {
            event: kind,
            venture: session.venture().to_string(),
            session_id: session.session_id().to_string(),
            timestamp: timestamp_ms,
            payload: Map::new(),
        }
    }

    /// Adds a payload field. Reserved envelope keys are ignored.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if RESERVED_KEYS.contains(&key) {
            debug!(key, "ignoring payload field that shadows envelope key");
            return self;
        }
        self.payload.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.event
    }

    #[must_use]
    pub fn venture(&self) -> &str {
        &self.venture
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns a payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}
