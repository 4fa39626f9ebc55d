//! Runtime configuration of a gatekeeper.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::download::{ERROR_REVERT_DELAY, RevertDelays, SUCCESS_REVERT_DELAY, VERIFY_TIMEOUT};
use crate::gate::rate_limiter::{DEFAULT_MAX_PER_WINDOW, DEFAULT_WINDOW_MS};

/// Site-relative path of the first-party analytics endpoint.
pub const DEFAULT_ANALYTICS_PATH: &str = "/api/analytics";

/// Version label sent with downloads when none is configured.
pub const DEFAULT_VERSION: &str = "latest";

/// Everything a [`DownloadGatekeeper`](crate::download::DownloadGatekeeper)
/// needs to know about the site it guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Venture (brand) identifier carried by every event and token.
    pub venture: String,
    /// Site base URL; analytics and metadata paths are resolved against it.
    pub site_url: Url,
    /// Download target. Token parameters are appended per attempt.
    pub download_url: Url,
    pub analytics_path: String,
    /// Third-party mirrors receiving a copy of every event.
    pub mirror_urls: Vec<Url>,
    pub version: String,
    /// Where admitted downloads are written. `None` only verifies.
    pub output_dir: Option<PathBuf>,
    pub max_per_window: u32,
    pub window_ms: u64,
    pub success_revert: Duration,
    pub error_revert: Duration,
    /// Upper bound on the verification probe before the attempt is failed.
    pub verify_timeout: Duration,
}

impl GateConfig {
    /// Creates a configuration with default gate policy and timings.
    #[must_use]
    pub fn new(venture: impl Into<String>, site_url: Url, download_url: Url) -> Self {
        Self {
            venture: venture.into(),
            site_url,
            download_url,
            analytics_path: DEFAULT_ANALYTICS_PATH.to_string(),
            mirror_urls: Vec::new(),
            version: DEFAULT_VERSION.to_string(),
            output_dir: None,
            max_per_window: DEFAULT_MAX_PER_WINDOW,
            window_ms: DEFAULT_WINDOW_MS,
            success_revert: SUCCESS_REVERT_DELAY,
            error_revert: ERROR_REVERT_DELAY,
            verify_timeout: VERIFY_TIMEOUT,
        }
    }

    /// Absolute URL of the analytics endpoint, if `analytics_path` resolves.
    #[must_use]
    pub fn analytics_url(&self) -> Option<Url> {
        self.site_url.join(&self.analytics_path).ok()
    }

    #[must_use]
    pub fn revert_delays(&self) -> RevertDelays {
        RevertDelays {
            success: self.success_revert,
            error: self.error_revert,
        }
    }
}
