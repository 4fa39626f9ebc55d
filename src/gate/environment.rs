//! Client environment snapshot.
//!
//! Captured once at load time. Feeds both the capability check that runs
//! before any attempt and the bot heuristics.

use serde::{Deserialize, Serialize};

use super::error::GateError;

/// Client capabilities the download flow relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Asynchronous network requests.
    pub fetch: bool,
    /// Structured cloning of values.
    pub structured_clone: bool,
    /// Cryptographically secure random source.
    pub secure_random: bool,
    /// Best-effort background send. Optional.
    pub beacon: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            fetch: true,
            structured_clone: true,
            secure_random: true,
            beacon: true,
        }
    }
}

/// Synchronously available signals describing the visiting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    /// Raw user-agent string.
    pub user_agent: String,
    /// Automation marker exposed by driven browsers.
    pub webdriver: bool,
    /// Number of installed plugins reported by the client.
    pub plugin_count: u32,
    /// Preferred languages reported by the client.
    pub languages: Vec<String>,
    /// Outer window width in pixels.
    pub outer_width: u32,
    /// Outer window height in pixels.
    pub outer_height: u32,
    /// Capability flags.
    pub capabilities: Capabilities,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            webdriver: false,
            plugin_count: 3,
            languages: vec!["en-US".to_string()],
            outer_width: 1280,
            outer_height: 800,
            capabilities: Capabilities::default(),
        }
    }
}

impl EnvironmentSnapshot {
    /// Snapshot of an ordinary interactive client with the given user agent.
    #[must_use]
    pub fn interactive(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Self::default()
        }
    }

    /// Checks that every required capability is present.
    ///
    /// Beacon support is optional: without it telemetry simply has no
    /// fallback transport.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::EnvironmentUnsupported`] naming the first missing
    /// required capability.
    pub fn ensure_supported(&self) -> Result<(), GateError> {
        let caps = &self.capabilities;
        let missing = [
            ("fetch", caps.fetch),
            ("structured_clone", caps.structured_clone),
            ("secure_random", caps.secure_random),
        ]
        .into_iter()
        .find_map(|(name, present)| (!present).then_some(name));

        match missing {
            Some(capability) => Err(GateError::EnvironmentUnsupported { capability }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_supported() {
        assert!(EnvironmentSnapshot::default().ensure_supported().is_ok());
    }

    #[test]
    fn test_missing_fetch_is_reported_first() {
        let mut env = EnvironmentSnapshot::default();
        env.capabilities.fetch = false;
        env.capabilities.secure_random = false;
        assert_eq!(
            env.ensure_supported(),
            Err(GateError::EnvironmentUnsupported { capability: "fetch" })
        );
    }

    #[test]
    fn test_missing_beacon_is_tolerated() {
        let mut env = EnvironmentSnapshot::default();
        env.capabilities.beacon = false;
        assert!(env.ensure_supported().is_ok());
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let env: EnvironmentSnapshot =
            serde_json::from_str(r#"{"userAgent":"curl/8.0","webdriver":true}"#)
                .unwrap_or_default();
        assert_eq!(env.user_agent, "curl/8.0");
        assert!(env.webdriver);
        assert_eq!(env.plugin_count, 3);
        assert!(env.capabilities.fetch);
    }
}
