//! Shared User-Agent strings for telemetry and download HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/nicksrandall/download-gate";

/// Default User-Agent for download and probe requests.
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("download-gate/{version} (+{PROJECT_UA_URL})")
}

/// Default User-Agent for telemetry requests.
#[must_use]
pub(crate) fn default_telemetry_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("download-gate/{version} telemetry (+{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_format_consistency() {
        for ua in [default_download_user_agent(), default_telemetry_user_agent()] {
            assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL: {ua}");
            assert_eq!(
                Some(env!("CARGO_PKG_VERSION")),
                ua.strip_prefix("download-gate/")
                    .and_then(|s| s.split(' ').next()),
                "UA must contain crate version: {ua}"
            );
        }
    }

    #[test]
    fn test_telemetry_ua_is_distinguishable() {
        assert_ne!(default_download_user_agent(), default_telemetry_user_agent());
        assert!(default_telemetry_user_agent().contains("telemetry"));
    }
}
