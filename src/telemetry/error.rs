//! Error types for telemetry delivery.
//!
//! A [`TelemetryError`] never leaves the dispatcher: it is logged and
//! recorded in the [`super::DeliveryReport`] for the event.

use thiserror::Error;

/// Failure delivering an event to one sink.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("{sink}: transport error: {source}")]
    Transport {
        /// Sink name.
        sink: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The collector answered with a non-success status.
    #[error("{sink}: collector returned HTTP {status}")]
    Status {
        /// Sink name.
        sink: String,
        /// HTTP status code.
        status: u16,
    },

    /// The sink refused the event.
    #[error("{sink}: rejected: {reason}")]
    Rejected {
        /// Sink name.
        sink: String,
        /// Sink-provided reason.
        reason: String,
    },

    /// The sink panicked while handling the event.
    #[error("{sink}: panicked during delivery")]
    Panicked {
        /// Sink name.
        sink: String,
    },

    /// The sink could not be constructed.
    #[error("{sink}: invalid configuration: {reason}")]
    Config {
        /// Sink name.
        sink: String,
        /// What was wrong.
        reason: String,
    },
}

impl TelemetryError {
    /// Creates a transport error.
    pub fn transport(sink: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            sink: sink.into(),
            source,
        }
    }

    /// Creates a status error.
    pub fn status(sink: impl Into<String>, status: u16) -> Self {
        Self::Status {
            sink: sink.into(),
            status,
        }
    }

    /// Creates a rejection error.
    pub fn rejected(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            sink: sink.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let msg = TelemetryError::status("analytics", 503).to_string();
        assert!(msg.contains("analytics"), "missing sink in: {msg}");
        assert!(msg.contains("503"), "missing status in: {msg}");
    }

    #[test]
    fn test_rejected_error_display() {
        let msg = TelemetryError::rejected("mirror", "quota").to_string();
        assert_eq!(msg, "mirror: rejected: quota");
    }
}
