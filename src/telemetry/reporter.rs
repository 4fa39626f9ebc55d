//! Security event reporting for blocked attempts.
//!
//! The visitor only sees an advisory when a security gate fires. This keeps
//! the block observable by routing a [`EventKind::SecurityEvent`] through the
//! regular dispatcher.

use serde_json::Value;
use tracing::info;

use super::dispatcher::TelemetryDispatcher;
use super::event::{EventKind, TelemetryEvent};
use crate::gate::BotScore;
use crate::session::SessionContext;

/// Emits security events through a shared [`TelemetryDispatcher`].
#[derive(Debug, Clone)]
pub struct SecurityEventReporter {
    dispatcher: TelemetryDispatcher,
}

impl SecurityEventReporter {
    #[must_use]
    pub fn new(dispatcher: TelemetryDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Reports a blocked attempt.
    ///
    /// `trigger` is the key of the signal that caused the block and `source`
    /// the tag of the control that was activated.
    pub fn report_block(
        &self,
        session: &SessionContext,
        score: &BotScore,
        trigger: &str,
        source: &str,
        now_ms: u64,
    ) {
        info!(
            session_id = session.session_id(),
            bot_score = score.value(),
            trigger,
            source,
            "download attempt blocked"
        );
        let signals: Vec<Value> = score
            .active_keys()
            .into_iter()
            .map(Value::from)
            .collect();
        let event = TelemetryEvent::new(EventKind::SecurityEvent, session, now_ms)
            .with("reason", trigger)
            .with("botScore", score.value())
            .with("signals", signals)
            .with("source", source)
            .with("userVisible", "advisory");
        self.dispatcher.emit(event);
    }
}
