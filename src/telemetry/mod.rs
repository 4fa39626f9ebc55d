//! Lifecycle telemetry with multi-sink fan-out.
//!
//! # Architecture
//!
//! - [`TelemetryEvent`] - one lifecycle fact in its wire shape
//! - [`TelemetrySink`] - async trait implemented by each delivery target
//! - [`SinkSet`] - primary, fallback and mirror sinks with the delivery policy
//! - [`TelemetryDispatcher`] - queue plus worker task feeding a [`SinkSet`]
//! - [`SecurityEventReporter`] - security events for blocked attempts
//!
//! Telemetry failures are absorbed at the dispatcher boundary. Losing an
//! event never affects the download flow.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use download_gate::session::SessionContext;
//! use download_gate::telemetry::{
//!     BeaconSink, EndpointSink, EventKind, SinkSet, TelemetryDispatcher, TelemetryEvent,
//! };
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("https://example.com/api/analytics")?;
//! let sinks = SinkSet::new()
//!     .with_primary(Arc::new(EndpointSink::new("analytics", url.clone())?))
//!     .with_fallback(Arc::new(BeaconSink::new(url)?));
//! let dispatcher = TelemetryDispatcher::spawn(sinks);
//!
//! let session = SessionContext::with_id("sess_1", "acme", 0);
//! dispatcher.emit(TelemetryEvent::new(EventKind::PageView, &session, 0));
//! dispatcher.flush().await;
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod error;
mod event;
mod reporter;
mod sink;

pub use dispatcher::{DeliveryReport, DeliveryStatus, DispatchStats, SinkSet, TelemetryDispatcher};
pub use error::TelemetryError;
pub use event::{EventKind, TelemetryEvent};
pub use reporter::SecurityEventReporter;
pub use sink::{BeaconSink, EndpointSink, Hook, HookSink, TelemetrySink};
