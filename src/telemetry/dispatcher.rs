//! Fan-out dispatch of telemetry events with per-sink failure isolation.
//!
//! # Delivery policy
//!
//! For each event, in this order:
//!
//! 1. The primary sink is attempted.
//! 2. The fallback sink is attempted only if the primary failed (or none is
//!    configured).
//! 3. Every enabled mirror is attempted, regardless of steps 1 and 2.
//!
//! Each attempt is isolated: errors and panics are caught, logged, and
//! recorded in a [`DeliveryReport`]. Nothing is retried and nothing is
//! propagated to the caller of [`TelemetryDispatcher::emit`].
//!
//! # Queueing
//!
//! `emit` pushes onto an unbounded queue drained by a single worker task, so
//! events leave in the order they were emitted. No ordering is promised
//! across sinks and no delivery is guaranteed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use super::error::TelemetryError;
use super::event::{EventKind, TelemetryEvent};
use super::sink::TelemetrySink;

/// Outcome of one sink attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The sink accepted the event.
    Delivered,
    /// The sink failed; the message is the logged error.
    Failed(String),
    /// The sink was not invoked.
    Skipped,
}

/// Per-sink outcomes for one event.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    kind: EventKind,
    outcomes: Vec<(String, DeliveryStatus)>,
    delivered: bool,
}

impl DeliveryReport {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            outcomes: Vec::new(),
            delivered: false,
        }
    }

    /// Kind of the reported event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether the primary or fallback path accepted the event.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Outcome for the named sink, if it was considered.
    #[must_use]
    pub fn outcome(&self, sink: &str) -> Option<&DeliveryStatus> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == sink)
            .map(|(_, status)| status)
    }

    /// All outcomes in attempt order.
    #[must_use]
    pub fn outcomes(&self) -> &[(String, DeliveryStatus)] {
        &self.outcomes
    }

    fn push(&mut self, sink: &str, status: DeliveryStatus) {
        self.outcomes.push((sink.to_string(), status));
    }
}

/// The configured sinks.
#[derive(Debug, Default, Clone)]
pub struct SinkSet {
    primary: Option<Arc<dyn TelemetrySink>>,
    fallback: Option<Arc<dyn TelemetrySink>>,
    mirrors: Vec<Arc<dyn TelemetrySink>>,
}

impl SinkSet {
    /// Creates an empty set. Events sent to an empty set are dropped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_primary(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.primary = Some(sink);
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.fallback = Some(sink);
        self
    }

    #[must_use]
    pub fn with_mirror(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.mirrors.push(sink);
        self
    }

    /// Delivers one event according to the module-level policy.
    #[instrument(level = "debug", skip_all, fields(event = %event.kind()))]
    pub async fn deliver(&self, event: &TelemetryEvent) -> DeliveryReport {
        let mut report = DeliveryReport::new(event.kind());

        let primary_ok = match &self.primary {
            Some(primary) => attempt(primary.as_ref(), event, &mut report).await,
            None => false,
        };
        report.delivered = primary_ok;

        if let Some(fallback) = &self.fallback {
            if primary_ok {
                report.push(fallback.name(), DeliveryStatus::Skipped);
            } else {
                report.delivered = attempt(fallback.as_ref(), event, &mut report).await;
            }
        }

        for mirror in &self.mirrors {
            if mirror.is_enabled() {
                attempt(mirror.as_ref(), event, &mut report).await;
            } else {
                report.push(mirror.name(), DeliveryStatus::Skipped);
            }
        }

        if !report.delivered {
            debug!("event not accepted by primary or fallback path");
        }
        report
    }
}

async fn attempt(
    sink: &dyn TelemetrySink,
    event: &TelemetryEvent,
    report: &mut DeliveryReport,
) -> bool {
    let result = match AssertUnwindSafe(sink.send(event)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(TelemetryError::Panicked {
            sink: sink.name().to_string(),
        }),
    };

    match result {
        Ok(()) => {
            report.push(sink.name(), DeliveryStatus::Delivered);
            true
        }
        Err(error) => {
            warn!(sink = sink.name(), event = %event.kind(), error = %error, "telemetry delivery failed");
            report.push(sink.name(), DeliveryStatus::Failed(error.to_string()));
            false
        }
    }
}

/// Counters maintained by the dispatcher worker.
#[derive(Debug, Default)]
pub struct DispatchStats {
    emitted: AtomicUsize,
    delivered: AtomicUsize,
    undelivered: AtomicUsize,
}

impl DispatchStats {
    /// Events accepted by `emit`.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    /// Events accepted by the primary or fallback path.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Events dropped because both primary and fallback failed.
    #[must_use]
    pub fn undelivered(&self) -> usize {
        self.undelivered.load(Ordering::SeqCst)
    }
}

enum Command {
    Event(Box<TelemetryEvent>),
    Flush(oneshot::Sender<()>),
}

/// Queue-backed telemetry dispatcher.
///
/// Cheap to share behind an `Arc`; every clone of the handle feeds the same
/// worker.
#[derive(Debug, Clone)]
pub struct TelemetryDispatcher {
    queue: mpsc::UnboundedSender<Command>,
    stats: Arc<DispatchStats>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(event) => write!(f, "Event({})", event.kind()),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl TelemetryDispatcher {
    /// Starts the worker task draining the queue into `sinks`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(sinks: SinkSet) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<Command>();
        let stats = Arc::new(DispatchStats::default());
        let worker_stats = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Event(event) => {
                        let report = sinks.deliver(&event).await;
                        let counter = if report.is_delivered() {
                            &worker_stats.delivered
                        } else {
                            &worker_stats.undelivered
                        };
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("telemetry worker stopped");
        });

        Self { queue, stats }
    }

    /// A dispatcher with no sinks. Events are accepted and dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn disabled() -> Self {
        Self::spawn(SinkSet::new())
    }

    /// Queues an event for delivery. Never blocks and never fails.
    pub fn emit(&self, event: TelemetryEvent) {
        let kind = event.kind();
        if self.queue.send(Command::Event(Box::new(event))).is_err() {
            debug!(event = %kind, "telemetry worker gone, dropping event");
            return;
        }
        self.stats.emitted.fetch_add(1, Ordering::SeqCst);
    }

    /// Waits until every event emitted before this call has been processed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.queue.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}
