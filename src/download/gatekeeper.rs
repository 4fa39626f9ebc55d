//! The composed download flow.
//!
//! One [`DownloadGatekeeper`] serves one session. Every activation of a bound
//! control runs the same fixed sequence:
//!
//! 1. honeypot, bot score and rate limit gates (first failure ends the attempt)
//! 2. record the attempt and issue a token
//! 3. move the control group to `preparing` and emit `download_started`
//! 4. initiate the transfer, then verify the target under a timeout
//! 5. move to `success` or `error`, emit the outcome, record the conversion
//!
//! Gate failures never touch the control group; they come back as
//! [`GateError`] for the caller to show as an advisory.
//!
//! Admission (disabled check, gates, attempt record, token, `preparing`) is
//! serialized per gatekeeper. An activation arriving during admission waits
//! for it, then sees the group `preparing` and is ignored. Issuance is bounded
//! by [`TOKEN_ISSUE_TIMEOUT`], so a stalled issuer delays siblings by at most
//! that long.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::actions::{ActionBinding, ActionTable, Trigger};
use super::client::HttpClient;
use super::constants::TOKEN_ISSUE_TIMEOUT;
use super::error::DownloadError;
use super::info::{DownloadInfo, load_download_info};
use super::machine::{ControlBoard, DownloadState};
use super::request::DownloadRequest;
use super::transport::{DownloadTransport, HttpTransport};
use crate::attribution::{AttributionLog, ConversionRecord};
use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::gate::honeypot::{self, HONEYPOT_SIGNAL};
use crate::gate::{BotHeuristicScorer, BotScore, EnvironmentSnapshot, GateError, RateLimiter};
use crate::session::SessionContext;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::telemetry::{
    BeaconSink, EndpointSink, EventKind, SecurityEventReporter, SinkSet, TelemetryDispatcher,
    TelemetryEvent,
};
use crate::token::{DownloadToken, LocalTokenIssuer, TokenError, TokenIssuer};

/// One user activation of a control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub control: String,
    pub trigger: Trigger,
    /// Value of the hidden honeypot field submitted with the activation.
    pub honeypot: Option<String>,
}

impl Interaction {
    #[must_use]
    pub fn click(control: impl Into<String>) -> Self {
        Self {
            control: control.into(),
            trigger: Trigger::Click,
            honeypot: None,
        }
    }

    #[must_use]
    pub fn keyboard(control: impl Into<String>) -> Self {
        Self {
            trigger: Trigger::Keyboard,
            ..Self::click(control)
        }
    }

    #[must_use]
    pub fn with_honeypot(mut self, value: impl Into<String>) -> Self {
        self.honeypot = Some(value.into());
        self
    }
}

/// Why an activation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The control is not in the action table.
    UnknownControl,
    /// The control does not respond to this trigger.
    TriggerNotBound,
    /// The control group is `preparing`.
    Disabled,
}

/// Result of an admitted attempt.
#[derive(Debug)]
pub struct AttemptReport {
    /// Source tag of the activated control.
    pub source: String,
    /// Token issued for the attempt, if issuance succeeded.
    pub token: Option<DownloadToken>,
    /// Tokenized download URL, if one was built.
    pub url: Option<Url>,
    /// Terminal state reached.
    pub state: DownloadState,
    /// Cause of an `error` terminal state.
    pub error: Option<DownloadError>,
}

impl AttemptReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == DownloadState::Success
    }
}

/// Outcome of [`DownloadGatekeeper::activate`] when no gate failed.
#[derive(Debug)]
pub enum AttemptOutcome {
    Ignored(IgnoreReason),
    Completed(AttemptReport),
}

impl AttemptOutcome {
    /// The report of a completed attempt.
    #[must_use]
    pub fn report(&self) -> Option<&AttemptReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Ignored(_) => None,
        }
    }
}

/// Builder for [`DownloadGatekeeper`].
///
/// Anything not supplied gets its production default: system clock,
/// in-memory storage, local token issuer, HTTP transport, and telemetry to
/// the site's analytics endpoint.
#[derive(Debug)]
pub struct GatekeeperBuilder {
    config: GateConfig,
    session: SessionContext,
    environment: EnvironmentSnapshot,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn KeyValueStore>>,
    issuer: Option<Arc<dyn TokenIssuer>>,
    transport: Option<Arc<dyn DownloadTransport>>,
    telemetry: Option<TelemetryDispatcher>,
    table: Option<ActionTable>,
}

impl GatekeeperBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn DownloadTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryDispatcher) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    #[must_use]
    pub fn actions(mut self, table: ActionTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Checks the environment, scores the session and assembles the
    /// gatekeeper.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::EnvironmentUnsupported`] if a required capability
    /// is missing. No gate runs and no telemetry is sent in that case.
    #[instrument(skip(self), fields(venture = %self.config.venture))]
    pub fn build(self) -> Result<DownloadGatekeeper, GateError> {
        self.environment.ensure_supported()?;

        let bot_score = BotHeuristicScorer::new().score(&self.environment);
        debug!(
            bot_score = bot_score.value(),
            signals = ?bot_score.active_keys(),
            "session scored"
        );

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let limiter = RateLimiter::with_policy(
            Arc::clone(&store),
            Arc::clone(&clock),
            self.config.max_per_window,
            self.config.window_ms,
        );
        let issuer = self
            .issuer
            .unwrap_or_else(|| Arc::new(LocalTokenIssuer::new()) as Arc<dyn TokenIssuer>);
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(HttpTransport::new(
                HttpClient::new(),
                self.config.output_dir.clone(),
            )) as Arc<dyn DownloadTransport>
        });
        let telemetry = self.telemetry.unwrap_or_else(|| {
            TelemetryDispatcher::spawn(default_sinks(&self.config, &self.environment))
        });
        let board = ControlBoard::new(
            self.table.unwrap_or_else(ActionTable::download_defaults),
            self.config.revert_delays(),
        );

        Ok(DownloadGatekeeper {
            reporter: SecurityEventReporter::new(telemetry.clone()),
            attribution: AttributionLog::new(store),
            config: self.config,
            session: self.session,
            clock,
            bot_score,
            limiter,
            issuer,
            transport,
            telemetry,
            board,
            admission: Mutex::new(()),
        })
    }
}

/// First-party endpoint as primary, beacon as fallback when the client
/// supports it, and one endpoint mirror per configured mirror URL.
fn default_sinks(config: &GateConfig, environment: &EnvironmentSnapshot) -> SinkSet {
    let mut sinks = SinkSet::new();
    let Some(analytics) = config.analytics_url() else {
        warn!(path = %config.analytics_path, "analytics path does not resolve, telemetry disabled");
        return sinks;
    };

    match EndpointSink::new("analytics", analytics.clone()) {
        Ok(sink) => sinks = sinks.with_primary(Arc::new(sink)),
        Err(error) => warn!(error = %error, "analytics sink unavailable"),
    }
    if environment.capabilities.beacon {
        match BeaconSink::new(analytics) {
            Ok(sink) => sinks = sinks.with_fallback(Arc::new(sink)),
            Err(error) => warn!(error = %error, "beacon sink unavailable"),
        }
    }
    for url in &config.mirror_urls {
        let name = format!("mirror:{}", url.host_str().unwrap_or("unknown"));
        match EndpointSink::new(name, url.clone()) {
            Ok(sink) => sinks = sinks.with_mirror(Arc::new(sink)),
            Err(error) => warn!(error = %error, url = %url, "mirror sink unavailable"),
        }
    }
    sinks
}

/// Gates, starts and tracks downloads for one session.
#[derive(Debug)]
pub struct DownloadGatekeeper {
    config: GateConfig,
    session: SessionContext,
    clock: Arc<dyn Clock>,
    bot_score: BotScore,
    limiter: RateLimiter,
    issuer: Arc<dyn TokenIssuer>,
    transport: Arc<dyn DownloadTransport>,
    telemetry: TelemetryDispatcher,
    reporter: SecurityEventReporter,
    board: ControlBoard,
    attribution: AttributionLog,
    // Held from the disabled check until the group is `preparing`.
    admission: Mutex<()>,
}

impl DownloadGatekeeper {
    /// Starts building a gatekeeper for `session`.
    #[must_use]
    pub fn builder(
        config: GateConfig,
        session: SessionContext,
        environment: EnvironmentSnapshot,
    ) -> GatekeeperBuilder {
        GatekeeperBuilder {
            config,
            session,
            environment,
            clock: None,
            store: None,
            issuer: None,
            transport: None,
            telemetry: None,
            table: None,
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Session bot score, computed once at construction.
    #[must_use]
    pub fn bot_score(&self) -> &BotScore {
        &self.bot_score
    }

    #[must_use]
    pub fn board(&self) -> &ControlBoard {
        &self.board
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryDispatcher {
        &self.telemetry
    }

    #[must_use]
    pub fn attribution(&self) -> &AttributionLog {
        &self.attribution
    }

    fn event(&self, kind: EventKind) -> TelemetryEvent {
        TelemetryEvent::new(kind, &self.session, self.clock.now_ms())
    }

    /// Emits the `page_view` event opening the session.
    pub fn page_view(&self) {
        let mut event = self
            .event(EventKind::PageView)
            .with("botScore", self.bot_score.value())
            .with("version", self.config.version.as_str());
        if let Some(referrer) = self.session.referrer() {
            event = event.with("referrer", referrer);
        }
        self.telemetry.emit(event);
    }

    /// Loads display metadata and reports it with `download_info_loaded`.
    pub async fn load_download_info(&self, client: &HttpClient) -> Option<DownloadInfo> {
        let info = load_download_info(client, &self.config.site_url).await?;
        let mut event = self.event(EventKind::DownloadInfoLoaded);
        if let Some(version) = &info.version {
            event = event.with("version", version.as_str());
        }
        if let Some(size) = &info.size {
            event = event.with("size", size.as_str());
        }
        self.telemetry.emit(event);
        Some(info)
    }

    /// Runs one activation through the gates and, if admitted, to a terminal
    /// state.
    ///
    /// Resolves once the terminal state is reached; the revert to `idle` runs
    /// afterwards on its own timer.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::SecurityBlock`] for a tripped honeypot or a
    /// blocking bot score, and [`GateError::RateLimitExceeded`] when the
    /// window is full. The control group stays untouched in both cases.
    #[instrument(skip(self, interaction), fields(control = %interaction.control))]
    pub async fn activate(&self, interaction: &Interaction) -> Result<AttemptOutcome, GateError> {
        let Some(binding) = self.board.table().resolve(&interaction.control).cloned() else {
            debug!("activation on unbound control ignored");
            return Ok(AttemptOutcome::Ignored(IgnoreReason::UnknownControl));
        };
        if !binding.accepts(interaction.trigger) {
            return Ok(AttemptOutcome::Ignored(IgnoreReason::TriggerNotBound));
        }

        let admitted = {
            let _admission = self.admission.lock().await;
            if self.board.state(&binding.action).is_disabled() {
                debug!("control disabled, activation ignored");
                return Ok(AttemptOutcome::Ignored(IgnoreReason::Disabled));
            }
            self.check_gates(&binding, interaction.honeypot.as_deref())?;
            self.limiter.record_attempt();

            let token = self.issue_token().await;
            let Some(generation) = self.board.begin(&binding.action) else {
                return Ok(AttemptOutcome::Ignored(IgnoreReason::Disabled));
            };
            (token, generation)
        };

        let (token, generation) = admitted;
        let token = match token {
            Ok(token) => token,
            Err(error) => {
                warn!(error = %error, "token issuance failed");
                let error = DownloadError::from(error);
                self.board.finish(&binding.action, generation, false);
                self.emit_error(&binding, &error);
                return Ok(AttemptOutcome::Completed(AttemptReport {
                    source: binding.source,
                    token: None,
                    url: None,
                    state: DownloadState::Error,
                    error: Some(error),
                }));
            }
        };

        let request = DownloadRequest::build(
            &self.config.download_url,
            &token,
            &self.config.venture,
            &self.config.version,
            binding.source.as_str(),
        );
        self.telemetry.emit(
            self.event(EventKind::DownloadStarted)
                .with("source", binding.source.as_str())
                .with("token", token.as_str())
                .with("version", self.config.version.as_str()),
        );
        self.transport.initiate(&request);

        let verdict = self.verify(&request).await;
        let succeeded = verdict.is_ok();
        self.board.finish(&binding.action, generation, succeeded);

        let error = match verdict {
            Ok(()) => {
                info!(source = %binding.source, "download verified");
                self.telemetry.emit(
                    self.event(EventKind::DownloadVerified)
                        .with("source", binding.source.as_str())
                        .with("version", self.config.version.as_str()),
                );
                self.record_conversion(&binding);
                None
            }
            Err(error) => {
                info!(source = %binding.source, error = %error, "download failed verification");
                self.emit_error(&binding, &error);
                Some(error)
            }
        };

        Ok(AttemptOutcome::Completed(AttemptReport {
            source: binding.source,
            token: Some(token),
            url: Some(request.url().clone()),
            state: if succeeded {
                DownloadState::Success
            } else {
                DownloadState::Error
            },
            error,
        }))
    }

    async fn issue_token(&self) -> Result<DownloadToken, TokenError> {
        let issue = self.issuer.issue(&self.session, self.clock.now_ms());
        match tokio::time::timeout(TOKEN_ISSUE_TIMEOUT, issue).await {
            Ok(result) => result,
            Err(_) => Err(TokenError::IssuerUnavailable {
                reason: format!("no token within {TOKEN_ISSUE_TIMEOUT:?}"),
            }),
        }
    }

    fn check_gates(&self, binding: &ActionBinding, honeypot: Option<&str>) -> Result<(), GateError> {
        if honeypot::is_tripped(honeypot) {
            self.report_block(HONEYPOT_SIGNAL, binding);
            return Err(GateError::security_block(HONEYPOT_SIGNAL, self.bot_score.value()));
        }

        if self.bot_score.is_blocking() {
            let trigger = self
                .bot_score
                .strongest_signal()
                .map_or("bot_score", |signal| signal.key);
            self.report_block(trigger, binding);
            return Err(GateError::security_block(trigger, self.bot_score.value()));
        }

        if !self.limiter.check_limit() {
            let count = self
                .limiter
                .snapshot()
                .map_or(self.limiter.max_per_window(), |window| window.count);
            let retry_after_ms = self.limiter.retry_after_ms();
            debug!(count, retry_after_ms, "attempt rate limited");
            self.telemetry.emit(
                self.event(EventKind::DownloadRateLimited)
                    .with("source", binding.source.as_str())
                    .with("count", count)
                    .with("retryAfterMs", retry_after_ms),
            );
            return Err(GateError::RateLimitExceeded {
                count,
                max: self.limiter.max_per_window(),
                retry_after_ms,
            });
        }
        Ok(())
    }

    fn report_block(&self, trigger: &str, binding: &ActionBinding) {
        self.reporter.report_block(
            &self.session,
            &self.bot_score,
            trigger,
            &binding.source,
            self.clock.now_ms(),
        );
    }

    /// Probes on a detached task so a timeout never cancels the request.
    async fn verify(&self, request: &DownloadRequest) -> Result<(), DownloadError> {
        let transport = Arc::clone(&self.transport);
        let probe_request = request.clone();
        let probe = tokio::spawn(async move { transport.verify(&probe_request).await });

        match tokio::time::timeout(self.config.verify_timeout, probe).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(DownloadError::malformed(
                request.url().as_str(),
                format!("verification task failed: {join_error}"),
            )),
            Err(_) => {
                warn!(
                    timeout = ?self.config.verify_timeout,
                    "verification timed out"
                );
                Err(DownloadError::timeout(request.url().as_str()))
            }
        }
    }

    fn emit_error(&self, binding: &ActionBinding, error: &DownloadError) {
        self.telemetry.emit(
            self.event(EventKind::DownloadError)
                .with("source", binding.source.as_str())
                .with("error", error.kind())
                .with("message", error.to_string()),
        );
    }

    fn record_conversion(&self, binding: &ActionBinding) {
        let timestamp = self.clock.now_ms();
        let record = ConversionRecord {
            venture: self.config.venture.clone(),
            timestamp,
            session_id: self.session.session_id().to_string(),
            referrer: self.session.referrer().map(str::to_string),
        };
        if let Err(error) = self.attribution.record(record) {
            warn!(error = %error, "failed to persist conversion");
        }
        let mut event = TelemetryEvent::new(EventKind::Conversion, &self.session, timestamp)
            .with("source", binding.source.as_str());
        if let Some(referrer) = self.session.referrer() {
            event = event.with("referrer", referrer);
        }
        self.telemetry.emit(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gate::Capabilities;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct StubTransport {
        initiated: AtomicUsize,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl DownloadTransport for StubTransport {
        fn initiate(&self, _request: &DownloadRequest) {
            self.initiated.fetch_add(1, Ordering::SeqCst);
        }

        async fn verify(&self, request: &DownloadRequest) -> Result<(), DownloadError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
            }
            if self.fail {
                return Err(DownloadError::http_status(request.url().as_str(), 404));
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenIssuer;

    #[async_trait]
    impl TokenIssuer for BrokenIssuer {
        async fn issue(
            &self,
            _session: &SessionContext,
            _now_ms: u64,
        ) -> Result<DownloadToken, TokenError> {
            Err(TokenError::IssuerUnavailable {
                reason: "authority offline".to_string(),
            })
        }
    }

    fn config() -> GateConfig {
        GateConfig::new(
            "acme",
            Url::parse("https://acme.example.com/").unwrap(),
            Url::parse("https://cdn.example.com/acme.zip").unwrap(),
        )
    }

    fn session() -> SessionContext {
        SessionContext::with_id("sess_test", "acme", 0)
    }

    fn gatekeeper(transport: StubTransport) -> (DownloadGatekeeper, Arc<StubTransport>) {
        let transport = Arc::new(transport);
        let gatekeeper = DownloadGatekeeper::builder(
            config(),
            session(),
            EnvironmentSnapshot::interactive("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"),
        )
        .clock(Arc::new(ManualClock::new(1_000)))
        .transport(Arc::clone(&transport) as Arc<dyn DownloadTransport>)
        .telemetry(TelemetryDispatcher::disabled())
        .build()
        .unwrap();
        (gatekeeper, transport)
    }

    #[tokio::test]
    async fn test_admitted_attempt_reaches_success() {
        let (gatekeeper, transport) = gatekeeper(StubTransport::default());
        let outcome = gatekeeper
            .activate(&Interaction::click("primary_cta"))
            .await
            .unwrap();

        let report = outcome.report().unwrap();
        assert!(report.succeeded());
        assert_eq!(report.source, "primary_cta");
        assert!(report.token.is_some());
        assert!(report.url.as_ref().unwrap().as_str().contains("venture=acme"));
        assert_eq!(transport.initiated.load(Ordering::SeqCst), 1);
        assert_eq!(gatekeeper.board().state("download"), DownloadState::Success);
        assert_eq!(gatekeeper.limiter().snapshot().unwrap().count, 1);
        assert_eq!(gatekeeper.attribution().records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_reaches_error_without_conversion() {
        let (gatekeeper, _) = gatekeeper(StubTransport {
            fail: true,
            ..StubTransport::default()
        });
        let outcome = gatekeeper
            .activate(&Interaction::click("footer_download"))
            .await
            .unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.state, DownloadState::Error);
        assert!(matches!(
            report.error,
            Some(DownloadError::HttpStatus { status: 404, .. })
        ));
        assert!(gatekeeper.attribution().records().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_to_error() {
        let (gatekeeper, _) = gatekeeper(StubTransport {
            hang: true,
            ..StubTransport::default()
        });
        let outcome = gatekeeper
            .activate(&Interaction::click("hero_download"))
            .await
            .unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.state, DownloadState::Error);
        assert!(matches!(report.error, Some(DownloadError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_honeypot_blocks_before_rate_limit() {
        let (gatekeeper, transport) = gatekeeper(StubTransport::default());
        let error = gatekeeper
            .activate(&Interaction::click("primary_cta").with_honeypot("me@spam.example"))
            .await
            .unwrap_err();

        assert!(matches!(error, GateError::SecurityBlock { ref reason, .. } if reason == HONEYPOT_SIGNAL));
        assert!(gatekeeper.limiter().snapshot().is_none());
        assert_eq!(transport.initiated.load(Ordering::SeqCst), 0);
        assert_eq!(gatekeeper.board().state("download"), DownloadState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_control_and_unbound_trigger_are_ignored() {
        let table =
            ActionTable::new().bind_with_triggers("btn", "download", "btn", &[Trigger::Click]);
        let gatekeeper = DownloadGatekeeper::builder(
            config(),
            session(),
            EnvironmentSnapshot::interactive("Mozilla/5.0"),
        )
        .transport(Arc::new(StubTransport::default()))
        .telemetry(TelemetryDispatcher::disabled())
        .actions(table)
        .build()
        .unwrap();

        let unknown = gatekeeper.activate(&Interaction::click("nav")).await.unwrap();
        assert!(matches!(
            unknown,
            AttemptOutcome::Ignored(IgnoreReason::UnknownControl)
        ));
        let keyboard = gatekeeper
            .activate(&Interaction::keyboard("btn"))
            .await
            .unwrap();
        assert!(matches!(
            keyboard,
            AttemptOutcome::Ignored(IgnoreReason::TriggerNotBound)
        ));
    }

    #[tokio::test]
    async fn test_issuer_failure_ends_in_error_state() {
        let gatekeeper = DownloadGatekeeper::builder(
            config(),
            session(),
            EnvironmentSnapshot::interactive("Mozilla/5.0"),
        )
        .transport(Arc::new(StubTransport::default()))
        .issuer(Arc::new(BrokenIssuer))
        .telemetry(TelemetryDispatcher::disabled())
        .build()
        .unwrap();

        let outcome = gatekeeper
            .activate(&Interaction::click("primary_cta"))
            .await
            .unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.state, DownloadState::Error);
        assert!(report.token.is_none());
        assert!(matches!(report.error, Some(DownloadError::Token(_))));
    }

    #[derive(Debug)]
    struct StalledIssuer;

    #[async_trait]
    impl TokenIssuer for StalledIssuer {
        async fn issue(
            &self,
            _session: &SessionContext,
            _now_ms: u64,
        ) -> Result<DownloadToken, TokenError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Err(TokenError::IssuerUnavailable {
                reason: "never answered".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_issuer_is_bounded_by_timeout() {
        let gatekeeper = DownloadGatekeeper::builder(
            config(),
            session(),
            EnvironmentSnapshot::interactive("Mozilla/5.0"),
        )
        .transport(Arc::new(StubTransport::default()))
        .issuer(Arc::new(StalledIssuer))
        .telemetry(TelemetryDispatcher::disabled())
        .build()
        .unwrap();

        let started = tokio::time::Instant::now();
        let primary_click = Interaction::click("primary_cta");
        let first = gatekeeper.activate(&primary_click);
        let sibling = async {
            tokio::task::yield_now().await;
            gatekeeper
                .activate(&Interaction::click("footer_download"))
                .await
        };
        let (first, sibling) = tokio::join!(first, sibling);

        // Two serialized admissions, each cut off at the issuance timeout.
        assert!(started.elapsed() >= TOKEN_ISSUE_TIMEOUT * 2);
        assert!(started.elapsed() < TOKEN_ISSUE_TIMEOUT * 3);
        for outcome in [first.unwrap(), sibling.unwrap()] {
            let report = outcome.report().unwrap();
            assert_eq!(report.state, DownloadState::Error);
            assert!(matches!(
                report.error,
                Some(DownloadError::Token(TokenError::IssuerUnavailable { .. }))
            ));
        }
        assert_eq!(gatekeeper.board().state("download"), DownloadState::Error);
    }

    #[tokio::test]
    async fn test_missing_capability_fails_construction() {
        let mut environment = EnvironmentSnapshot::interactive("Mozilla/5.0");
        environment.capabilities = Capabilities {
            secure_random: false,
            ..Capabilities::default()
        };
        let error = DownloadGatekeeper::builder(config(), session(), environment)
            .telemetry(TelemetryDispatcher::disabled())
            .build()
            .unwrap_err();
        assert_eq!(
            error,
            GateError::EnvironmentUnsupported {
                capability: "secure_random"
            }
        );
    }
}
