//! Integration tests for the download gatekeeper.
//!
//! A wiremock server plays the site: analytics endpoint, download target and
//! metadata resources. Time for the rate-limit window comes from a
//! `ManualClock`; revert delays are shortened so tests run in real time.

use std::sync::Arc;
use std::time::Duration;

use download_gate::clock::ManualClock;
use download_gate::config::GateConfig;
use download_gate::download::{
    AttemptOutcome, DownloadGatekeeper, DownloadState, HttpClient, IgnoreReason, Interaction,
};
use download_gate::gate::{
    Capabilities, EnvironmentSnapshot, GateError, RATE_LIMIT_KEY, RateLimitWindow,
};
use download_gate::session::SessionContext;
use download_gate::storage::{KeyValueStore, MemoryStore, save_json};
use serde_json::Value;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const START_MS: u64 = 1_700_000_000_000;
const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15";

struct Site {
    server: MockServer,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

impl Site {
    async fn start(analytics_status: u16, download_status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analytics"))
            .respond_with(ResponseTemplate::new(analytics_status))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/releases/acme.zip"))
            .respond_with(ResponseTemplate::new(download_status))
            .mount(&server)
            .await;
        Self {
            server,
            clock: Arc::new(ManualClock::new(START_MS)),
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn config(&self) -> GateConfig {
        let site_url = Url::parse(&format!("{}/", self.server.uri())).expect("site url");
        let download_url = site_url.join("/releases/acme.zip").expect("download url");
        let mut config = GateConfig::new("acme", site_url, download_url);
        config.version = "2.4.1".to_string();
        config.success_revert = Duration::from_millis(150);
        config.error_revert = Duration::from_millis(250);
        config
    }

    fn gatekeeper(&self, environment: EnvironmentSnapshot) -> Result<DownloadGatekeeper, GateError> {
        let session = SessionContext::with_id("sess_it", "acme", START_MS)
            .with_referrer("https://news.example.com/launch");
        DownloadGatekeeper::builder(self.config(), session, environment)
            .clock(Arc::clone(&self.clock) as _)
            .store(Arc::clone(&self.store) as _)
            .build()
    }

    fn window_count(&self) -> Option<u32> {
        let raw = self.store.get(RATE_LIMIT_KEY).expect("store readable")?;
        let window: RateLimitWindow = serde_json::from_str(&raw).expect("window json");
        Some(window.count)
    }

    async fn posted_events(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == "/api/analytics")
            .filter_map(|request| request.body_json::<Value>().ok())
            .collect()
    }
}

fn event_names(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| event["event"].as_str().map(str::to_string))
        .collect()
}

fn browser() -> EnvironmentSnapshot {
    EnvironmentSnapshot::interactive(BROWSER_UA)
}

async fn click(gatekeeper: &DownloadGatekeeper, control: &str) -> Result<DownloadState, GateError> {
    match gatekeeper.activate(&Interaction::click(control)).await? {
        AttemptOutcome::Completed(report) => Ok(report.state),
        AttemptOutcome::Ignored(reason) => panic!("activation ignored: {reason:?}"),
    }
}

#[tokio::test]
async fn test_fourth_click_in_window_is_rate_limited_until_window_expires() {
    let site = Site::start(200, 200).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");
    assert!(gatekeeper.bot_score().value() < 50);

    // Three clicks within ten seconds.
    for offset_ms in [0, 4_000, 8_000] {
        site.clock.set(START_MS + offset_ms);
        let state = click(&gatekeeper, "primary_cta").await.expect("admitted");
        assert_eq!(state, DownloadState::Success);
    }
    assert_eq!(site.window_count(), Some(3));

    // Fourth click at second 15.
    site.clock.set(START_MS + 15_000);
    let error = click(&gatekeeper, "primary_cta").await.unwrap_err();
    assert_eq!(
        error,
        GateError::RateLimitExceeded {
            count: 3,
            max: 3,
            retry_after_ms: 45_000,
        }
    );
    assert_eq!(
        error.advisory().to_string(),
        "Too many download attempts. Please wait 45s before trying again."
    );
    assert_eq!(site.window_count(), Some(3));

    // Second 61: the window has expired and restarts.
    site.clock.set(START_MS + 61_000);
    let state = click(&gatekeeper, "primary_cta").await.expect("admitted");
    assert_eq!(state, DownloadState::Success);
    assert_eq!(site.window_count(), Some(1));

    gatekeeper.telemetry().flush().await;
    let names = event_names(&site.posted_events().await);
    assert_eq!(names.iter().filter(|n| *n == "download_started").count(), 4);
    assert_eq!(names.iter().filter(|n| *n == "download_verified").count(), 4);
    assert_eq!(names.iter().filter(|n| *n == "download_rate_limited").count(), 1);
    assert!(!names.iter().any(|n| n == "security_event"));
    assert_eq!(gatekeeper.attribution().records().expect("records").len(), 4);
}

#[tokio::test]
async fn test_attempt_events_are_emitted_in_causal_order() {
    let site = Site::start(200, 200).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");

    gatekeeper.page_view();
    click(&gatekeeper, "hero_download").await.expect("admitted");
    gatekeeper.telemetry().flush().await;

    let events = site.posted_events().await;
    assert_eq!(
        event_names(&events),
        vec!["page_view", "download_started", "download_verified", "conversion"]
    );
    for event in &events {
        assert_eq!(event["venture"], "acme");
        assert_eq!(event["sessionId"], "sess_it");
        assert!(event["timestamp"].is_u64());
    }
    assert_eq!(events[0]["referrer"], "https://news.example.com/launch");
    assert_eq!(events[1]["source"], "hero");
    assert_eq!(events[1]["version"], "2.4.1");
    assert_eq!(
        events[1]["token"].as_str().map(str::len),
        Some(download_gate::token::TOKEN_LENGTH)
    );
}

#[tokio::test]
async fn test_download_request_carries_token_parameters() {
    let site = Site::start(200, 200).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");

    let outcome = gatekeeper
        .activate(&Interaction::click("footer_download"))
        .await
        .expect("admitted");
    let report = outcome.report().expect("completed");
    let url = report.url.as_ref().expect("url built");
    let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

    assert_eq!(url.path(), "/releases/acme.zip");
    assert_eq!(params["venture"], "acme");
    assert_eq!(params["version"], "2.4.1");
    assert_eq!(params["t"], START_MS.to_string());
    assert_eq!(
        Some(params["token"].as_str()),
        report.token.as_ref().map(|t| t.as_str())
    );

    let probes: Vec<_> = site
        .server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "HEAD")
        .collect();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].url.query(), url.query());
}

#[tokio::test]
async fn test_tokens_differ_between_attempts_in_one_session() {
    let site = Site::start(200, 200).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let outcome = gatekeeper
            .activate(&Interaction::click("primary_cta"))
            .await
            .expect("admitted");
        tokens.push(outcome.report().and_then(|r| r.token.clone()).expect("token"));
    }
    assert_ne!(tokens[0], tokens[1]);
}

#[tokio::test]
async fn test_bot_score_blocks_regardless_of_window_and_leaves_it_untouched() {
    let site = Site::start(200, 200).await;
    let full_window = RateLimitWindow {
        count: 3,
        window_start: START_MS,
    };
    save_json(site.store.as_ref(), RATE_LIMIT_KEY, &full_window).expect("seed window");
    let stored_before = site.store.get(RATE_LIMIT_KEY).expect("readable");

    let mut environment = EnvironmentSnapshot::interactive("Mozilla/5.0 HeadlessChrome/124.0");
    environment.webdriver = true;
    let gatekeeper = site.gatekeeper(environment).expect("supported environment");
    assert!(gatekeeper.bot_score().value() >= 50);

    let error = click(&gatekeeper, "primary_cta").await.unwrap_err();
    assert!(matches!(error, GateError::SecurityBlock { .. }));
    assert_eq!(site.store.get(RATE_LIMIT_KEY).expect("readable"), stored_before);
    assert_eq!(gatekeeper.board().state("download"), DownloadState::Idle);

    gatekeeper.telemetry().flush().await;
    let events = site.posted_events().await;
    assert_eq!(event_names(&events), vec!["security_event"]);
    assert_eq!(events[0]["reason"], "automation_marker");
    assert_eq!(events[0]["source"], "primary_cta");
    assert!(events[0]["botScore"].as_u64().is_some_and(|s| s >= 50));
}

#[tokio::test]
async fn test_blocked_attempt_does_not_create_window() {
    let site = Site::start(200, 200).await;
    let mut environment = browser();
    environment.webdriver = true;
    let gatekeeper = site.gatekeeper(environment).expect("supported environment");

    for _ in 0..5 {
        assert!(click(&gatekeeper, "primary_cta").await.is_err());
    }
    assert_eq!(site.window_count(), None);
}

#[tokio::test]
async fn test_missing_fetch_capability_fails_before_any_gate() {
    let site = Site::start(200, 200).await;
    let mut environment = browser();
    environment.capabilities = Capabilities {
        fetch: false,
        ..Capabilities::default()
    };

    let error = site.gatekeeper(environment).unwrap_err();
    assert_eq!(
        error,
        GateError::EnvironmentUnsupported { capability: "fetch" }
    );
    assert_eq!(site.window_count(), None);
    assert!(site.server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_rejecting_telemetry_endpoint_does_not_affect_download() {
    let site = Site::start(500, 200).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");

    gatekeeper.page_view();
    let state = click(&gatekeeper, "primary_cta").await.expect("admitted");
    assert_eq!(state, DownloadState::Success);

    gatekeeper.telemetry().flush().await;
    let stats = gatekeeper.telemetry().stats();
    assert_eq!(stats.emitted(), 4);
    assert_eq!(stats.delivered() + stats.undelivered(), 4);
}

#[tokio::test]
async fn test_missing_download_target_ends_in_error_then_reverts() {
    let site = Site::start(200, 404).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");

    let state = click(&gatekeeper, "primary_cta").await.expect("admitted");
    assert_eq!(state, DownloadState::Error);
    assert!(gatekeeper.attribution().records().expect("records").is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(gatekeeper.board().state("download"), DownloadState::Idle);

    gatekeeper.telemetry().flush().await;
    let events = site.posted_events().await;
    assert_eq!(event_names(&events), vec!["download_started", "download_error"]);
    assert_eq!(events[1]["error"], "http_status");
}

#[tokio::test]
async fn test_sibling_controls_share_state_and_serialize_attempts() {
    let site = Site::start(200, 200).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");
    let board = gatekeeper.board().clone();
    let mut changes = board.subscribe();

    let primary = Interaction::click("primary_cta");
    let footer = Interaction::click("footer_download");
    let (first, second) = tokio::join!(gatekeeper.activate(&primary), gatekeeper.activate(&footer));

    assert!(first.expect("admitted").report().is_some_and(|r| r.succeeded()));
    assert!(matches!(
        second.expect("not gated"),
        AttemptOutcome::Ignored(IgnoreReason::Disabled)
    ));
    assert_eq!(site.window_count(), Some(1));

    for control in ["primary_cta", "hero_download", "footer_download"] {
        assert_eq!(board.control_state(control), Some(DownloadState::Success));
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    for control in ["primary_cta", "hero_download", "footer_download"] {
        assert_eq!(board.control_state(control), Some(DownloadState::Idle));
        assert!(board.is_enabled(control));
    }

    let mut seen = Vec::new();
    while let Ok(change) = changes.try_recv() {
        seen.push(change.to);
    }
    assert_eq!(
        seen,
        vec![
            DownloadState::Preparing,
            DownloadState::Success,
            DownloadState::Idle
        ]
    );
}

#[tokio::test]
async fn test_download_info_is_loaded_and_reported() {
    let site = Site::start(200, 200).await;
    Mock::given(method("GET"))
        .and(path("/download/download-info.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "size": "48.3 MB",
            "version": "2.4.1",
            "checksums": {"sha256": "ab"}
        })))
        .mount(&site.server)
        .await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");

    let info = gatekeeper
        .load_download_info(&HttpClient::new())
        .await
        .expect("info published");
    assert_eq!(info.size.as_deref(), Some("48.3 MB"));

    gatekeeper.telemetry().flush().await;
    let events = site.posted_events().await;
    assert_eq!(event_names(&events), vec!["download_info_loaded"]);
    assert_eq!(events[0]["version"], "2.4.1");
}

#[tokio::test]
async fn test_missing_download_info_is_not_fatal() {
    let site = Site::start(200, 200).await;
    let gatekeeper = site.gatekeeper(browser()).expect("supported environment");

    assert!(gatekeeper.load_download_info(&HttpClient::new()).await.is_none());
    let state = click(&gatekeeper, "primary_cta").await.expect("admitted");
    assert_eq!(state, DownloadState::Success);
}
