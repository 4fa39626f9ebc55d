//! Telemetry delivery targets.
//!
//! - [`EndpointSink`] - JSON `POST` to a collector. Used for the first-party
//!   `/api/analytics` endpoint and for configured third-party mirrors.
//! - [`BeaconSink`] - detached best-effort `POST`; returns as soon as the send
//!   is queued, like a browser beacon.
//! - [`HookSink`] - forwards to an in-process hook; disabled when no hook is
//!   installed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::error::TelemetryError;
use super::event::TelemetryEvent;
use crate::user_agent;

/// Request timeout for telemetry posts.
const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// One telemetry delivery target.
#[async_trait]
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    /// Stable name used in logs and delivery reports.
    fn name(&self) -> &str;

    /// Whether the sink should be invoked at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] on any delivery failure.
    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

fn build_client(sink: &str) -> Result<Client, TelemetryError> {
    Client::builder()
        .timeout(TELEMETRY_TIMEOUT)
        .user_agent(user_agent::default_telemetry_user_agent())
        .build()
        .map_err(|e| TelemetryError::config(sink, e.to_string()))
}

/// Posts events as JSON to a collector URL.
#[derive(Debug, Clone)]
pub struct EndpointSink {
    name: String,
    url: Url,
    client: Client,
}

impl EndpointSink {
    /// Creates a sink posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Config`] if the HTTP client cannot be built.
    pub fn new(name: impl Into<String>, url: Url) -> Result<Self, TelemetryError> {
        let name = name.into();
        let client = build_client(&name)?;
        Ok(Self { name, url, client })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TelemetrySink for EndpointSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "debug", skip(self, event), fields(sink = %self.name, event = %event.kind()))]
    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(event)
            .send()
            .await
            .map_err(|e| TelemetryError::transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::status(&self.name, status.as_u16()));
        }
        debug!("event delivered");
        Ok(())
    }
}

/// Fire-and-forget sender. The post runs on a detached task; its outcome is
/// only logged.
#[derive(Debug, Clone)]
pub struct BeaconSink {
    url: Url,
    client: Client,
}

impl BeaconSink {
    /// Creates a beacon posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Config`] if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self, TelemetryError> {
        let client = build_client("beacon")?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl TelemetrySink for BeaconSink {
    fn name(&self) -> &str {
        "beacon"
    }

    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let body = serde_json::to_vec(event)
            .map_err(|e| TelemetryError::rejected("beacon", e.to_string()))?;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Err(TelemetryError::rejected("beacon", "no runtime to queue send"));
        };

        let request = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        handle.spawn(async move {
            match request.send().await {
                Ok(response) => debug!(status = response.status().as_u16(), "beacon sent"),
                Err(error) => debug!(error = %error, "beacon send failed"),
            }
        });
        Ok(())
    }
}

/// In-process hook signature.
pub type Hook = dyn Fn(&TelemetryEvent) -> Result<(), String> + Send + Sync;

/// Mirrors events into an in-process hook such as a third-party analytics
/// bridge. Only invoked when a hook is installed.
#[derive(Clone)]
pub struct HookSink {
    name: String,
    hook: Option<Arc<Hook>>,
}

impl HookSink {
    /// Creates a sink forwarding to `hook`, or a disabled sink for `None`.
    #[must_use]
    pub fn new(name: impl Into<String>, hook: Option<Arc<Hook>>) -> Self {
        Self {
            name: name.into(),
            hook,
        }
    }
}

impl fmt::Debug for HookSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSink")
            .field("name", &self.name)
            .field("installed", &self.hook.is_some())
            .finish()
    }
}

#[async_trait]
impl TelemetrySink for HookSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.hook.is_some()
    }

    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        match &self.hook {
            Some(hook) => hook(event).map_err(|reason| TelemetryError::rejected(&self.name, reason)),
            None => Ok(()),
        }
    }
}
