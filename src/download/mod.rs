//! Download flow: control bindings, visible state and the gatekeeper.
//!
//! # Architecture
//!
//! - [`ActionTable`] - which controls drive which logical action
//! - [`ControlBoard`] - one [`DownloadState`] per action group, with revert timers
//! - [`DownloadGatekeeper`] - gates, token, transfer, verification and telemetry
//! - [`DownloadTransport`] / [`HttpTransport`] - starting and verifying transfers
//! - [`HttpClient`] - streaming HTTP client shared by transfers and metadata loads
//!
//! # Example
//!
//! ```no_run
//! use download_gate::config::GateConfig;
//! use download_gate::download::{DownloadGatekeeper, Interaction};
//! use download_gate::gate::EnvironmentSnapshot;
//! use download_gate::session::SessionContext;
//! use download_gate::clock::SystemClock;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GateConfig::new(
//!     "acme",
//!     Url::parse("https://acme.example.com/")?,
//!     Url::parse("https://cdn.example.com/acme.zip")?,
//! );
//! let session = SessionContext::start("acme", &SystemClock);
//! let env = EnvironmentSnapshot::interactive("Mozilla/5.0 (X11; Linux x86_64)");
//! let gatekeeper = DownloadGatekeeper::builder(config, session, env).build()?;
//!
//! gatekeeper.page_view();
//! match gatekeeper.activate(&Interaction::click("primary_cta")).await {
//!     Ok(outcome) => println!("{outcome:?}"),
//!     Err(gate) => println!("{}", gate.advisory()),
//! }
//! gatekeeper.telemetry().flush().await;
//! # Ok(())
//! # }
//! ```

mod actions;
mod client;
mod constants;
mod error;
mod filename;
mod gatekeeper;
pub mod info;
mod machine;
mod request;
mod transport;

pub use actions::{ActionBinding, ActionTable, DOWNLOAD_ACTION, Trigger};
pub use client::HttpClient;
pub use constants::{
    CONNECT_TIMEOUT_SECS, ERROR_REVERT_DELAY, READ_TIMEOUT_SECS, SUCCESS_REVERT_DELAY,
    TOKEN_ISSUE_TIMEOUT, VERIFY_TIMEOUT,
};
pub use error::DownloadError;
pub use gatekeeper::{
    AttemptOutcome, AttemptReport, DownloadGatekeeper, GatekeeperBuilder, IgnoreReason,
    Interaction,
};
pub use info::{Checksums, DownloadInfo};
pub use machine::{ControlBoard, DownloadState, RevertDelays, StateChange};
pub use request::DownloadRequest;
pub use transport::{DownloadTransport, HttpTransport};

// Note: no module-local Result aliases. Use `Result<T, DownloadError>`
// explicitly in function signatures.
