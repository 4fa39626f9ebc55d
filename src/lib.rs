//! Download gatekeeper and telemetry pipeline.
//!
//! Decides, per visitor interaction, whether a binary download may start,
//! issues a per-attempt token for it, tracks the outcome on the page's
//! download controls, and fans every lifecycle event out to independent
//! telemetry sinks.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`gate`] - bot scoring, rate limiting, honeypot and environment checks
//! - [`token`] - per-attempt download tokens behind an issuer seam
//! - [`download`] - control bindings, state machine and the gatekeeper
//! - [`telemetry`] - lifecycle events and multi-sink dispatch
//! - [`attribution`] - conversion records for successful downloads
//! - [`storage`] - key-value persistence for client state
//! - [`session`] / [`clock`] - per-visit context and time source

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attribution;
pub mod clock;
pub mod config;
pub mod download;
pub mod gate;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod token;
mod user_agent;

// Re-export commonly used types
pub use config::GateConfig;
pub use download::{
    AttemptOutcome, AttemptReport, DownloadGatekeeper, DownloadState, HttpClient, Interaction,
};
pub use gate::{Advisory, GateError};
pub use session::SessionContext;
pub use telemetry::{TelemetryDispatcher, TelemetryEvent};
