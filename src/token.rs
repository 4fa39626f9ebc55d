//! Per-attempt opaque download tokens.
//!
//! A token correlates one download attempt across the download request and
//! telemetry. It is an obfuscation measure only: nothing here signs or
//! verifies it. Real authorization belongs to a trusted issuer behind
//! [`TokenIssuer`]; [`LocalTokenIssuer`] is the in-process stand-in.
//!
//! # Encoding
//!
//! Claims are serialized as compact JSON `{"t":..,"n":..,"s":..,"v":..}`
//! (issue time, nonce, session id, venture), encoded as URL-safe base64
//! without padding, and cut to exactly [`TOKEN_LENGTH`] characters. Short
//! claims are padded with trailing JSON whitespace first, so the token length
//! does not depend on the session id or venture. Issue time and nonce lead
//! the record so truncation always keeps them.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::session::SessionContext;

/// Fixed length of an encoded token.
pub const TOKEN_LENGTH: usize = 64;

/// Raw bytes that encode to exactly [`TOKEN_LENGTH`] base64 characters.
const MIN_CLAIMS_BYTES: usize = TOKEN_LENGTH / 4 * 3;

/// Errors raised while issuing a token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Claims could not be serialized.
    #[error("failed to encode token claims: {0}")]
    Encode(#[from] serde_json::Error),

    /// An external issuer refused or failed to issue.
    #[error("token issuer unavailable: {reason}")]
    IssuerUnavailable {
        /// Issuer-provided reason.
        reason: String,
    },
}

/// Fields embedded in a token, in encoding order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenClaims {
    /// Issue time in epoch milliseconds.
    #[serde(rename = "t")]
    pub issued_at_ms: u64,
    /// Random nonce, lowercase hex.
    #[serde(rename = "n")]
    pub nonce: String,
    /// Session the attempt belongs to.
    #[serde(rename = "s")]
    pub session_id: String,
    /// Venture the download belongs to.
    #[serde(rename = "v")]
    pub venture: String,
}

/// An issued token together with its issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadToken {
    value: String,
    issued_at_ms: u64,
}

impl DownloadToken {
    /// Wraps an already-encoded token value.
    #[must_use]
    pub fn new(value: impl Into<String>, issued_at_ms: u64) -> Self {
        Self {
            value: value.into(),
            issued_at_ms,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn issued_at_ms(&self) -> u64 {
        self.issued_at_ms
    }
}

impl std::fmt::Display for DownloadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Encodes claims into a fixed-length opaque string. Pure.
///
/// # Errors
///
/// Returns [`TokenError::Encode`] if the claims cannot be serialized.
///
/// # Example
///
/// ```
/// use download_gate::token::{TOKEN_LENGTH, TokenClaims, encode_claims};
///
/// let claims = TokenClaims {
///     issued_at_ms: 1_700_000_000_000,
///     nonce: "00000000deadbeef".to_string(),
///     session_id: "sess_1".to_string(),
///     venture: "acme".to_string(),
/// };
/// let token = encode_claims(&claims).unwrap();
/// assert_eq!(token.len(), TOKEN_LENGTH);
/// assert_eq!(token, encode_claims(&claims).unwrap());
/// ```
pub fn encode_claims(claims: &TokenClaims) -> Result<String, TokenError> {
    let mut json = serde_json::to_vec(claims)?;
    if json.len() < MIN_CLAIMS_BYTES {
        json.resize(MIN_CLAIMS_BYTES, b' ');
    }
    let mut encoded = URL_SAFE_NO_PAD.encode(json);
    encoded.truncate(TOKEN_LENGTH);
    Ok(encoded)
}

/// Source of download tokens.
///
/// Production deployments can plug in a trusted external authority; the
/// gatekeeper only relies on getting a fresh token per attempt.
#[async_trait]
pub trait TokenIssuer: Send + Sync + std::fmt::Debug {
    /// Issues a token for one attempt in `session` at `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if no token can be produced.
    async fn issue(&self, session: &SessionContext, now_ms: u64)
    -> Result<DownloadToken, TokenError>;
}

/// In-process issuer using a random 64-bit nonce.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTokenIssuer;

impl LocalTokenIssuer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TokenIssuer for LocalTokenIssuer {
    #[instrument(skip(self, session), fields(session_id = session.session_id()))]
    async fn issue(
        &self,
        session: &SessionContext,
        now_ms: u64,
    ) -> Result<DownloadToken, TokenError> {
        let claims = TokenClaims {
            issued_at_ms: now_ms,
            nonce: format!("{:016x}", rand::thread_rng().r#gen::<u64>()),
            session_id: session.session_id().to_string(),
            venture: session.venture().to_string(),
        };
        let value = encode_claims(&claims)?;
        debug!("issued download token");
        Ok(DownloadToken::new(value, now_ms))
    }
}
