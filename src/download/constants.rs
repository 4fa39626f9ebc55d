//! Constants for the download module (timeouts, revert delays).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Delay before a `success` state reverts to `idle`.
pub const SUCCESS_REVERT_DELAY: Duration = Duration::from_millis(3000);

/// Delay before an `error` state reverts to `idle`.
pub const ERROR_REVERT_DELAY: Duration = Duration::from_millis(5000);

/// Upper bound on the post-initiation verification probe.
pub const VERIFY_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Upper bound on obtaining a token from the issuer.
pub const TOKEN_ISSUE_TIMEOUT: Duration = Duration::from_millis(5000);
