//! Pool error type and retry classification.
//!
//! Every failure surfaced by [`Pool::open`](crate::Pool::open) is a [`PoolError`].
//! The type is `Clone` because a single dial outcome is broadcast to every caller
//! waiting on the same connection entry, and they must all observe the same error.
//!
//! # Retry classification
//!
//! [`PoolError::is_retryable`] decides whether a caller-driven redial
//! ([`Pool::open_with_retry`](crate::Pool::open_with_retry)) should try again:
//!
//! 1. **Never retried**: authentication rejections and invalid inputs (bad address,
//!    unsupported network kind).
//! 2. **Always retried**: timeouts, abandoned dials and session-open failures.
//! 3. **Dial failures**: the message is classified by [`is_retryable_error`], where
//!    authentication keywords take precedence over connection keywords.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the pool and the default russh dialer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The address could not be parsed for the requested network kind.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The dialer does not know how to reach this network kind.
    #[error("unsupported network kind {0:?}")]
    UnsupportedNetwork(String),

    /// Raw connection or handshake failure.
    #[error("failed to connect: {0}")]
    Dial(String),

    /// The dial did not finish before the caller's deadline.
    #[error("connection to {0} timed out")]
    DialTimeout(String),

    /// The caller performing the dial went away before recording an outcome.
    #[error("dial was abandoned before completing")]
    DialAbandoned,

    /// The server rejected every configured authentication method.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The client is established but a new session could not be opened on it.
    #[error("failed to open session: {0}")]
    Session(String),

    /// A session-open attempt exceeded its share of the deadline.
    #[error("session open timed out after {0:?}")]
    SessionTimeout(Duration),

    /// Command execution on an opened session failed.
    #[error("failed to execute command: {0}")]
    Exec(String),
}

impl PoolError {
    /// Whether a fresh `open` could plausibly succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PoolError::InvalidAddress { .. }
            | PoolError::UnsupportedNetwork(_)
            | PoolError::Auth(_) => false,
            PoolError::DialTimeout(_)
            | PoolError::DialAbandoned
            | PoolError::Session(_)
            | PoolError::SessionTimeout(_) => true,
            PoolError::Dial(msg) | PoolError::Exec(msg) => is_retryable_error(msg),
        }
    }
}

/// Message fragments that mark a permanent credential problem.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Message fragments that mark a transient network problem.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
    "would block",
];

/// Classifies a raw transport error message as transient (`true`) or permanent.
///
/// Authentication patterns are checked first so that a message such as
/// "timeout during authentication failed" is still permanent. Messages matching
/// neither list are retried unless they look like an SSH protocol error that
/// mentions neither a timeout nor a connect failure.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if AUTH_ERRORS.iter().any(|pat| error_lower.contains(pat)) {
        return false;
    }

    if RETRYABLE_ERRORS.iter().any(|pat| error_lower.contains(pat)) {
        return true;
    }

    !error_lower.contains("ssh") || error_lower.contains("timeout") || error_lower.contains("connect")
}
