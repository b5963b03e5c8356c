//! Capability traits the pool orchestrates.
//!
//! The pool never speaks SSH itself. A [`Dialer`] produces an established client
//! for a (network, address, credentials) triple, and a [`SessionClient`] opens
//! sessions on it and tears it down. The russh implementations live in
//! [`crate::ssh`]; tests substitute in-memory ones.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::credentials::Credentials;
use crate::error::PoolError;

/// An established client connection that can hand out sessions.
#[async_trait]
pub trait SessionClient: Send + Sync + 'static {
    /// A single command-execution channel. Owned exclusively by the caller once returned.
    type Session: Send;

    /// Open a new session on this connection.
    async fn open_session(&self) -> Result<Self::Session, PoolError>;

    /// Tear down the underlying transport. The pool calls this at most once per
    /// pooled connection, after evicting it.
    async fn close(&self);
}

/// Produces client connections for the pool.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Client: SessionClient;

    /// Connect and handshake.
    ///
    /// `deadline` is the caller's overall deadline, if any. The pool bounds the
    /// returned future by it as well, so implementations may use it to tune their
    /// own socket timeouts but are not required to.
    async fn dial(
        &self,
        network: &str,
        address: &str,
        credentials: &Credentials,
        deadline: Option<Instant>,
    ) -> Result<Self::Client, PoolError>;
}

/// The instant `timeout` from now, or `None` when that lies beyond what
/// [`Instant`] can represent. `None` means unbounded.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}
