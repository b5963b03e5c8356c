//! Pooled connection entries.
//!
//! A [`PooledConn`] is installed in the pool table before its dial starts. The
//! caller that installed it holds the matching [`DialSlot`] and records the dial
//! outcome exactly once; every other caller for the same key waits on the entry
//! and observes that same outcome. Once recorded, the outcome never changes. The
//! only later transition is [`PooledConn::close`] after eviction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::dial::SessionClient;
use crate::error::PoolError;

pub(crate) type DialOutcome<C> = Result<Arc<C>, PoolError>;

/// Lifecycle state reported by [`ConnInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnState {
    /// The dial has not finished yet.
    Dialing,
    /// Connected and usable for new sessions.
    Ready,
    /// The dial failed; the entry is about to be evicted.
    Failed,
    /// Evicted and its transport shut down.
    Closed,
}

/// Point-in-time description of a pooled connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnInfo {
    pub id: Uuid,
    pub key: String,
    /// When the entry was installed (RFC3339 format)
    pub dialed_at: String,
    pub state: ConnState,
}

/// One pooled transport + client pairing for a single identity key.
pub struct PooledConn<C> {
    id: Uuid,
    key: String,
    dialed_at: DateTime<Utc>,
    outcome: watch::Receiver<Option<DialOutcome<C>>>,
    closed: AtomicBool,
}

/// Write half of an entry's completion signal, owned by the caller doing the dial.
///
/// Dropping it without calling [`DialSlot::resolve`] wakes every waiter with
/// [`PoolError::DialAbandoned`].
pub(crate) struct DialSlot<C> {
    tx: watch::Sender<Option<DialOutcome<C>>>,
}

impl<C> DialSlot<C> {
    pub(crate) fn resolve(self, outcome: DialOutcome<C>) {
        self.tx.send_replace(Some(outcome));
    }
}

impl<C: SessionClient> PooledConn<C> {
    /// A fresh entry whose dial has not finished, plus the slot to finish it with.
    pub(crate) fn pending(key: impl Into<String>) -> (Arc<Self>, DialSlot<C>) {
        let (tx, rx) = watch::channel(None);
        let conn = Arc::new(Self {
            id: Uuid::new_v4(),
            key: key.into(),
            dialed_at: Utc::now(),
            outcome: rx,
            closed: AtomicBool::new(false),
        });
        (conn, DialSlot { tx })
    }

    /// Wait until the dial outcome is recorded. Returns immediately once it is.
    pub(crate) async fn ready(&self) -> DialOutcome<C> {
        let mut rx = self.outcome.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Err(PoolError::DialAbandoned)),
            Err(_) => Err(PoolError::DialAbandoned),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The established client, if the dial has finished successfully.
    pub fn client(&self) -> Option<Arc<C>> {
        match &*self.outcome.borrow() {
            Some(Ok(client)) => Some(client.clone()),
            _ => None,
        }
    }

    /// The dial error, if the dial has finished unsuccessfully.
    pub fn dial_error(&self) -> Option<PoolError> {
        match &*self.outcome.borrow() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnState {
        if self.is_closed() {
            return ConnState::Closed;
        }
        match &*self.outcome.borrow() {
            None if self.outcome.has_changed().is_err() => ConnState::Failed,
            None => ConnState::Dialing,
            Some(Ok(_)) => ConnState::Ready,
            Some(Err(_)) => ConnState::Failed,
        }
    }

    pub fn info(&self) -> ConnInfo {
        ConnInfo {
            id: self.id,
            key: self.key.clone(),
            dialed_at: self.dialed_at.to_rfc3339(),
            state: self.state(),
        }
    }

    /// Shut down the client. Only the first call does anything; returns whether
    /// this call was the one that closed it.
    pub(crate) async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(client) = self.client() {
            client.close().await;
        }
        true
    }
}
