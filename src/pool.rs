//! The connection pool.
//!
//! ## Acquisition
//!
//! [`Pool::open`] derives the identity key, then asks the table for the entry
//! under that key. The first caller for a key installs a pending entry and dials
//! outside the table lock; every concurrent caller for the same key waits on that
//! entry and sees the same outcome. Dials for different keys never wait on each
//! other.
//!
//! ## Self-healing
//!
//! A failed session open marks the connection suspect: the caller evicts the
//! entry (compare-and-delete, so a fresher entry installed by someone else is left
//! alone), closes it, and loops to dial again. Dial errors are not retried by
//! `open`; they are returned once and the failed entry is evicted so the next
//! call dials afresh. [`Pool::open_with_retry`] layers exponential backoff on top
//! for callers that want redials.
//!
//! ## Deadlines
//!
//! With a timeout configured, `open` computes one overall deadline. The first
//! session-open attempt gets half of the remaining budget, leaving room for a
//! redial; later attempts get everything that is left. Timed-out futures are
//! dropped, so a late result can never reach the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, MAX_RETRY_DELAY, PoolConfig};
use crate::conn::{ConnInfo, PooledConn};
use crate::credentials::Credentials;
use crate::dial::{Dialer, SessionClient, deadline_after};
use crate::error::PoolError;
use crate::key::{AddrUserKey, KeyDeriver};
use crate::ssh::RusshDialer;

/// Session type handed out by a pool using dialer `D`.
pub type SessionOf<D> = <<D as Dialer>::Client as SessionClient>::Session;

type Conn<D> = Arc<PooledConn<<D as Dialer>::Client>>;

/// Shares one client connection per identity key among concurrent callers.
pub struct Pool<D: Dialer> {
    dialer: D,
    key: Box<dyn KeyDeriver>,
    timeout: Option<Duration>,
    max_retries: u32,
    retry_delay: Duration,
    table: DashMap<String, Conn<D>>,
}

impl Pool<RusshDialer> {
    /// A russh-backed pool configured from the environment.
    pub fn new() -> Self {
        Self::from_config(PoolConfig::from_env())
    }

    pub fn from_config(config: PoolConfig) -> Self {
        Self::with_dialer(RusshDialer::new(config.connect_timeout, config.compress))
            .with_timeout(config.timeout.unwrap_or_default())
            .with_retry(config.max_retries, config.retry_delay)
    }
}

impl Default for Pool<RusshDialer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dialer> Pool<D> {
    /// A pool with the default key policy and no timeout.
    pub fn with_dialer(dialer: D) -> Self {
        Self {
            dialer,
            key: Box::new(AddrUserKey),
            timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            table: DashMap::new(),
        }
    }

    /// Replace the identity key policy.
    pub fn with_key(mut self, key: impl KeyDeriver + 'static) -> Self {
        self.key = Box::new(key);
        self
    }

    /// Bound every `open` call. A zero duration disables the bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Backoff used by [`Pool::open_with_retry`].
    pub fn with_retry(mut self, max_retries: u32, min_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = min_delay;
        self
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The identity key `open` would use for this triple.
    pub fn key_for(&self, network: &str, address: &str, credentials: &Credentials) -> String {
        self.key.derive(network, address, credentials)
    }

    /// The entry currently installed under `key`, if any.
    pub fn lookup(&self, key: &str) -> Option<Conn<D>> {
        self.table.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Snapshot of every installed entry.
    pub fn connections(&self) -> Vec<ConnInfo> {
        self.table.iter().map(|entry| entry.value().info()).collect()
    }

    /// Open a new session on the server, reusing an existing connection if possible.
    ///
    /// If no connection exists, or opening the session fails, a new connection is
    /// dialed. If dialing fails, the dial error is returned.
    pub async fn open(
        &self,
        network: &str,
        address: &str,
        credentials: &Credentials,
    ) -> Result<SessionOf<D>, PoolError> {
        let deadline = self.timeout.and_then(deadline_after);
        let key = self.key.derive(network, address, credentials);
        let mut attempt: u32 = 0;

        loop {
            let conn = self
                .get_conn(&key, network, address, credentials, deadline)
                .await;

            let outcome = match deadline {
                Some(deadline) => match timeout_at(deadline, conn.ready()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        // Someone else's dial; leave their entry in place.
                        warn!(
                            "Timed out waiting for in-flight connection to {}@{}",
                            credentials.username, address
                        );
                        return Err(PoolError::DialTimeout(address.to_string()));
                    }
                },
                None => conn.ready().await,
            };

            let client = match outcome {
                Ok(client) => client,
                Err(PoolError::DialAbandoned) => {
                    warn!("Dial for {} was abandoned, dialing again", key);
                    self.remove_conn(&key, &conn);
                    if expired(deadline) {
                        return Err(PoolError::DialAbandoned);
                    }
                    continue;
                }
                Err(err) => {
                    self.remove_conn(&key, &conn);
                    return Err(err);
                }
            };

            let started = Instant::now();
            let attempt_deadline = deadline.map(|deadline| {
                if attempt == 0 {
                    started + deadline.saturating_duration_since(started) / 2
                } else {
                    deadline
                }
            });

            let result = match attempt_deadline {
                Some(at) => timeout_at(at, client.open_session())
                    .await
                    .unwrap_or_else(|_| {
                        Err(PoolError::SessionTimeout(at.saturating_duration_since(started)))
                    }),
                None => client.open_session().await,
            };

            match result {
                Ok(session) => {
                    if attempt > 0 {
                        info!(
                            "Opened session on {} after {} failed attempt(s)",
                            key, attempt
                        );
                    }
                    return Ok(session);
                }
                Err(err) => {
                    warn!("Failed to establish new session on {}: {}", key, err);
                    self.remove_conn(&key, &conn);
                    match deadline {
                        Some(deadline) => {
                            if timeout_at(deadline, conn.close()).await.is_err() {
                                warn!("Close of connection {} did not finish in time", conn.id());
                            }
                        }
                        None => {
                            conn.close().await;
                        }
                    }
                    if expired(deadline) {
                        error!(
                            "Giving up on {} after {} attempt(s). Last error: {}",
                            key,
                            attempt + 1,
                            err
                        );
                        return Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`Pool::open`], but redials with exponential backoff and jitter when the
    /// failure looks transient. Authentication failures and invalid input fail at once.
    pub async fn open_with_retry(
        &self,
        network: &str,
        address: &str,
        credentials: &Credentials,
    ) -> Result<SessionOf<D>, PoolError> {
        let attempt_counter = AtomicU32::new(0);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_delay)
            .with_max_delay(MAX_RETRY_DELAY)
            .with_max_times(self.max_retries as usize)
            .with_jitter();

        let result = (|| async {
            let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);
            if current_attempt > 0 {
                warn!(
                    "Open retry attempt {} to {}@{}",
                    current_attempt, credentials.username, address
                );
            }
            self.open(network, address, credentials).await
        })
        .retry(backoff)
        .when(|e: &PoolError| {
            let retryable = e.is_retryable();
            if !retryable {
                warn!(
                    "Open of {}@{} failed with non-retryable error: {}",
                    credentials.username, address, e
                );
            }
            retryable
        })
        .notify(|err: &PoolError, dur: Duration| {
            warn!("Open failed: {}. Retrying in {:?}", err, dur);
        })
        .await;

        if let Err(e) = &result {
            error!(
                "Open of {}@{} failed after {} attempt(s). Last error: {}",
                credentials.username,
                address,
                attempt_counter.load(Ordering::SeqCst),
                e
            );
        }
        result
    }

    /// Get the entry for `key`, dialing a new connection if none is installed.
    ///
    /// The table shard is locked only to look up or install the entry; the dial
    /// itself runs unlocked, so other keys are never blocked by it.
    ///
    /// # Arguments
    ///
    /// * `key` - Identity key the entry is stored under
    /// * `network`, `address`, `credentials` - Passed through to the dialer
    /// * `deadline` - Bound on the dial when this call performs it
    ///
    /// # Returns
    ///
    /// The entry installed under `key`. It may still be dialing (another caller
    /// owns the dial) or may carry a dial error; callers wait on
    /// [`PooledConn::ready`].
    async fn get_conn(
        &self,
        key: &str,
        network: &str,
        address: &str,
        credentials: &Credentials,
        deadline: Option<Instant>,
    ) -> Conn<D> {
        let (conn, slot) = match self.table.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!("Joining existing connection {} for {}", existing.get().id(), key);
                return existing.get().clone();
            }
            Entry::Vacant(vacant) => {
                let (conn, slot) = PooledConn::pending(key);
                vacant.insert(conn.clone());
                (conn, slot)
            }
        };

        info!(
            "Dialing {} {} as {} (connection {})",
            network,
            address,
            credentials.username,
            conn.id()
        );

        let dial = self.dialer.dial(network, address, credentials, deadline);
        let outcome = match deadline {
            Some(deadline) => timeout_at(deadline, dial)
                .await
                .unwrap_or_else(|_| Err(PoolError::DialTimeout(address.to_string()))),
            None => dial.await,
        };

        match &outcome {
            Ok(_) => debug!("Connection {} to {} established", conn.id(), address),
            Err(e) => warn!("Connection {} to {} failed: {}", conn.id(), address, e),
        }

        slot.resolve(outcome.map(Arc::new));
        conn
    }

    /// Remove `conn` from the table only if it is still the entry installed under `key`.
    fn remove_conn(&self, key: &str, conn: &Conn<D>) -> bool {
        let removed = self
            .table
            .remove_if(key, |_, current| Arc::ptr_eq(current, conn))
            .is_some();
        if removed {
            debug!("Evicted connection {} for {}", conn.id(), key);
        }
        removed
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}
