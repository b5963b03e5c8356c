//! In-memory dialer and client used by the unit tests.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;
use tokio::time::Instant;

use crate::credentials::Credentials;
use crate::dial::{Dialer, SessionClient};
use crate::error::PoolError;

/// Counters shared between a client and the test that inspects it.
#[derive(Debug, Default)]
pub(crate) struct ClientStats {
    /// While set, every session open fails.
    pub(crate) broken: AtomicBool,
    pub(crate) sessions: AtomicUsize,
    pub(crate) closes: AtomicUsize,
}

impl ClientStats {
    pub(crate) fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn break_sessions(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

/// What the n-th dial should produce.
#[derive(Debug, Clone)]
pub(crate) enum Plan {
    Connect {
        session_delay: Duration,
        close_delay: Duration,
        fail_sessions: bool,
    },
    Fail(PoolError),
    Hang,
}

impl Plan {
    pub(crate) fn healthy() -> Self {
        Plan::Connect {
            session_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            fail_sessions: false,
        }
    }

    pub(crate) fn broken() -> Self {
        Plan::Connect {
            session_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            fail_sessions: true,
        }
    }

    pub(crate) fn slow(session_delay: Duration) -> Self {
        Plan::Connect {
            session_delay,
            close_delay: Duration::ZERO,
            fail_sessions: false,
        }
    }

    /// Sessions fail and tearing the client down stalls for `close_delay`.
    pub(crate) fn broken_slow_close(close_delay: Duration) -> Self {
        Plan::Connect {
            session_delay: Duration::ZERO,
            close_delay,
            fail_sessions: true,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockClient {
    session_delay: Duration,
    close_delay: Duration,
    pub(crate) stats: Arc<ClientStats>,
}

impl MockClient {
    pub(crate) fn close_count(&self) -> usize {
        self.stats.closes()
    }
}

#[derive(Debug)]
pub(crate) struct MockSession;

#[async_trait]
impl SessionClient for MockClient {
    type Session = MockSession;

    async fn open_session(&self) -> Result<MockSession, PoolError> {
        if !self.session_delay.is_zero() {
            tokio::time::sleep(self.session_delay).await;
        }
        if self.stats.broken.load(Ordering::SeqCst) {
            return Err(PoolError::Session("fail".into()));
        }
        self.stats.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession)
    }

    async fn close(&self) {
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

type PlanFn = Box<dyn Fn(usize) -> Plan + Send + Sync>;

/// Dialer that counts invocations and follows a per-dial script.
pub(crate) struct MockDialer {
    dials: AtomicUsize,
    dial_delay: Duration,
    barrier: Option<Arc<Barrier>>,
    plan: PlanFn,
    addresses: StdMutex<Vec<String>>,
    clients: StdMutex<Vec<Arc<ClientStats>>>,
}

impl MockDialer {
    pub(crate) fn new() -> Self {
        Self::scripted(|_| Plan::healthy())
    }

    pub(crate) fn scripted(plan: impl Fn(usize) -> Plan + Send + Sync + 'static) -> Self {
        Self {
            dials: AtomicUsize::new(0),
            dial_delay: Duration::ZERO,
            barrier: None,
            plan: Box::new(plan),
            addresses: StdMutex::new(Vec::new()),
            clients: StdMutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }

    /// Every dial waits on the barrier, so `n` dials only finish if `n` run at once.
    pub(crate) fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn addresses(&self) -> Vec<String> {
        self.addresses.lock().unwrap().clone()
    }

    /// Stats of the n-th successfully dialed client.
    pub(crate) fn client(&self, n: usize) -> Arc<ClientStats> {
        self.clients.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    type Client = MockClient;

    async fn dial(
        &self,
        _network: &str,
        address: &str,
        _credentials: &Credentials,
        _deadline: Option<Instant>,
    ) -> Result<MockClient, PoolError> {
        let n = self.dials.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().unwrap().push(address.to_string());

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if !self.dial_delay.is_zero() {
            tokio::time::sleep(self.dial_delay).await;
        }

        match (self.plan)(n) {
            Plan::Connect {
                session_delay,
                close_delay,
                fail_sessions,
            } => {
                let client = MockClient {
                    session_delay,
                    close_delay,
                    stats: Arc::new(ClientStats {
                        broken: AtomicBool::new(fail_sessions),
                        ..ClientStats::default()
                    }),
                };
                self.clients.lock().unwrap().push(client.stats.clone());
                Ok(client)
            }
            Plan::Fail(err) => Err(err),
            Plan::Hang => std::future::pending().await,
        }
    }
}
