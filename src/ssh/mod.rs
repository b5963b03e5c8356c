//! russh-backed default dialer.
//!
//! ## Connection Lifecycle
//!
//! 1. **Transport**: open a TCP (`tcp`, `tcp4`, `tcp6`) or Unix socket (`unix`)
//!    stream. TCP addresses use `host:port`, defaulting to port 22.
//! 2. **Handshake**: run the SSH client handshake over that stream.
//! 3. **Authentication**: try the credential's methods in order (password, key
//!    file, agent).
//!
//! All three steps share one bound: the earlier of the pool's deadline and the
//! dialer's connect timeout.

mod auth;
mod exec;
mod handler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{Channel, Disconnect, client};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::config::{DEFAULT_CONNECT_TIMEOUT_SECS, resolve_compression};
use crate::credentials::Credentials;
use crate::dial::{Dialer, SessionClient, deadline_after};
use crate::error::PoolError;

pub use exec::{CommandOutput, run_command};
pub use handler::SshClientHandler;

/// Established russh client connection as stored in the pool.
pub type SshClient = client::Handle<SshClientHandler>;

/// Session handed out by a russh-backed pool.
pub type SshSession = Channel<client::Msg>;

/// Build russh client configuration for a pooled connection.
///
/// Creates an `Arc<client::Config>` with:
/// - No inactivity timeout, since pooled connections sit idle between sessions
/// - Keepalive interval of 30 seconds with max 3 keepalives, so a dead peer
///   surfaces as a session-open failure and the pool redials
/// - Compression preference based on `compress` (ZLIB if enabled, NONE if disabled)
///
/// # Arguments
///
/// * `compress` - Whether to offer zlib compression
///
/// # Examples
///
/// ```ignore
/// let config = build_client_config(false);
/// assert_eq!(config.inactivity_timeout, None);
/// ```
pub(crate) fn build_client_config(compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Parse a TCP address into host and port, defaulting to port 22.
///
/// Splits on the last colon so `[::1]:22` works; brackets around an IPv6 host
/// are removed.
///
/// # Returns
///
/// * `Ok((host, port))` - Parsed host string and port number
/// * `Err(PoolError::InvalidAddress)` - If the port is not a valid `u16`
pub(crate) fn parse_address(address: &str) -> Result<(String, u16), PoolError> {
    let Some((host, port_str)) = address.rsplit_once(':') else {
        return Ok((address.to_string(), 22));
    };

    let port = port_str
        .parse::<u16>()
        .map_err(|e| PoolError::InvalidAddress {
            address: address.to_string(),
            reason: format!("Invalid port number: {}", e),
        })?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    Ok((host.to_string(), port))
}

/// Default [`Dialer`]: TCP or Unix socket transport plus the russh handshake.
#[derive(Debug, Clone)]
pub struct RusshDialer {
    connect_timeout: Duration,
    compress: bool,
}

impl RusshDialer {
    pub fn new(connect_timeout: Duration, compress: bool) -> Self {
        Self {
            connect_timeout,
            compress,
        }
    }

    async fn connect(
        &self,
        network: &str,
        address: &str,
        credentials: &Credentials,
    ) -> Result<SshClient, PoolError> {
        let config = build_client_config(self.compress);

        let mut handle = match network {
            "tcp" | "tcp4" | "tcp6" => {
                let stream = dial_tcp(network, address).await?;
                handshake(config, stream).await?
            }
            #[cfg(unix)]
            "unix" => {
                let stream = tokio::net::UnixStream::connect(address)
                    .await
                    .map_err(|e| PoolError::Dial(e.to_string()))?;
                handshake(config, stream).await?
            }
            other => return Err(PoolError::UnsupportedNetwork(other.to_string())),
        };

        auth::authenticate(&mut handle, credentials).await?;
        Ok(handle)
    }
}

impl Default for RusshDialer {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            resolve_compression(None),
        )
    }
}

#[async_trait]
impl Dialer for RusshDialer {
    type Client = SshClient;

    async fn dial(
        &self,
        network: &str,
        address: &str,
        credentials: &Credentials,
        deadline: Option<Instant>,
    ) -> Result<SshClient, PoolError> {
        let limit = match (deadline, deadline_after(self.connect_timeout)) {
            (Some(deadline), Some(limit)) => Some(deadline.min(limit)),
            (deadline, limit) => deadline.or(limit),
        };

        let connect = self.connect(network, address, credentials);
        match limit {
            Some(limit) => timeout_at(limit, connect)
                .await
                .map_err(|_| PoolError::DialTimeout(address.to_string()))?,
            None => connect.await,
        }
    }
}

#[async_trait]
impl SessionClient for SshClient {
    type Session = SshSession;

    async fn open_session(&self) -> Result<SshSession, PoolError> {
        self.channel_open_session()
            .await
            .map_err(|e| PoolError::Session(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self
            .disconnect(Disconnect::ByApplication, "connection evicted from pool", "en")
            .await
        {
            debug!("Disconnect of evicted connection failed: {}", e);
        }
    }
}

async fn dial_tcp(network: &str, address: &str) -> Result<TcpStream, PoolError> {
    let (host, port) = parse_address(address)?;

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| PoolError::Dial(format!("Failed to resolve {}: {}", host, e)))?
        .filter(|addr| match network {
            "tcp4" => addr.is_ipv4(),
            "tcp6" => addr.is_ipv6(),
            _ => true,
        })
        .collect();

    if addrs.is_empty() {
        return Err(PoolError::Dial(format!(
            "no {} address found for {}",
            network, address
        )));
    }

    TcpStream::connect(&addrs[..])
        .await
        .map_err(|e| PoolError::Dial(e.to_string()))
}

async fn handshake<S>(config: Arc<client::Config>, stream: S) -> Result<SshClient, PoolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    client::connect_stream(config, stream, SshClientHandler)
        .await
        .map_err(|e| PoolError::Dial(format!("SSH handshake failed: {}", e)))
}
