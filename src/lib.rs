//! Shared SSH connections for concurrent callers.
//!
//! A [`Pool`] keeps at most one client connection per identity key (by default
//! network kind, address and username) and opens a fresh session on it for each
//! caller:
//!
//! - concurrent callers for the same key share a single in-flight dial
//! - dials for different keys proceed in parallel
//! - a connection whose session open fails is evicted, closed and redialed
//! - an optional timeout bounds every `open` call
//!
//! The SSH transport itself comes from a [`Dialer`]; [`RusshDialer`] is the
//! default, and tests or unusual transports can supply their own.
//!
//! ```rust,ignore
//! use ssh_pool::{Credentials, Pool};
//!
//! let pool = Pool::new().with_timeout(Duration::from_secs(10));
//! let creds = Credentials::new("deploy").with_key("/home/deploy/.ssh/id_ed25519");
//! let channel = pool.open("tcp", "10.0.0.5:22", &creds).await?;
//! let output = ssh_pool::ssh::run_command(channel, "uptime", Duration::from_secs(30)).await?;
//! ```
//!
//! Modules:
//!
//! - `config`: parameter / environment / default resolution
//! - `error`: [`PoolError`] and retry classification
//! - `key`: identity key derivation
//! - `dial`: the [`Dialer`] and [`SessionClient`] capabilities
//! - `conn`: pooled connection entries
//! - `pool`: the pool and the session acquisition loop
//! - `ssh`: russh transport, authentication and command execution

#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod conn;
pub mod credentials;
pub mod dial;
pub mod error;
pub mod key;
pub mod pool;
pub mod ssh;

#[cfg(test)]
pub(crate) mod testing;

use once_cell::sync::Lazy;

pub use config::PoolConfig;
pub use conn::{ConnInfo, ConnState, PooledConn};
pub use credentials::{AuthMethod, Credentials};
pub use dial::{Dialer, SessionClient};
pub use error::PoolError;
pub use key::{AddrUserKey, KeyDeriver, addr_user_key};
pub use pool::{Pool, SessionOf};
pub use ssh::{RusshDialer, SshClient, SshSession};

/// Process-wide pool used by [`open`], configured from the environment on first use.
pub static DEFAULT_POOL: Lazy<Pool<RusshDialer>> = Lazy::new(Pool::new);

/// Open a new SSH session on the given server using [`DEFAULT_POOL`].
pub async fn open(
    network: &str,
    address: &str,
    credentials: &Credentials,
) -> Result<SshSession, PoolError> {
    DEFAULT_POOL.open(network, address, credentials).await
}
