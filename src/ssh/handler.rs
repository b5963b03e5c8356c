//! russh client handler used for pooled connections.

use russh::{client, keys};
use tracing::debug;

/// Client handler for russh that accepts all host keys.
///
/// Equivalent to `StrictHostKeyChecking=no` in OpenSSH. Host key verification
/// against known_hosts is not performed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!("Accepting server host key {:?}", server_public_key.algorithm());
        Ok(true)
    }
}
