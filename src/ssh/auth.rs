//! Authentication of a freshly handshaken connection.
//!
//! Methods from [`Credentials::methods`] are tried in order; the first success
//! wins. When every method fails, the last failure is reported as
//! [`PoolError::Auth`], which is never retried.

use std::path::Path;
use std::sync::Arc;

use russh::{client, keys};
use tracing::{debug, info};

use crate::credentials::{AuthMethod, Credentials};
use crate::error::PoolError;

use super::handler::SshClientHandler;

/// Authenticate `handle` as `credentials.username`.
///
/// # Arguments
///
/// * `handle` - Client handle that has completed the SSH handshake
/// * `credentials` - Username and the ordered authentication methods to try
///
/// # Errors
///
/// Returns [`PoolError::Auth`] carrying the last method's failure when no method
/// succeeds, including when the server cleanly rejects every method.
pub(crate) async fn authenticate(
    handle: &mut client::Handle<SshClientHandler>,
    credentials: &Credentials,
) -> Result<(), PoolError> {
    let mut last_error = None;

    for method in credentials.methods() {
        debug!("Trying authentication method: {}", method.name());

        match try_method(handle, &credentials.username, &method).await {
            Ok(true) => {
                debug!("Authentication succeeded with method: {}", method.name());
                return Ok(());
            }
            Ok(false) => {
                debug!("Authentication rejected for method: {}", method.name());
                last_error = Some(format!("{} authentication rejected", method.name()));
            }
            Err(e) => {
                debug!("Authentication error with method {}: {}", method.name(), e);
                last_error = Some(e);
            }
        }
    }

    Err(PoolError::Auth(last_error.unwrap_or_else(|| {
        "all authentication methods failed".to_string()
    })))
}

async fn try_method(
    handle: &mut client::Handle<SshClientHandler>,
    username: &str,
    method: &AuthMethod,
) -> Result<bool, String> {
    match method {
        AuthMethod::Password(password) => handle
            .authenticate_password(username, password.as_str())
            .await
            .map(|result| result.success())
            .map_err(|e| format!("Password authentication failed: {}", e)),
        AuthMethod::KeyFile(path) => key_file(handle, username, path).await,
        AuthMethod::Agent => agent(handle, username).await,
    }
}

async fn key_file(
    handle: &mut client::Handle<SshClientHandler>,
    username: &str,
    path: &Path,
) -> Result<bool, String> {
    let key_pair = keys::load_secret_key(path, None)
        .map_err(|e| format!("Failed to load private key from {:?}: {}", path, e))?;

    // For RSA keys, use the best supported hash algorithm
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .ok()
        .flatten()
        .flatten();

    let result = handle
        .authenticate_publickey(
            username,
            keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
        )
        .await
        .map_err(|e| format!("Key authentication failed: {}", e))?;

    Ok(result.success())
}

async fn agent(
    handle: &mut client::Handle<SshClientHandler>,
    username: &str,
) -> Result<bool, String> {
    let mut agent = keys::agent::client::AgentClient::connect_env()
        .await
        .map_err(|e| format!("Failed to connect to SSH agent: {}", e))?;

    let identities = agent
        .request_identities()
        .await
        .map_err(|e| format!("Failed to get identities from SSH agent: {}", e))?;

    if identities.is_empty() {
        return Err("No identities found in SSH agent".to_string());
    }

    for identity in identities {
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        match handle
            .authenticate_publickey_with(username, identity.clone(), hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => {
                info!("Authenticated {} with SSH agent", username);
                return Ok(true);
            }
            Ok(_) => debug!("Agent identity {:?} not accepted", identity.comment()),
            Err(e) => debug!("Agent authentication error: {}, trying next...", e),
        }
    }

    Ok(false)
}
