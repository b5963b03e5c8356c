//! Identity keys: which callers may share a connection.

use crate::credentials::Credentials;

/// Derives the identity string that decides whether two `open` calls share a connection.
///
/// Two triples must map to the same key exactly when they may reuse one
/// connection. Implemented for any `Fn(&str, &str, &Credentials) -> String`, so a
/// closure can be passed to [`Pool::with_key`](crate::Pool::with_key).
pub trait KeyDeriver: Send + Sync {
    fn derive(&self, network: &str, address: &str, credentials: &Credentials) -> String;
}

impl<F> KeyDeriver for F
where
    F: Fn(&str, &str, &Credentials) -> String + Send + Sync,
{
    fn derive(&self, network: &str, address: &str, credentials: &Credentials) -> String {
        self(network, address, credentials)
    }
}

/// Default policy: one connection per network kind, address and username.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddrUserKey;

impl KeyDeriver for AddrUserKey {
    fn derive(&self, network: &str, address: &str, credentials: &Credentials) -> String {
        addr_user_key(network, address, credentials)
    }
}

/// Returns a distinct string for any unique combination of network, address and
/// username. Each field is quoted and escaped, so embedded spaces or quotes cannot
/// make two different triples collide.
pub fn addr_user_key(network: &str, address: &str, credentials: &Credentials) -> String {
    format!("{:?} {:?} {:?}", network, address, credentials.username)
}
