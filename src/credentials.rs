//! Credentials handed to the dialer.
//!
//! The pool itself only reads [`Credentials::username`] (through the default key
//! deriver); the authentication methods are consumed by the dialer.

use std::fmt;
use std::path::PathBuf;

/// One way of proving identity to the server.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Password authentication.
    Password(String),
    /// Public key authentication with a passphrase-less private key file.
    KeyFile(PathBuf),
    /// Every identity offered by the agent behind `SSH_AUTH_SOCK`.
    Agent,
}

impl AuthMethod {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Password(_) => "password",
            AuthMethod::KeyFile(_) => "key",
            AuthMethod::Agent => "agent",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(***)"),
            AuthMethod::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            AuthMethod::Agent => f.write_str("Agent"),
        }
    }
}

/// Who to log in as and how.
///
/// Methods are tried in the order they were added. With no explicit method the
/// SSH agent is used.
///
/// ```ignore
/// let creds = Credentials::new("deploy")
///     .with_password("secret")
///     .with_key("/home/deploy/.ssh/id_ed25519");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    methods: Vec<AuthMethod>,
}

impl Credentials {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            methods: Vec::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.methods.push(AuthMethod::Password(password.into()));
        self
    }

    pub fn with_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.methods.push(AuthMethod::KeyFile(key_path.into()));
        self
    }

    pub fn with_agent(mut self) -> Self {
        self.methods.push(AuthMethod::Agent);
        self
    }

    /// The methods to try, falling back to the agent when none were configured.
    pub fn methods(&self) -> Vec<AuthMethod> {
        if self.methods.is_empty() {
            vec![AuthMethod::Agent]
        } else {
            self.methods.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_methods_keep_insertion_order() {
        let creds = Credentials::new("testuser")
            .with_password("foo")
            .with_key("/path/to/key")
            .with_agent();
        let names: Vec<_> = creds.methods().iter().map(AuthMethod::name).collect();
        assert_eq!(names, vec!["password", "key", "agent"]);
    }

    #[test]
    fn test_no_methods_falls_back_to_agent() {
        let creds = Credentials::new("testuser");
        assert_eq!(creds.methods(), vec![AuthMethod::Agent]);
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::new("testuser").with_password("hunter2");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("testuser"));
    }
}
