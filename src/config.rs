//! Configuration resolution for the connection pool.
//!
//! Every tunable is resolved with a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! Environment values that fail to parse fall back to the default.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_POOL_TIMEOUT_MS` | 0 (unbounded) | Overall `open` timeout in milliseconds |
//! | `SSH_CONNECT_TIMEOUT` | 30s | Dial and handshake timeout in seconds |
//! | `SSH_MAX_RETRIES` | 3 | Redial attempts made by `open_with_retry` |
//! | `SSH_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |
//! | `SSH_COMPRESSION` | true | Enable zlib compression |

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default overall open timeout in milliseconds (0 means no deadline)
pub(crate) const DEFAULT_POOL_TIMEOUT_MS: u64 = 0;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default maximum retry attempts for `open_with_retry`
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default retry delay in milliseconds
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Upper bound for the exponential backoff delay
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

pub(crate) const POOL_TIMEOUT_ENV_VAR: &str = "SSH_POOL_TIMEOUT_MS";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "SSH_MAX_RETRIES";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_RETRY_DELAY_MS";
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";

/// Resolve a numeric setting with priority: parameter -> env var -> default
fn resolve<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

/// Resolve the overall open timeout. Zero means no deadline.
pub(crate) fn resolve_pool_timeout(timeout_ms: Option<u64>) -> Option<Duration> {
    let ms = resolve(timeout_ms, POOL_TIMEOUT_ENV_VAR, DEFAULT_POOL_TIMEOUT_MS);
    (ms > 0).then(|| Duration::from_millis(ms))
}

pub(crate) fn resolve_connect_timeout(timeout_secs: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        timeout_secs,
        CONNECT_TIMEOUT_ENV_VAR,
        DEFAULT_CONNECT_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_max_retries(max_retries: Option<u32>) -> u32 {
    resolve(max_retries, MAX_RETRIES_ENV_VAR, DEFAULT_MAX_RETRIES)
}

pub(crate) fn resolve_retry_delay(delay_ms: Option<u64>) -> Duration {
    Duration::from_millis(resolve(delay_ms, RETRY_DELAY_MS_ENV_VAR, DEFAULT_RETRY_DELAY_MS))
}

/// Resolve the compression setting: only `true` (any case) or `1` enable it from the environment.
pub(crate) fn resolve_compression(compress: Option<bool>) -> bool {
    if let Some(compress) = compress {
        return compress;
    }

    match env::var(COMPRESSION_ENV_VAR) {
        Ok(raw) => raw.eq_ignore_ascii_case("true") || raw == "1",
        Err(_) => true,
    }
}

/// Resolved settings for a [`Pool`](crate::Pool) and its default dialer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Overall budget for a single `open` call; `None` never times out.
    pub timeout: Option<Duration>,
    /// Bound on TCP connect plus SSH handshake and authentication.
    pub connect_timeout: Duration,
    /// Whether to offer zlib compression during key exchange.
    pub compress: bool,
    /// Redial attempts made by `open_with_retry` after the first failure.
    pub max_retries: u32,
    /// Initial backoff delay for `open_with_retry`.
    pub retry_delay: Duration,
}

impl PoolConfig {
    /// Build a configuration purely from environment variables and defaults.
    pub fn from_env() -> Self {
        Self::resolve(None, None, None, None, None)
    }

    /// Build a configuration, preferring explicit values over the environment.
    pub fn resolve(
        timeout_ms: Option<u64>,
        connect_timeout_secs: Option<u64>,
        compress: Option<bool>,
        max_retries: Option<u32>,
        retry_delay_ms: Option<u64>,
    ) -> Self {
        Self {
            timeout: resolve_pool_timeout(timeout_ms),
            connect_timeout: resolve_connect_timeout(connect_timeout_secs),
            compress: resolve_compression(compress),
            max_retries: resolve_max_retries(max_retries),
            retry_delay: resolve_retry_delay(retry_delay_ms),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            compress: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // Serializes the tests that touch process environment
    static ENV_TEST_MUTEX: once_cell::sync::Lazy<StdMutex<()>> =
        once_cell::sync::Lazy::new(|| StdMutex::new(()));

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn set_env(key: &str, value: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::set_var(key, value) };
    }

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn remove_env(key: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::remove_var(key) };
    }

    mod pool_timeout {
        use super::*;

        #[test]
        fn test_zero_means_unbounded() {
            assert_eq!(resolve_pool_timeout(Some(0)), None);
        }

        #[test]
        fn test_param_in_milliseconds() {
            assert_eq!(
                resolve_pool_timeout(Some(100)),
                Some(Duration::from_millis(100))
            );
        }

        #[test]
        fn test_uses_env_var_when_no_param() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { set_env(POOL_TIMEOUT_ENV_VAR, "250") };
            let result = resolve_pool_timeout(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { remove_env(POOL_TIMEOUT_ENV_VAR) };
            assert_eq!(result, Some(Duration::from_millis(250)));
        }

        #[test]
        fn test_default_is_unbounded() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { remove_env(POOL_TIMEOUT_ENV_VAR) };
            assert_eq!(resolve_pool_timeout(None), None);
        }
    }

    mod connect_timeout {
        use super::*;

        #[test]
        fn test_param_takes_priority_over_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { set_env(CONNECT_TIMEOUT_ENV_VAR, "120") };
            let result = resolve_connect_timeout(Some(45));
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { remove_env(CONNECT_TIMEOUT_ENV_VAR) };
            assert_eq!(result, Duration::from_secs(45));
        }

        #[test]
        fn test_ignores_invalid_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { set_env(CONNECT_TIMEOUT_ENV_VAR, "-10") };
            let result = resolve_connect_timeout(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { remove_env(CONNECT_TIMEOUT_ENV_VAR) };
            assert_eq!(result, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
        }
    }

    mod retries {
        use super::*;

        #[test]
        fn test_zero_retries_is_valid() {
            assert_eq!(resolve_max_retries(Some(0)), 0);
        }

        #[test]
        fn test_uses_env_var_when_no_param() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(MAX_RETRIES_ENV_VAR, "7");
                set_env(RETRY_DELAY_MS_ENV_VAR, "3000");
            }
            let retries = resolve_max_retries(None);
            let delay = resolve_retry_delay(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(MAX_RETRIES_ENV_VAR);
                remove_env(RETRY_DELAY_MS_ENV_VAR);
            }
            assert_eq!(retries, 7);
            assert_eq!(delay, Duration::from_millis(3000));
        }
    }

    mod compression {
        use super::*;

        #[test]
        fn test_param_wins() {
            assert!(!resolve_compression(Some(false)));
            assert!(resolve_compression(Some(true)));
        }

        #[test]
        fn test_env_values() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            let mut seen = Vec::new();
            for raw in ["TrUe", "1", "0", "yes"] {
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe { set_env(COMPRESSION_ENV_VAR, raw) };
                seen.push(resolve_compression(None));
            }
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { remove_env(COMPRESSION_ENV_VAR) };
            assert_eq!(seen, vec![true, true, false, false]);
        }

        #[test]
        fn test_default_is_true() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe { remove_env(COMPRESSION_ENV_VAR) };
            assert!(resolve_compression(None));
        }
    }

    mod pool_config {
        use super::*;

        #[test]
        fn test_explicit_values_override_everything() {
            let config = PoolConfig::resolve(Some(100), Some(5), Some(false), Some(1), Some(20));
            assert_eq!(config.timeout, Some(Duration::from_millis(100)));
            assert_eq!(config.connect_timeout, Duration::from_secs(5));
            assert!(!config.compress);
            assert_eq!(config.max_retries, 1);
            assert_eq!(config.retry_delay, Duration::from_millis(20));
        }

        #[test]
        fn test_default_matches_constants() {
            let config = PoolConfig::default();
            assert_eq!(config.timeout, None);
            assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
            assert!(MAX_RETRY_DELAY >= config.retry_delay);
        }
    }
}
