//! # Compute Configuration
//!
//! Defaults, overridden by `KR_COMPUTE_*` environment variables. Values that
//! do not parse are logged and ignored.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::domain::compute::GcdComputation;
use crate::service::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeConfig {
    /// `KR_COMPUTE_BIND`
    pub bind_addr: SocketAddr,
    /// `KR_COMPUTE_EXPONENT`
    pub exponent: u32,
    /// `KR_COMPUTE_CALLBACK_ATTEMPTS`
    pub callback_attempts: u32,
    /// `KR_COMPUTE_BACKOFF_MS`: delay before the second attempt; doubles
    /// after each further failure.
    pub base_backoff: Duration,
    /// `KR_COMPUTE_CALLBACK_TIMEOUT_SECS`
    pub callback_timeout: Duration,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            exponent: 65537,
            callback_attempts: 3,
            base_backoff: Duration::from_secs(1),
            callback_timeout: Duration::from_secs(30),
        }
    }
}

impl ComputeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        override_with(&lookup, "KR_COMPUTE_BIND", &mut config.bind_addr);
        override_with(&lookup, "KR_COMPUTE_EXPONENT", &mut config.exponent);
        override_with(
            &lookup,
            "KR_COMPUTE_CALLBACK_ATTEMPTS",
            &mut config.callback_attempts,
        );

        let mut backoff_ms = config.base_backoff.as_millis() as u64;
        override_with(&lookup, "KR_COMPUTE_BACKOFF_MS", &mut backoff_ms);
        config.base_backoff = Duration::from_millis(backoff_ms);

        let mut timeout_secs = config.callback_timeout.as_secs();
        override_with(&lookup, "KR_COMPUTE_CALLBACK_TIMEOUT_SECS", &mut timeout_secs);
        config.callback_timeout = Duration::from_secs(timeout_secs);

        if config.callback_attempts == 0 {
            warn!("KR_COMPUTE_CALLBACK_ATTEMPTS must be at least 1, using 1");
            config.callback_attempts = 1;
        }
        config
    }

    pub fn computation(&self) -> GcdComputation {
        GcdComputation::default().with_exponent(self.exponent)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.callback_attempts,
            base_backoff: self.base_backoff,
        }
    }
}

fn override_with<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable setting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> ComputeConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ComputeConfig::from_lookup(|key| map.get(key).cloned())
    }

    /// Test: no variables means defaults
    #[test]
    fn test_defaults() {
        let config = from_map(&[]);
        assert_eq!(config, ComputeConfig::default());
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.computation().exponent, 65537);
    }

    /// Test: every variable overrides its field
    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("KR_COMPUTE_BIND", "127.0.0.1:9000"),
            ("KR_COMPUTE_EXPONENT", "3"),
            ("KR_COMPUTE_CALLBACK_ATTEMPTS", "5"),
            ("KR_COMPUTE_BACKOFF_MS", "250"),
            ("KR_COMPUTE_CALLBACK_TIMEOUT_SECS", " 10 "),
        ]);
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.exponent, 3);
        assert_eq!(config.callback_attempts, 5);
        assert_eq!(config.base_backoff, Duration::from_millis(250));
        assert_eq!(config.callback_timeout, Duration::from_secs(10));
    }

    /// Test: bad values keep the default; zero attempts becomes one
    #[test]
    fn test_invalid_values() {
        let config = from_map(&[
            ("KR_COMPUTE_EXPONENT", "sixty-five"),
            ("KR_COMPUTE_CALLBACK_ATTEMPTS", "0"),
        ]);
        assert_eq!(config.exponent, 65537);
        assert_eq!(config.callback_attempts, 1);
    }
}
