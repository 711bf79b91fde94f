//! # Marketplace Configuration
//!
//! Acceptance design, finality bound, batch failure policy and read retries.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{
    AcceptanceMode, MarketplaceError, DEFAULT_FINALITY_TIMEOUT_MS, DEFAULT_REPUTATION_DELTA,
};

/// How a batch resync treats a failed per-item fetch.
///
/// One policy per service instance; it applies to every batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchFailurePolicy {
    /// Abort the whole batch on the first error; the cache keeps its
    /// previous contents.
    #[default]
    FailFast,
    /// Skip the failed item, keep its previous cache entry, commit the rest.
    Isolate,
}

impl FromStr for BatchFailurePolicy {
    type Err = MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Ok(BatchFailurePolicy::FailFast),
            "isolate" => Ok(BatchFailurePolicy::Isolate),
            other => Err(MarketplaceError::InvalidInput(format!(
                "unknown batch failure policy {:?}",
                other
            ))),
        }
    }
}

/// Marketplace configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Atomic or decoupled acceptance.
    pub acceptance_mode: AcceptanceMode,

    /// Bound on every finality wait, in milliseconds.
    pub finality_timeout_ms: u64,

    /// Failure policy for batch resyncs.
    pub batch_failure_policy: BatchFailurePolicy,

    /// Reputation credited per accepted application.
    pub reputation_delta: u64,

    /// Extra attempts for a read that failed with a connection error.
    pub read_retry_attempts: u32,

    /// Initial backoff between read retries, in milliseconds. Doubles per
    /// attempt.
    pub read_retry_backoff_ms: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            acceptance_mode: AcceptanceMode::Atomic,
            finality_timeout_ms: DEFAULT_FINALITY_TIMEOUT_MS,
            batch_failure_policy: BatchFailurePolicy::FailFast,
            reputation_delta: DEFAULT_REPUTATION_DELTA,
            read_retry_attempts: 3,
            read_retry_backoff_ms: 200,
        }
    }
}

impl MarketplaceConfig {
    /// Create a config for testing (short timeouts, no retries).
    pub fn for_testing() -> Self {
        Self {
            finality_timeout_ms: 1_000,
            read_retry_attempts: 0,
            read_retry_backoff_ms: 10,
            ..Self::default()
        }
    }

    /// Same config with a different acceptance mode.
    pub fn with_mode(mut self, mode: AcceptanceMode) -> Self {
        self.acceptance_mode = mode;
        self
    }

    /// Same config with a different batch failure policy.
    pub fn with_policy(mut self, policy: BatchFailurePolicy) -> Self {
        self.batch_failure_policy = policy;
        self
    }

    /// Finality bound as a `Duration`.
    pub fn finality_timeout(&self) -> Duration {
        Duration::from_millis(self.finality_timeout_ms)
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `JB_ACCEPTANCE_MODE`: `atomic` | `decoupled` (default: atomic)
    /// - `JB_FINALITY_TIMEOUT_MS`: finality bound (default: 60000)
    /// - `JB_BATCH_POLICY`: `fail-fast` | `isolate` (default: fail-fast)
    /// - `JB_REPUTATION_DELTA`: increment per acceptance (default: 1)
    /// - `JB_READ_RETRY_ATTEMPTS`: read retries (default: 3)
    /// - `JB_READ_RETRY_BACKOFF_MS`: initial backoff (default: 200)
    ///
    /// Unset or unparsable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`MarketplaceConfig::from_env`] with an explicit lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.parse().ok())
        }

        let defaults = Self::default();
        Self {
            acceptance_mode: parsed(&lookup, "JB_ACCEPTANCE_MODE")
                .unwrap_or(defaults.acceptance_mode),
            finality_timeout_ms: parsed(&lookup, "JB_FINALITY_TIMEOUT_MS")
                .unwrap_or(defaults.finality_timeout_ms),
            batch_failure_policy: parsed(&lookup, "JB_BATCH_POLICY")
                .unwrap_or(defaults.batch_failure_policy),
            reputation_delta: parsed(&lookup, "JB_REPUTATION_DELTA")
                .unwrap_or(defaults.reputation_delta),
            read_retry_attempts: parsed(&lookup, "JB_READ_RETRY_ATTEMPTS")
                .unwrap_or(defaults.read_retry_attempts),
            read_retry_backoff_ms: parsed(&lookup, "JB_READ_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.read_retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = MarketplaceConfig::default();
        assert_eq!(config.acceptance_mode, AcceptanceMode::Atomic);
        assert_eq!(config.batch_failure_policy, BatchFailurePolicy::FailFast);
        assert_eq!(config.reputation_delta, 1);
        assert_eq!(config.finality_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_testing_config() {
        let config = MarketplaceConfig::for_testing();
        assert_eq!(config.read_retry_attempts, 0);
        assert_eq!(config.finality_timeout_ms, 1_000);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JB_ACCEPTANCE_MODE", "decoupled"),
            ("JB_BATCH_POLICY", "isolate"),
            ("JB_FINALITY_TIMEOUT_MS", "1500"),
        ]);
        let config = MarketplaceConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.acceptance_mode, AcceptanceMode::Decoupled);
        assert_eq!(config.batch_failure_policy, BatchFailurePolicy::Isolate);
        assert_eq!(config.finality_timeout_ms, 1500);
        assert_eq!(config.reputation_delta, 1);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = MarketplaceConfig::from_lookup(|k| match k {
            "JB_FINALITY_TIMEOUT_MS" => Some("soon".to_string()),
            "JB_ACCEPTANCE_MODE" => Some("both".to_string()),
            _ => None,
        });
        assert_eq!(config, MarketplaceConfig::default());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "fail-fast".parse::<BatchFailurePolicy>().unwrap(),
            BatchFailurePolicy::FailFast
        );
        assert_eq!(
            "ISOLATE".parse::<BatchFailurePolicy>().unwrap(),
            BatchFailurePolicy::Isolate
        );
        assert!("retry".parse::<BatchFailurePolicy>().is_err());
    }
}
