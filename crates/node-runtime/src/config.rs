//! # Node Configuration
//!
//! Runtime parameters of the `jobboard-node` binary plus the marketplace
//! settings it hands to the service.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use jb_marketplace_sync::MarketplaceConfig;

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Ledger fixture to seed from. The built-in sample is used when unset.
    pub fixture_path: Option<PathBuf>,
    /// Keep running and resync on this interval. One-shot when unset.
    pub resync_interval: Option<Duration>,
    /// Service settings.
    pub marketplace: MarketplaceConfig,
}

impl NodeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `JB_LEDGER_FIXTURE`: path to a JSON ledger fixture
    /// - `JB_RESYNC_INTERVAL_MS`: periodic resync interval; `0` or unset
    ///   prints one snapshot and exits
    ///
    /// Marketplace variables are read by [`MarketplaceConfig::from_env`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`NodeConfig::from_env`] with an explicit lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fixture_path = lookup("JB_LEDGER_FIXTURE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let resync_interval = lookup("JB_RESYNC_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            fixture_path,
            resync_interval,
            marketplace: MarketplaceConfig::from_lookup(lookup),
        }
    }
}
