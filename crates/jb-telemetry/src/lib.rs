//! # JB Telemetry
//!
//! Logging bootstrap for job board binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jb_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::for_service("jobboard-node"))?;
//!     // Logs from every crate now go through the configured subscriber
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `JB_LOG_LEVEL` / `RUST_LOG` | `info` | Filter directive |
//! | `JB_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `JB_CONSOLE_OUTPUT` | `true` | Emit logs at all |
//! | `JB_SERVICE_NAME` | `jobboard` | Service name |

#![warn(missing_docs)]

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::env_filter;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Log filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// Global subscriber could not be installed.
    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Install the global tracing subscriber described by `config`.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_setup::init_tracing(config)?;
    tracing::info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}
