//! # Job Board Node
//!
//! Seeds a ledger, rebuilds the marketplace read model from it and prints
//! the result as JSON.
//!
//! With `JB_RESYNC_INTERVAL_MS` set the node keeps the read model fresh
//! until Ctrl+C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use jb_marketplace_sync::MarketplaceApi;
use jb_telemetry::{init_telemetry, TelemetryConfig};
use node_runtime::{load_fixture, seed_ledger, NodeConfig, NodeRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::for_service("jobboard-node"))
        .context("failed to initialize telemetry")?;

    let config = NodeConfig::from_env();
    match &config.fixture_path {
        Some(path) => info!(path = %path.display(), "[jb-node] Loading ledger fixture"),
        None => info!("[jb-node] Using built-in sample ledger"),
    }
    let fixture = load_fixture(config.fixture_path.as_deref())?;
    let ledger = seed_ledger(fixture)?;

    let runtime = Arc::new(NodeRuntime::new(&config, ledger));
    let view = runtime.start().await.context("initial resync failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&view).context("failed to encode read model")?
    );

    let Some(every) = config.resync_interval else {
        return Ok(());
    };

    let looping = Arc::clone(&runtime);
    let resync = tokio::spawn(async move { looping.run_resync_loop(every).await });

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    runtime.shutdown();
    resync.await.context("resync loop panicked")?;

    info!(
        open_jobs = runtime.service().list_open_jobs().len(),
        "[jb-node] Shut down"
    );
    Ok(())
}
