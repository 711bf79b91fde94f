//! # Node Runtime
//!
//! Owns the marketplace service for the lifetime of the process: initial
//! resync, optional periodic resync, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use jb_marketplace_sync::{
    InMemoryLedger, Job, MarketplaceApi, MarketplaceResult, MarketplaceService, RetryPolicy,
    RetryingLedgerClient, ScoredApplication, SyncReport,
};

use crate::config::NodeConfig;

/// Ledger stack the node serves from.
pub type NodeLedger = RetryingLedgerClient<InMemoryLedger>;

/// One open job with its applications.
#[derive(Debug, Serialize)]
pub struct JobView {
    /// The job.
    #[serde(flatten)]
    pub job: Job,
    /// Applications in accept-index order.
    pub applications: Vec<ScoredApplication>,
}

/// Read model as printed by the binary.
#[derive(Debug, Serialize)]
pub struct ReadModelView {
    /// Resync that produced this view.
    pub report: SyncReport,
    /// Open jobs, ascending id.
    pub open_jobs: Vec<JobView>,
    /// Cached reputation scores.
    pub reputation_entries: usize,
}

/// The main node runtime.
pub struct NodeRuntime {
    service: MarketplaceService<NodeLedger>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    /// Wrap `ledger` in the read-retry decorator and build the service.
    pub fn new(config: &NodeConfig, ledger: InMemoryLedger) -> Self {
        let policy = RetryPolicy::from_config(&config.marketplace);
        let ledger = Arc::new(RetryingLedgerClient::new(ledger, policy));
        let service = MarketplaceService::new(ledger, config.marketplace.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            service,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Marketplace service.
    pub fn service(&self) -> &MarketplaceService<NodeLedger> {
        &self.service
    }

    /// Initial full resync.
    pub async fn start(&self) -> MarketplaceResult<ReadModelView> {
        info!(
            mode = ?self.service.config().acceptance_mode,
            policy = ?self.service.config().batch_failure_policy,
            "[jb-node] Starting"
        );
        let report = self.service.full_resync().await?;
        info!(
            jobs = report.jobs_retained,
            lists = report.application_lists,
            "[jb-node] Read model ready"
        );
        Ok(self.view(report))
    }

    /// Current cache contents, labelled with `report`.
    pub fn view(&self, report: SyncReport) -> ReadModelView {
        let snapshot = self.service.snapshot();
        let open_jobs = snapshot
            .open_jobs()
            .iter()
            .map(|job| JobView {
                job: job.clone(),
                applications: self.service.list_applications(job.id),
            })
            .collect();

        ReadModelView {
            report,
            open_jobs,
            reputation_entries: snapshot.reputation_entries(),
        }
    }

    /// Resync every `every` until [`NodeRuntime::shutdown`]. Failed runs
    /// are logged and leave the cache as it was.
    pub async fn run_resync_loop(&self, every: Duration) -> usize {
        let mut shutdown = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately; start() already synced.
        ticker.tick().await;

        let mut runs = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    runs += 1;
                    match self.service.full_resync().await {
                        Ok(report) => debug!(
                            run = runs,
                            jobs = report.jobs_retained,
                            failed = report.failed_items.len(),
                            "[jb-node] Periodic resync"
                        ),
                        Err(e) => warn!(run = runs, error = %e, "[jb-node] Periodic resync failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(runs, "[jb-node] Resync loop stopped");
        runs
    }

    /// Signal the resync loop to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{load_fixture, seed_ledger};
    use jb_marketplace_sync::{Address, JobId, MarketplaceConfig, MarketplaceError, QueryKind};

    fn runtime() -> NodeRuntime {
        let config = NodeConfig {
            marketplace: MarketplaceConfig::for_testing(),
            ..NodeConfig::default()
        };
        let ledger = seed_ledger(load_fixture(None).unwrap()).unwrap();
        NodeRuntime::new(&config, ledger)
    }

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[tokio::test]
    async fn test_start_projects_sample_ledger() {
        let runtime = runtime();
        let view = runtime.start().await.unwrap();

        let ids: Vec<JobId> = view.open_jobs.iter().map(|v| v.job.id).collect();
        assert_eq!(ids, vec![JobId::new(1), JobId::new(3)]);
        assert_eq!(view.report.jobs_scanned, 3);

        let logo = &view.open_jobs[0].applications;
        assert_eq!(logo.len(), 2);
        assert_eq!(logo[0].application.applicant, addr(0xA1));
        assert_eq!(logo[0].reputation, Some(3));
        assert_eq!(logo[1].reputation, Some(1));
        assert!(view.open_jobs[1].applications.is_empty());
    }

    #[tokio::test]
    async fn test_view_serializes_flat_job_fields() {
        let runtime = runtime();
        let view = runtime.start().await.unwrap();
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["open_jobs"][0]["title"], "Logo redesign");
        assert_eq!(json["open_jobs"][0]["applications"][1]["index"], 1);
        assert_eq!(json["report"]["scope"], "Full");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_loop_runs_until_shutdown() {
        let runtime = Arc::new(runtime());
        runtime.start().await.unwrap();
        let ledger = runtime.service().ledger().inner().clone();
        let before = ledger.query_count(QueryKind::JobCount);

        let looping = Arc::clone(&runtime);
        let handle = tokio::spawn(async move { looping.run_resync_loop(Duration::from_secs(10)).await });

        tokio::time::sleep(Duration::from_secs(25)).await;
        runtime.shutdown();
        let runs = handle.await.unwrap();

        assert_eq!(runs, 2);
        assert_eq!(ledger.query_count(QueryKind::JobCount), before + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_periodic_resync_keeps_serving() {
        let runtime = Arc::new(runtime());
        runtime.start().await.unwrap();
        runtime
            .service()
            .ledger()
            .inner()
            .fail_job_query(JobId::new(3), MarketplaceError::ConnectionError("reset".into()));

        let looping = Arc::clone(&runtime);
        let handle = tokio::spawn(async move { looping.run_resync_loop(Duration::from_secs(1)).await });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        runtime.shutdown();
        handle.await.unwrap();

        assert_eq!(runtime.service().list_open_jobs().len(), 2);
    }
}
