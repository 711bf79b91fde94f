//! # Marketplace Service
//!
//! Wires the cache, synchronizer, optimistic layer and accept workflow
//! behind [`MarketplaceApi`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::cache::{CacheSnapshot, ReadModelCache};
use super::optimistic::OptimisticLayer;
use super::synchronizer::Synchronizer;
use super::workflow::AcceptanceWorkflow;
use crate::config::MarketplaceConfig;
use crate::domain::{
    invariant_not_self_application, AcceptanceOutcome, Job, JobId, JobPosting, MarketplaceResult,
    PartialFailure, ScoredApplication, SyncReport, SyncScope,
};
use crate::ports::{LedgerClient, MarketplaceApi};

/// Marketplace service - implements the inbound API over a ledger client.
pub struct MarketplaceService<L: LedgerClient> {
    /// Configuration.
    config: MarketplaceConfig,
    /// Ledger client.
    ledger: Arc<L>,
    /// Sole cache writer.
    synchronizer: Arc<Synchronizer<L>>,
    /// Post-finality updates.
    optimistic: OptimisticLayer<L>,
    /// Accept engine.
    workflow: AcceptanceWorkflow<L>,
}

impl<L: LedgerClient> MarketplaceService<L> {
    /// Create a service with an empty cache. Call `full_resync` to load it.
    pub fn new(ledger: Arc<L>, config: MarketplaceConfig) -> Self {
        let cache = Arc::new(ReadModelCache::new());
        let synchronizer = Arc::new(Synchronizer::new(
            Arc::clone(&ledger),
            cache,
            config.batch_failure_policy,
        ));
        let optimistic = OptimisticLayer::new(Arc::clone(&synchronizer));
        let workflow =
            AcceptanceWorkflow::new(Arc::clone(&ledger), Arc::clone(&synchronizer), config.clone());

        info!(
            mode = ?config.acceptance_mode,
            policy = ?config.batch_failure_policy,
            finality_timeout_ms = config.finality_timeout_ms,
            "[jb-sync] Marketplace service created"
        );

        Self {
            config,
            ledger,
            synchronizer,
            optimistic,
            workflow,
        }
    }

    /// Configuration in force.
    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    /// Current cache snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.synchronizer.snapshot()
    }

    /// Synchronizer, for targeted resyncs.
    pub fn synchronizer(&self) -> &Synchronizer<L> {
        &self.synchronizer
    }

    /// Ledger client.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

#[async_trait]
impl<L: LedgerClient> MarketplaceApi for MarketplaceService<L> {
    fn list_open_jobs(&self) -> Vec<Job> {
        self.snapshot().open_jobs().to_vec()
    }

    fn list_applications(&self, job_id: JobId) -> Vec<ScoredApplication> {
        self.snapshot().scored_applications(job_id)
    }

    async fn post_job(&self, posting: JobPosting) -> MarketplaceResult<Job> {
        posting.validate()?;
        let handle = self.ledger.submit_post_job(posting.clone()).await?;
        let job_id = handle
            .await_finality(self.config.finality_timeout())
            .await
            .inspect_err(|err| {
                if err.is_outcome_unknown() {
                    warn!(title = %posting.title, "[jb-sync] post_job outcome unknown, no job synthesized");
                }
            })?;
        Ok(self
            .optimistic
            .job_posted(job_id, self.ledger.account(), &posting))
    }

    async fn apply(&self, job_id: JobId, cover_letter: String) -> MarketplaceResult<()> {
        if let Some(job) = self.snapshot().job(job_id) {
            invariant_not_self_application(&job.employer, &self.ledger.account())?;
        }

        self.ledger
            .submit_apply(job_id, cover_letter)
            .await?
            .await_finality(self.config.finality_timeout())
            .await?;

        if let Err(err) = self.optimistic.application_submitted(job_id).await {
            warn!(
                job_id = %job_id,
                error = %err,
                "[jb-sync] Application final but list refresh failed"
            );
        }
        Ok(())
    }

    async fn accept_application(
        &self,
        job_id: JobId,
        index: usize,
    ) -> MarketplaceResult<AcceptanceOutcome> {
        self.workflow.accept(job_id, index).await
    }

    async fn full_resync(&self) -> MarketplaceResult<SyncReport> {
        let started = Instant::now();
        let jobs = self.synchronizer.full_resync_jobs().await?;
        let applications = self.synchronizer.resync_applications().await?;

        let mut report = jobs.merge(applications);
        report.scope = SyncScope::Full;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn reconcile_reputation(&self, partial: &PartialFailure) -> MarketplaceResult<u64> {
        self.workflow.reconcile_reputation(partial).await
    }
}
