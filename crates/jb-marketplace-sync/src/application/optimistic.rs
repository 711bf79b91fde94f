//! # Optimistic Update Layer
//!
//! Speculative cache entries written right after a submit reaches finality.
//!
//! - `post_job`: the job is synthesized from the submitted values and the
//!   id the ledger reported. It stays provisional until the next
//!   `full_resync_jobs` replaces it.
//! - `apply`: nothing is synthesized. The affected job's application list
//!   is refetched, since ordering and acceptance bits are only
//!   authoritative on the ledger.

use std::sync::Arc;
use tracing::debug;

use super::synchronizer::Synchronizer;
use crate::domain::{Address, Job, JobId, JobPosting, MarketplaceResult, SyncReport};
use crate::metrics;
use crate::ports::LedgerClient;

/// Applies post-finality updates through the [`Synchronizer`].
pub struct OptimisticLayer<L: LedgerClient> {
    synchronizer: Arc<Synchronizer<L>>,
}

impl<L: LedgerClient> OptimisticLayer<L> {
    /// Create the layer.
    pub fn new(synchronizer: Arc<Synchronizer<L>>) -> Self {
        Self { synchronizer }
    }

    /// A `post_job` mutation is final with id `job_id`.
    pub fn job_posted(&self, job_id: JobId, employer: Address, posting: &JobPosting) -> Job {
        let job = Job::synthesized(job_id, employer, posting);
        self.synchronizer.record_provisional_job(job.clone());
        metrics::record_provisional_job();
        debug!(job_id = %job_id, employer = %employer, "[jb-sync] Job synthesized");
        job
    }

    /// An `apply` mutation on `job_id` is final.
    pub async fn application_submitted(&self, job_id: JobId) -> MarketplaceResult<SyncReport> {
        self.synchronizer.resync_job_applications(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedger;
    use crate::application::cache::ReadModelCache;
    use crate::config::BatchFailurePolicy;
    use crate::domain::Amount;

    fn layer() -> (Arc<InMemoryLedger>, Arc<Synchronizer<InMemoryLedger>>, OptimisticLayer<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new(Address::from_bytes([0xE1; 20])));
        let sync = Arc::new(Synchronizer::new(
            Arc::clone(&ledger),
            Arc::new(ReadModelCache::new()),
            BatchFailurePolicy::FailFast,
        ));
        let layer = OptimisticLayer::new(Arc::clone(&sync));
        (ledger, sync, layer)
    }

    #[tokio::test]
    async fn test_synthesized_job_replaced_by_resync() {
        let (ledger, sync, layer) = layer();
        let employer = ledger.account();
        let posting = JobPosting::new("audit", "review the contract", Amount::new(50));

        let id = ledger.seed_job(employer, "audit", "review the contract", Amount::new(50), true);
        let job = layer.job_posted(id, employer, &posting);
        assert!(job.is_active);
        assert_eq!(sync.snapshot().open_jobs(), &[job.clone()]);
        assert!(sync.snapshot().sync_state().provisional_jobs.contains(&id));

        sync.full_resync_jobs().await.unwrap();
        let snapshot = sync.snapshot();
        assert_eq!(snapshot.open_jobs(), &[job]);
        assert!(snapshot.sync_state().provisional_jobs.is_empty());
    }

    #[tokio::test]
    async fn test_application_submitted_refetches_list() {
        let (ledger, sync, layer) = layer();
        let employer = ledger.account();
        let id = ledger.seed_job(employer, "audit", "review", Amount::new(50), true);
        sync.full_resync_jobs().await.unwrap();

        ledger
            .seed_application(id, Address::from_bytes([0xA1; 20]), "me")
            .unwrap();
        let report = layer.application_submitted(id).await.unwrap();
        assert_eq!(report.application_lists, 1);
        assert_eq!(sync.snapshot().applications(id).len(), 1);
    }
}
