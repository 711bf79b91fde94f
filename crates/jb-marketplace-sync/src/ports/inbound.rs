//! # Inbound Ports
//!
//! What the presentation layer can ask of the marketplace.

use async_trait::async_trait;

use crate::domain::{
    AcceptanceOutcome, Job, JobId, JobPosting, MarketplaceResult, PartialFailure,
    ScoredApplication, SyncReport,
};

/// Marketplace API - inbound port.
///
/// Reads are served from the cache snapshot and never touch the ledger.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Active jobs in ascending id order.
    fn list_open_jobs(&self) -> Vec<Job>;

    /// Cached applications of a job with each applicant's reputation.
    fn list_applications(&self, job_id: JobId) -> Vec<ScoredApplication>;

    /// Post a job. On finality the job is visible in `list_open_jobs`
    /// immediately, ahead of the next resync.
    async fn post_job(&self, posting: JobPosting) -> MarketplaceResult<Job>;

    /// Apply to a job as the client account.
    async fn apply(&self, job_id: JobId, cover_letter: String) -> MarketplaceResult<()>;

    /// Accept application `index` of `job_id`.
    ///
    /// `Ok(Partial(..))` is a normal outcome in decoupled mode: payment is
    /// final, reputation is not.
    async fn accept_application(
        &self,
        job_id: JobId,
        index: usize,
    ) -> MarketplaceResult<AcceptanceOutcome>;

    /// Rebuild jobs, applications and missing reputations from the ledger.
    async fn full_resync(&self) -> MarketplaceResult<SyncReport>;

    /// Retry the reputation step of a `Partial` acceptance. Submits only
    /// what the ledger does not show yet and returns it (0 if nothing was
    /// owed any more).
    async fn reconcile_reputation(&self, partial: &PartialFailure) -> MarketplaceResult<u64>;
}
