//! # Synchronizer
//!
//! Reconciles the read-model cache against the ledger. Every cache write in
//! the crate goes through here.
//!
//! ## Cost
//!
//! `full_resync_jobs` reads every job id `1..=count` on each run. The scan
//! is linear in the number of jobs ever posted and is kept that way: ids are
//! dense and the index order is the id order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::batch::{run_batch, BatchOutcome};
use super::cache::{CacheSnapshot, ReadModelCache};
use crate::config::BatchFailurePolicy;
use crate::domain::{
    invariant_application_list, invariant_job_id_matches, Address, Application, Job, JobId,
    MarketplaceError, MarketplaceResult, SyncReport, SyncScope,
};
use crate::metrics;
use crate::ports::LedgerClient;

/// Sole writer of the [`ReadModelCache`].
pub struct Synchronizer<L: LedgerClient> {
    ledger: Arc<L>,
    cache: Arc<ReadModelCache>,
    policy: BatchFailurePolicy,
}

impl<L: LedgerClient> Synchronizer<L> {
    /// Create a synchronizer over a shared cache.
    pub fn new(ledger: Arc<L>, cache: Arc<ReadModelCache>, policy: BatchFailurePolicy) -> Self {
        Self {
            ledger,
            cache,
            policy,
        }
    }

    /// Current cache snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.cache.snapshot()
    }

    /// Batch failure policy in force.
    pub fn policy(&self) -> BatchFailurePolicy {
        self.policy
    }

    /// Rebuild the open-jobs index from the ledger.
    ///
    /// Reads the job count, then every job in id order, keeps the active
    /// ones and swaps the index in one write. Provisional jobs are replaced
    /// by what the ledger reports.
    ///
    /// # Errors
    /// Under `FailFast`, the first read error; the cache is untouched.
    pub async fn full_resync_jobs(&self) -> MarketplaceResult<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::new(SyncScope::Jobs);

        let count = self
            .ledger
            .query_job_count()
            .await
            .map_err(|e| self.aborted(SyncScope::Jobs, e))?;
        metrics::record_ledger_reads("job_count", 1);

        let ledger = &self.ledger;
        let batch = run_batch(JobId::range_to(count), self.policy, |id| async move {
            let job = ledger.query_job(id).await?;
            invariant_job_id_matches(id, &job)?;
            Ok::<_, MarketplaceError>(job)
        })
        .await
        .map_err(|e| self.aborted(SyncScope::Jobs, e))?;
        metrics::record_ledger_reads("job", (batch.succeeded.len() + batch.failed.len()) as u64);

        let failed_ids: Vec<JobId> = batch.failed.iter().map(|(id, _)| *id).collect();
        report.failed_items = batch.failure_descriptions("job");
        let fetched: Vec<Job> = batch
            .succeeded
            .into_iter()
            .map(|(_, job)| job)
            .filter(|job| job.is_active)
            .collect();

        report.jobs_retained = self.cache.commit(|snapshot| {
            let mut jobs = fetched;
            for id in &failed_ids {
                if let Some(previous) = snapshot.job(*id) {
                    jobs.push(previous.clone());
                }
            }
            jobs.sort_by_key(|job| job.id);
            let retained = jobs.len();
            snapshot.replace_jobs(jobs, count);
            retained
        });

        report.jobs_scanned = count;
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.finished(&report);
        Ok(report)
    }

    /// Refetch the application list of every indexed job and fetch the
    /// reputation of applicants not yet cached.
    ///
    /// Lists are replaced, never merged. A cached reputation is never
    /// refetched by this path.
    ///
    /// # Errors
    /// Under `FailFast`, the first read error; the cache is untouched.
    pub async fn resync_applications(&self) -> MarketplaceResult<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::new(SyncScope::Applications);
        let before = self.cache.snapshot();
        let job_ids: Vec<JobId> = before.open_jobs().iter().map(|job| job.id).collect();

        let lists = self
            .fetch_application_lists(job_ids)
            .await
            .map_err(|e| self.aborted(SyncScope::Applications, e))?;
        let reputations = self
            .fetch_missing_reputations(&before, lists.succeeded.iter().map(|(_, list)| list))
            .await
            .map_err(|e| self.aborted(SyncScope::Applications, e))?;

        report.failed_items = lists.failure_descriptions("applications of job");
        report
            .failed_items
            .extend(reputations.failure_descriptions("reputation of"));

        let keep: Vec<JobId> = lists.failed.iter().map(|(id, _)| *id).collect();
        let fetched: BTreeMap<JobId, Vec<Application>> = lists.succeeded.into_iter().collect();
        let (stored, inserted, retained) = self.cache.commit(|snapshot| {
            let stored = snapshot.replace_all_applications(fetched, &keep);
            let inserted = insert_reputations(snapshot, reputations.succeeded);
            (stored, inserted, snapshot.open_jobs().len())
        });
        report.application_lists = stored;
        report.reputations_fetched = inserted;
        report.jobs_retained = retained;
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.finished(&report);
        Ok(report)
    }

    /// Refetch one job's application list and any uncached applicant
    /// reputation.
    ///
    /// The list is stored only if the job is still in the open index when
    /// the write lands.
    pub async fn resync_job_applications(&self, job_id: JobId) -> MarketplaceResult<SyncReport> {
        let started = Instant::now();
        let scope = SyncScope::JobApplications(job_id);
        let mut report = SyncReport::new(scope);
        let before = self.cache.snapshot();

        let lists = self
            .fetch_application_lists([job_id])
            .await
            .map_err(|e| self.aborted(scope, e))?;
        if let Some((_, err)) = lists.failed.into_iter().next() {
            return Err(self.aborted(scope, err));
        }
        let reputations = self
            .fetch_missing_reputations(&before, lists.succeeded.iter().map(|(_, list)| list))
            .await
            .map_err(|e| self.aborted(scope, e))?;
        report.failed_items = reputations.failure_descriptions("reputation of");

        let list = lists
            .succeeded
            .into_iter()
            .next()
            .map(|(_, list)| list)
            .unwrap_or_default();
        let (stored, inserted) = self.cache.commit(|snapshot| {
            let stored = snapshot.job(job_id).is_some();
            if stored {
                snapshot.replace_job_applications(job_id, list);
            }
            (stored, insert_reputations(snapshot, reputations.succeeded))
        });
        if !stored {
            debug!(job_id = %job_id, "[jb-sync] Job not indexed, application list not stored");
        }

        report.application_lists = usize::from(stored);
        report.reputations_fetched = inserted;
        report.jobs_retained = before.open_jobs().len();
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.finished(&report);
        Ok(report)
    }

    /// Refetch one address's reputation and overwrite the cached score.
    pub async fn refresh_reputation(&self, address: Address) -> MarketplaceResult<u64> {
        let score = self.ledger.query_reputation(address).await?;
        metrics::record_ledger_reads("reputation", 1);
        self.cache
            .commit(|snapshot| snapshot.set_reputation(address, score));
        debug!(address = %address, score, "[jb-sync] Reputation refreshed");
        Ok(score)
    }

    /// Drop a job from the open index after its acceptance is final.
    pub fn deactivate_job(&self, job_id: JobId) -> bool {
        let removed = self.cache.commit(|snapshot| snapshot.remove_job(job_id));
        debug!(job_id = %job_id, removed, "[jb-sync] Job deactivated");
        removed
    }

    /// Insert a locally synthesized job into the open index.
    pub fn record_provisional_job(&self, job: Job) {
        let job_id = job.id;
        self.cache
            .commit(|snapshot| snapshot.upsert_provisional_job(job));
        debug!(job_id = %job_id, "[jb-sync] Provisional job recorded");
    }

    // -------------------------------------------------------------------------
    // Fetch helpers (no cache writes)
    // -------------------------------------------------------------------------

    async fn fetch_application_lists(
        &self,
        job_ids: impl IntoIterator<Item = JobId>,
    ) -> MarketplaceResult<BatchOutcome<JobId, Vec<Application>>> {
        let ledger = &self.ledger;
        let batch = run_batch(job_ids, self.policy, |job_id| async move {
            let list = ledger.query_applications(job_id).await?;
            invariant_application_list(job_id, &list)?;
            Ok::<_, MarketplaceError>(list)
        })
        .await?;
        metrics::record_ledger_reads(
            "applications",
            (batch.succeeded.len() + batch.failed.len()) as u64,
        );
        Ok(batch)
    }

    async fn fetch_missing_reputations<'a>(
        &self,
        snapshot: &CacheSnapshot,
        lists: impl Iterator<Item = &'a Vec<Application>>,
    ) -> MarketplaceResult<BatchOutcome<Address, u64>> {
        let missing: BTreeSet<Address> = lists
            .flatten()
            .map(|application| application.applicant)
            .filter(|applicant| snapshot.reputation(applicant).is_none())
            .collect();

        let ledger = &self.ledger;
        let batch = run_batch(missing, self.policy, |address| ledger.query_reputation(address)).await?;
        metrics::record_ledger_reads(
            "reputation",
            (batch.succeeded.len() + batch.failed.len()) as u64,
        );
        Ok(batch)
    }

    fn aborted(&self, scope: SyncScope, err: MarketplaceError) -> MarketplaceError {
        error!(
            scope = ?scope,
            error = %err,
            "[jb-sync] Resync aborted, cache left unchanged"
        );
        metrics::record_resync(scope_label(scope), "aborted");
        err
    }

    fn finished(&self, report: &SyncReport) {
        if report.is_complete() {
            info!(
                scope = ?report.scope,
                jobs_scanned = report.jobs_scanned,
                jobs_retained = report.jobs_retained,
                application_lists = report.application_lists,
                reputations_fetched = report.reputations_fetched,
                duration_ms = report.duration_ms,
                "[jb-sync] Resync complete"
            );
            metrics::record_resync(scope_label(report.scope), "ok");
        } else {
            warn!(
                scope = ?report.scope,
                failed = report.failed_items.len(),
                first_failure = %report.failed_items[0],
                "[jb-sync] Resync committed with skipped items"
            );
            metrics::record_resync(scope_label(report.scope), "partial");
        }
    }
}

fn insert_reputations(snapshot: &mut CacheSnapshot, scores: Vec<(Address, u64)>) -> usize {
    scores
        .into_iter()
        .filter(|(address, score)| snapshot.insert_reputation_if_absent(*address, *score))
        .count()
}

fn scope_label(scope: SyncScope) -> &'static str {
    match scope {
        SyncScope::Jobs => "jobs",
        SyncScope::Applications => "applications",
        SyncScope::JobApplications(_) => "job_applications",
        SyncScope::Full => "full",
    }
}
