//! # Accept-Application Workflow
//!
//! Drives an [`AcceptanceMachine`] against the ledger.
//!
//! ## Flow
//!
//! 1. Resolve the job (cache, then ledger) and the applicant at `index`.
//!    Decoupled mode also reads the applicant's score as the baseline a
//!    later retry aims at.
//! 2. Submit payment + acceptance + deactivation and await finality.
//!    Any error here is `Failed`: the cache is not touched and the error is
//!    returned as is. A timeout is reported as such, never as a rejection.
//! 3. Drop the job from the open index.
//! 4. Atomic: done. Decoupled: submit the reputation increment. If that
//!    fails the workflow ends `Partial` and returns `Ok(Partial(..))`.
//!
//! Two workflows never run against the same job at once; the second caller
//! gets `AcceptanceInProgress` instead of waiting.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::synchronizer::Synchronizer;
use crate::config::MarketplaceConfig;
use crate::domain::{
    AcceptanceEvent, AcceptanceMachine, AcceptanceMode, AcceptanceOutcome, Address, FailureKind,
    Job, JobId, MarketplaceError, MarketplaceResult, PartialFailure, PartialReason,
};
use crate::metrics;
use crate::ports::LedgerClient;

/// Accept-application engine.
pub struct AcceptanceWorkflow<L: LedgerClient> {
    ledger: Arc<L>,
    synchronizer: Arc<Synchronizer<L>>,
    config: MarketplaceConfig,
    in_flight: Mutex<HashSet<JobId>>,
}

/// Releases a job's in-flight slot on drop, including when the workflow
/// future is dropped mid-wait.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.job_id);
    }
}

impl<L: LedgerClient> AcceptanceWorkflow<L> {
    /// Create the engine.
    pub fn new(ledger: Arc<L>, synchronizer: Arc<Synchronizer<L>>, config: MarketplaceConfig) -> Self {
        Self {
            ledger,
            synchronizer,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Accepting mode.
    pub fn mode(&self) -> AcceptanceMode {
        self.config.acceptance_mode
    }

    /// Jobs with a workflow currently running.
    pub fn in_flight(&self) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = self.in_flight.lock().iter().copied().collect();
        jobs.sort();
        jobs
    }

    /// Accept application `index` of `job_id`.
    ///
    /// # Errors
    /// - `AcceptanceInProgress` if another workflow holds the job
    /// - `JobNotFound` / `ApplicationNotFound` before anything is submitted
    /// - the payment step's error verbatim (`ValidationRejected`, `Timeout`,
    ///   `ConnectionError`)
    pub async fn accept(&self, job_id: JobId, index: usize) -> MarketplaceResult<AcceptanceOutcome> {
        let _guard = self.claim(job_id)?;
        let mut machine = AcceptanceMachine::new(self.config.acceptance_mode);

        let result = self.run(&mut machine, job_id, index).await;
        let outcome = match &result {
            Ok(AcceptanceOutcome::Full) => "full",
            Ok(AcceptanceOutcome::Partial(_)) => "partial",
            Err(_) => "failed",
        };
        metrics::record_acceptance(mode_label(machine.mode()), outcome);
        info!(
            job_id = %job_id,
            index,
            mode = mode_label(machine.mode()),
            outcome,
            final_state = ?machine.state(),
            "[jb-workflow] Acceptance finished"
        );
        result
    }

    /// Retry the reputation step of a `Partial` outcome.
    ///
    /// Reads the applicant's current ledger score and submits only what is
    /// still missing to reach `partial.target_score()`. Returns the
    /// submitted delta; 0 when an earlier attempt already landed.
    ///
    /// Meant for use once the workflow that produced `partial` has returned.
    pub async fn reconcile_reputation(&self, partial: &PartialFailure) -> MarketplaceResult<u64> {
        let applicant = partial.applicant;
        let target = partial.target_score();
        let current = self.ledger.query_reputation(applicant).await?;
        let missing = target.saturating_sub(current);

        if missing > 0 {
            info!(
                job_id = %partial.job_id,
                applicant = %applicant,
                target,
                current,
                missing,
                "[jb-workflow] Submitting missing reputation"
            );
            self.ledger
                .submit_increase_reputation(applicant, missing)
                .await?
                .await_finality(self.config.finality_timeout())
                .await?;
        } else {
            debug!(applicant = %applicant, current, target, "[jb-workflow] Reputation already credited");
        }

        self.synchronizer.refresh_reputation(applicant).await?;
        Ok(missing)
    }

    // -------------------------------------------------------------------------
    // Steps
    // -------------------------------------------------------------------------

    fn claim(&self, job_id: JobId) -> MarketplaceResult<InFlightGuard<'_>> {
        if !self.in_flight.lock().insert(job_id) {
            warn!(job_id = %job_id, "[jb-workflow] Acceptance already in progress");
            return Err(MarketplaceError::AcceptanceInProgress(job_id));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            job_id,
        })
    }

    async fn run(
        &self,
        machine: &mut AcceptanceMachine,
        job_id: JobId,
        index: usize,
    ) -> MarketplaceResult<AcceptanceOutcome> {
        let (job, applicant) = match self.resolve(job_id, index).await {
            Ok(resolved) => resolved,
            Err(err) => return Err(self.fail(machine, job_id, err)),
        };
        // Score before payment; a retry after a partial outcome aims at
        // baseline + delta.
        let baseline = match machine.mode() {
            AcceptanceMode::Atomic => 0,
            AcceptanceMode::Decoupled => match self.ledger.query_reputation(applicant).await {
                Ok(score) => score,
                Err(err) => return Err(self.fail(machine, job_id, err)),
            },
        };

        let handle = match self
            .ledger
            .submit_accept_application(job_id, index, job.payment_amount)
            .await
        {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(machine, job_id, err)),
        };
        self.transition(machine, job_id, AcceptanceEvent::PaymentSubmitted)?;

        if let Err(err) = handle.await_finality(self.config.finality_timeout()).await {
            if err.is_outcome_unknown() {
                warn!(
                    job_id = %job_id,
                    index,
                    "[jb-workflow] Payment finality unknown, cache left as is until next resync"
                );
            }
            return Err(self.fail(machine, job_id, err));
        }
        self.transition(machine, job_id, AcceptanceEvent::PaymentFinalized)?;
        self.synchronizer.deactivate_job(job_id);

        match machine.mode() {
            AcceptanceMode::Atomic => {
                self.transition(machine, job_id, AcceptanceEvent::Completed)?;
                self.refresh_applicant(applicant).await;
                Ok(AcceptanceOutcome::Full)
            }
            AcceptanceMode::Decoupled => {
                self.credit_reputation(machine, job_id, applicant, baseline)
                    .await
            }
        }
    }

    /// Second phase of a decoupled acceptance. Payment is already final, so
    /// every error ends in `Partial`.
    async fn credit_reputation(
        &self,
        machine: &mut AcceptanceMachine,
        job_id: JobId,
        applicant: Address,
        baseline: u64,
    ) -> MarketplaceResult<AcceptanceOutcome> {
        let delta = self.config.reputation_delta;
        let result = match self.ledger.submit_increase_reputation(applicant, delta).await {
            Ok(handle) => {
                self.transition(machine, job_id, AcceptanceEvent::ReputationSubmitted)?;
                handle.await_finality(self.config.finality_timeout()).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.transition(machine, job_id, AcceptanceEvent::ReputationFinalized)?;
                self.refresh_applicant(applicant).await;
                self.transition(machine, job_id, AcceptanceEvent::Completed)?;
                Ok(AcceptanceOutcome::Full)
            }
            Err(err) => {
                let reason = PartialReason::from(&err);
                self.transition(
                    machine,
                    job_id,
                    AcceptanceEvent::ReputationFailed(reason.clone()),
                )?;
                let partial = PartialFailure {
                    job_id,
                    applicant,
                    pending_delta: delta,
                    baseline,
                    reason,
                };
                warn!(
                    job_id = %job_id,
                    applicant = %applicant,
                    error = %err,
                    "[jb-workflow] {}",
                    partial
                );
                Ok(AcceptanceOutcome::Partial(partial))
            }
        }
    }

    /// Job from the cache (or ledger) and the applicant at `index`.
    ///
    /// Application lists are append-only, so a cached entry at `index` is
    /// still the one the ledger holds.
    async fn resolve(&self, job_id: JobId, index: usize) -> MarketplaceResult<(Job, Address)> {
        let snapshot = self.synchronizer.snapshot();
        let job = match snapshot.job(job_id) {
            Some(job) => job.clone(),
            None => self.ledger.query_job(job_id).await?,
        };

        let applicant = match snapshot.applications(job_id).get(index) {
            Some(application) => application.applicant,
            None => self
                .ledger
                .query_applications(job_id)
                .await?
                .get(index)
                .map(|application| application.applicant)
                .ok_or(MarketplaceError::ApplicationNotFound { job_id, index })?,
        };
        Ok((job, applicant))
    }

    /// Cached score refresh after a confirmed increment. A failed read only
    /// leaves the old score until the next resync.
    async fn refresh_applicant(&self, applicant: Address) {
        if let Err(err) = self.synchronizer.refresh_reputation(applicant).await {
            warn!(
                applicant = %applicant,
                error = %err,
                "[jb-workflow] Reputation refresh failed, cached score is stale"
            );
        }
    }

    fn transition(
        &self,
        machine: &mut AcceptanceMachine,
        job_id: JobId,
        event: AcceptanceEvent,
    ) -> MarketplaceResult<()> {
        let from = machine.state().clone();
        let to = machine.process_event(event)?;
        debug!(job_id = %job_id, from = ?from, to = ?to, "[jb-workflow] Transition");
        Ok(())
    }

    fn fail(&self, machine: &mut AcceptanceMachine, job_id: JobId, err: MarketplaceError) -> MarketplaceError {
        match self.transition(machine, job_id, AcceptanceEvent::Failed(FailureKind::from(&err))) {
            Ok(()) => err,
            Err(invalid) => invalid,
        }
    }
}

fn mode_label(mode: AcceptanceMode) -> &'static str {
    match mode {
        AcceptanceMode::Atomic => "atomic",
        AcceptanceMode::Decoupled => "decoupled",
    }
}
