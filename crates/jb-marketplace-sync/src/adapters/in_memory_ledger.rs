//! In-Memory Ledger Adapter
//!
//! Implements `LedgerClient` over an in-process, append-only ledger. It
//! enforces the same policies as the deployed job-board contract:
//!
//! - only the employer accepts, and must send exactly the job's payment
//! - an employer cannot apply to their own job
//! - closed jobs take no applications and no second acceptance
//! - out-of-range application indexes are refused
//!
//! Policy violations arrive as `ValidationRejected` at finality. Faults can
//! be queued per submit kind or per query kind to exercise every failure
//! path of the synchronizer and the accept workflow.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{
    Address, Amount, Application, Job, JobId, JobPosting, MarketplaceError, MarketplaceResult,
};
use crate::ports::outbound::{LedgerClient, MutationHandle};

/// How `query_applications` is answered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationQueryMode {
    /// Read the stored list directly.
    #[default]
    Aggregate,
    /// Rebuild the list by replaying the event log.
    EventReplay,
}

/// Who credits reputation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReputationRule {
    /// Acceptance itself credits +1 (atomic contract).
    #[default]
    OnAcceptance,
    /// Only `increase_reputation` credits (decoupled contract).
    External,
}

/// Submit operations, for fault injection and counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubmitKind {
    /// `submit_post_job`
    PostJob,
    /// `submit_apply`
    Apply,
    /// `submit_accept_application`
    AcceptApplication,
    /// `submit_increase_reputation`
    IncreaseReputation,
}

impl SubmitKind {
    fn label(self) -> &'static str {
        match self {
            SubmitKind::PostJob => "post_job",
            SubmitKind::Apply => "apply",
            SubmitKind::AcceptApplication => "accept_application",
            SubmitKind::IncreaseReputation => "increase_reputation",
        }
    }
}

/// Query operations, for fault injection and counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// `query_job_count`
    JobCount,
    /// `query_job`
    Job,
    /// `query_applications`
    Applications,
    /// `query_reputation`
    Reputation,
}

/// Fault applied to the next submit of a kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the mutation at finality.
    Reject(String),
    /// Never deliver finality. With `commit`, the mutation is applied anyway.
    WithholdFinality {
        /// Apply the mutation to ledger state.
        commit: bool,
    },
    /// Fail the submit call itself; nothing is sent.
    ConnectionLost,
}

/// Append-only ledger log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A job was posted.
    JobPosted {
        /// Assigned id
        job_id: JobId,
        /// Posting account
        employer: Address,
        /// Offered payment
        payment_amount: Amount,
    },
    /// An application was appended to a job.
    ApplicationSubmitted {
        /// Job applied to
        job_id: JobId,
        /// Applying account
        applicant: Address,
        /// Cover letter
        cover_letter: String,
    },
    /// An application was accepted and paid; the job closed.
    ApplicationAccepted {
        /// Closed job
        job_id: JobId,
        /// Accepted index
        index: usize,
        /// Paid account
        applicant: Address,
        /// Amount transferred
        payment: Amount,
    },
    /// Reputation credited.
    ReputationIncreased {
        /// Credited account
        address: Address,
        /// Increment
        delta: u64,
    },
}

#[derive(Default)]
struct LedgerState {
    application_query: ApplicationQueryMode,
    reputation_rule: ReputationRule,
    jobs: Vec<Job>,
    applications: Vec<Vec<Application>>,
    events: Vec<LedgerEvent>,
    reputation: HashMap<Address, u64>,
    balances: HashMap<Address, Amount>,
    submit_faults: HashMap<SubmitKind, VecDeque<Fault>>,
    query_faults: HashMap<QueryKind, VecDeque<MarketplaceError>>,
    job_query_faults: HashMap<JobId, MarketplaceError>,
    submit_counts: HashMap<SubmitKind, usize>,
    query_counts: HashMap<QueryKind, usize>,
    reputation_queries: HashMap<Address, usize>,
    withheld: Vec<Box<dyn Any + Send + Sync>>,
}

impl LedgerState {
    fn slot(&self, job_id: JobId) -> Option<usize> {
        let slot = usize::try_from(job_id.get()).ok()?.checked_sub(1)?;
        (slot < self.jobs.len()).then_some(slot)
    }

    fn post_job(&mut self, employer: Address, posting: &JobPosting, is_active: bool) -> JobId {
        let job_id = JobId::new(self.jobs.len() as u64 + 1);
        self.jobs.push(Job {
            id: job_id,
            employer,
            title: posting.title.clone(),
            description: posting.description.clone(),
            payment_amount: posting.payment_amount,
            is_active,
        });
        self.applications.push(Vec::new());
        self.events.push(LedgerEvent::JobPosted {
            job_id,
            employer,
            payment_amount: posting.payment_amount,
        });
        job_id
    }

    fn apply(&mut self, caller: Address, job_id: JobId, cover_letter: String) -> MarketplaceResult<usize> {
        let slot = self.slot(job_id).ok_or_else(|| rejected("job does not exist"))?;
        let job = &self.jobs[slot];
        if !job.is_active {
            return Err(rejected("job is closed"));
        }
        if job.employer == caller {
            return Err(rejected("employer cannot apply to own job"));
        }
        Ok(self.append_application(slot, caller, cover_letter))
    }

    fn append_application(&mut self, slot: usize, applicant: Address, cover_letter: String) -> usize {
        let job_id = self.jobs[slot].id;
        let list = &mut self.applications[slot];
        list.push(Application {
            job_id,
            applicant,
            cover_letter: cover_letter.clone(),
            is_accepted: false,
        });
        self.events.push(LedgerEvent::ApplicationSubmitted {
            job_id,
            applicant,
            cover_letter,
        });
        list.len() - 1
    }

    fn accept(&mut self, caller: Address, job_id: JobId, index: usize, payment: Amount) -> MarketplaceResult<()> {
        let slot = self.slot(job_id).ok_or_else(|| rejected("job does not exist"))?;
        let job = &self.jobs[slot];
        if job.employer != caller {
            return Err(rejected("only the employer can accept"));
        }
        if !job.is_active {
            return Err(rejected("job already closed"));
        }
        if payment != job.payment_amount {
            return Err(rejected("payment does not match job"));
        }
        let applicant = self.applications[slot]
            .get(index)
            .map(|a| a.applicant)
            .ok_or_else(|| rejected("application index out of range"))?;
        let balance = self.balances.get(&caller).copied().unwrap_or_default();
        let remaining = balance
            .checked_sub(payment)
            .ok_or_else(|| rejected("insufficient funds"))?;

        self.balances.insert(caller, remaining);
        let credited = self.balances.entry(applicant).or_default();
        *credited = credited.saturating_add(payment);
        self.close(slot, index, applicant, payment);
        if self.reputation_rule == ReputationRule::OnAcceptance {
            self.credit(applicant, 1);
        }
        Ok(())
    }

    fn close(&mut self, slot: usize, index: usize, applicant: Address, payment: Amount) {
        self.jobs[slot].is_active = false;
        self.applications[slot][index].is_accepted = true;
        self.events.push(LedgerEvent::ApplicationAccepted {
            job_id: self.jobs[slot].id,
            index,
            applicant,
            payment,
        });
    }

    fn increase_reputation(&mut self, address: Address, delta: u64) -> MarketplaceResult<()> {
        if self.reputation_rule == ReputationRule::OnAcceptance {
            return Err(rejected("reputation is credited on acceptance"));
        }
        if delta == 0 {
            return Err(rejected("reputation delta must be positive"));
        }
        self.credit(address, delta);
        Ok(())
    }

    fn credit(&mut self, address: Address, delta: u64) {
        let score = self.reputation.entry(address).or_default();
        *score = score.saturating_add(delta);
        self.events
            .push(LedgerEvent::ReputationIncreased { address, delta });
    }

    fn replay_applications(&self, job_id: JobId) -> Vec<Application> {
        let mut list = Vec::new();
        for event in &self.events {
            match event {
                LedgerEvent::ApplicationSubmitted {
                    job_id: id,
                    applicant,
                    cover_letter,
                } if *id == job_id => list.push(Application {
                    job_id,
                    applicant: *applicant,
                    cover_letter: cover_letter.clone(),
                    is_accepted: false,
                }),
                LedgerEvent::ApplicationAccepted { job_id: id, index, .. } if *id == job_id => {
                    if let Some(application) = list.get_mut(*index) {
                        application.is_accepted = true;
                    }
                }
                _ => {}
            }
        }
        list
    }
}

fn rejected(reason: &str) -> MarketplaceError {
    MarketplaceError::ValidationRejected(reason.to_string())
}

/// In-process ledger.
///
/// Clones and [`InMemoryLedger::as_account`] views share one ledger state.
#[derive(Clone)]
pub struct InMemoryLedger {
    account: Address,
    state: Arc<RwLock<LedgerState>>,
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryLedger")
            .field("account", &self.account)
            .field("jobs", &state.jobs.len())
            .field("events", &state.events.len())
            .finish()
    }
}

impl InMemoryLedger {
    /// Empty ledger whose submits are signed by `account`.
    pub fn new(account: Address) -> Self {
        Self {
            account,
            state: Arc::new(RwLock::new(LedgerState::default())),
        }
    }

    /// Same ledger, signing as another account.
    pub fn as_account(&self, account: Address) -> Self {
        Self {
            account,
            state: Arc::clone(&self.state),
        }
    }

    /// Choose how application lists are queried.
    pub fn with_application_query(self, mode: ApplicationQueryMode) -> Self {
        self.state.write().application_query = mode;
        self
    }

    /// Choose who credits reputation.
    pub fn with_reputation_rule(self, rule: ReputationRule) -> Self {
        self.state.write().reputation_rule = rule;
        self
    }

    /// Build a ledger from a fixture.
    pub fn from_fixture(fixture: LedgerFixture) -> MarketplaceResult<Self> {
        let ledger = Self::new(fixture.account)
            .with_application_query(fixture.application_query)
            .with_reputation_rule(fixture.reputation_rule);

        for (address, amount) in fixture.balances {
            ledger.fund(address, amount);
        }
        for (address, score) in fixture.reputation {
            ledger.set_reputation(address, score);
        }
        for job in fixture.jobs {
            let job_id = ledger.seed_job(
                job.employer,
                job.title,
                job.description,
                job.payment_amount,
                true,
            );
            for application in job.applications {
                ledger.seed_application(job_id, application.applicant, application.cover_letter)?;
            }
            if let Some(index) = job.accepted {
                ledger.seed_acceptance(job_id, index)?;
            }
        }
        Ok(ledger)
    }

    // -------------------------------------------------------------------------
    // Seeding (bypasses policy and faults)
    // -------------------------------------------------------------------------

    /// Credit an account's balance.
    pub fn fund(&self, address: Address, amount: Amount) {
        let mut state = self.state.write();
        let balance = state.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Append a job directly.
    pub fn seed_job(
        &self,
        employer: Address,
        title: impl Into<String>,
        description: impl Into<String>,
        payment_amount: Amount,
        is_active: bool,
    ) -> JobId {
        let posting = JobPosting::new(title, description, payment_amount);
        self.state.write().post_job(employer, &posting, is_active)
    }

    /// Append an application directly. Returns its index.
    pub fn seed_application(
        &self,
        job_id: JobId,
        applicant: Address,
        cover_letter: impl Into<String>,
    ) -> MarketplaceResult<usize> {
        let mut state = self.state.write();
        let slot = state
            .slot(job_id)
            .ok_or(MarketplaceError::JobNotFound(job_id))?;
        Ok(state.append_application(slot, applicant, cover_letter.into()))
    }

    /// Mark an application accepted and close its job, without payment or
    /// reputation.
    pub fn seed_acceptance(&self, job_id: JobId, index: usize) -> MarketplaceResult<()> {
        let mut state = self.state.write();
        let slot = state
            .slot(job_id)
            .ok_or(MarketplaceError::JobNotFound(job_id))?;
        let applicant = state.applications[slot]
            .get(index)
            .map(|a| a.applicant)
            .ok_or(MarketplaceError::ApplicationNotFound { job_id, index })?;
        state.close(slot, index, applicant, Amount::ZERO);
        Ok(())
    }

    /// Overwrite a reputation score.
    pub fn set_reputation(&self, address: Address, score: u64) {
        self.state.write().reputation.insert(address, score);
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Queue a fault for the next submit of `kind`.
    pub fn inject_submit_fault(&self, kind: SubmitKind, fault: Fault) {
        self.state
            .write()
            .submit_faults
            .entry(kind)
            .or_default()
            .push_back(fault);
    }

    /// Fail the next query of `kind` with `err`.
    pub fn fail_next_query(&self, kind: QueryKind, err: MarketplaceError) {
        self.state
            .write()
            .query_faults
            .entry(kind)
            .or_default()
            .push_back(err);
    }

    /// Fail every `query_job(job_id)` until cleared.
    pub fn fail_job_query(&self, job_id: JobId, err: MarketplaceError) {
        self.state.write().job_query_faults.insert(job_id, err);
    }

    /// Remove all pending query faults.
    pub fn clear_query_faults(&self) {
        let mut state = self.state.write();
        state.query_faults.clear();
        state.job_query_faults.clear();
    }

    /// Drop every withheld finality notifier. Waiters still pending see a
    /// connection error. Returns how many were dropped.
    pub fn abandon_withheld(&self) -> usize {
        let mut state = self.state.write();
        let count = state.withheld.len();
        state.withheld.clear();
        count
    }

    // -------------------------------------------------------------------------
    // Ground truth
    // -------------------------------------------------------------------------

    /// Stored job.
    pub fn job(&self, job_id: JobId) -> Option<Job> {
        let state = self.state.read();
        state.slot(job_id).map(|slot| state.jobs[slot].clone())
    }

    /// Stored applications of a job.
    pub fn applications(&self, job_id: JobId) -> Vec<Application> {
        let state = self.state.read();
        state
            .slot(job_id)
            .map(|slot| state.applications[slot].clone())
            .unwrap_or_default()
    }

    /// Stored reputation score.
    pub fn reputation_of(&self, address: &Address) -> u64 {
        self.state.read().reputation.get(address).copied().unwrap_or(0)
    }

    /// Account balance.
    pub fn balance(&self, address: &Address) -> Amount {
        self.state.read().balances.get(address).copied().unwrap_or_default()
    }

    /// Event log, oldest first.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state.read().events.clone()
    }

    /// Queries of `kind` served (including failed ones).
    pub fn query_count(&self, kind: QueryKind) -> usize {
        self.state.read().query_counts.get(&kind).copied().unwrap_or(0)
    }

    /// `query_reputation` calls for one address.
    pub fn reputation_queries_for(&self, address: &Address) -> usize {
        self.state
            .read()
            .reputation_queries
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Submits of `kind` received (including failed ones).
    pub fn submitted(&self, kind: SubmitKind) -> usize {
        self.state.read().submit_counts.get(&kind).copied().unwrap_or(0)
    }

    /// Mutations whose finality is being withheld.
    pub fn withheld_count(&self) -> usize {
        self.state.read().withheld.len()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn read<T>(
        &self,
        kind: QueryKind,
        read: impl FnOnce(&LedgerState) -> MarketplaceResult<T>,
    ) -> MarketplaceResult<T> {
        let mut state = self.state.write();
        *state.query_counts.entry(kind).or_default() += 1;
        if let Some(err) = state.query_faults.get_mut(&kind).and_then(VecDeque::pop_front) {
            debug!(kind = ?kind, error = %err, "[jb-ledger] Injected query fault");
            return Err(err);
        }
        read(&*state)
    }

    fn submit<T: Send + 'static>(
        &self,
        kind: SubmitKind,
        mutate: impl FnOnce(&mut LedgerState, Address) -> MarketplaceResult<T>,
    ) -> MarketplaceResult<MutationHandle<T>> {
        let mut state = self.state.write();
        *state.submit_counts.entry(kind).or_default() += 1;
        let fault = state
            .submit_faults
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);

        let (notifier, handle) = MutationHandle::pending(kind.label());
        match fault {
            None => {
                let result = mutate(&mut *state, self.account);
                if let Err(err) = &result {
                    debug!(kind = kind.label(), error = %err, "[jb-ledger] Mutation rejected");
                }
                notifier.settle(result);
            }
            Some(Fault::Reject(reason)) => {
                notifier.settle(Err(MarketplaceError::ValidationRejected(reason)));
            }
            Some(Fault::WithholdFinality { commit }) => {
                if commit {
                    if let Err(err) = mutate(&mut *state, self.account) {
                        debug!(kind = kind.label(), error = %err, "[jb-ledger] Withheld mutation rejected");
                    }
                }
                debug!(kind = kind.label(), mutation_id = %notifier.id(), commit, "[jb-ledger] Finality withheld");
                state.withheld.push(Box::new(notifier));
            }
            Some(Fault::ConnectionLost) => {
                return Err(MarketplaceError::ConnectionError(format!(
                    "connection lost submitting {}",
                    kind.label()
                )));
            }
        }
        Ok(handle)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn account(&self) -> Address {
        self.account
    }

    async fn query_job_count(&self) -> MarketplaceResult<u64> {
        self.read(QueryKind::JobCount, |state| Ok(state.jobs.len() as u64))
    }

    async fn query_job(&self, id: JobId) -> MarketplaceResult<Job> {
        self.read(QueryKind::Job, |state| {
            if let Some(err) = state.job_query_faults.get(&id) {
                return Err(err.clone());
            }
            state
                .slot(id)
                .map(|slot| state.jobs[slot].clone())
                .ok_or(MarketplaceError::JobNotFound(id))
        })
    }

    async fn query_applications(&self, job_id: JobId) -> MarketplaceResult<Vec<Application>> {
        self.read(QueryKind::Applications, |state| {
            let slot = state
                .slot(job_id)
                .ok_or(MarketplaceError::JobNotFound(job_id))?;
            Ok(match state.application_query {
                ApplicationQueryMode::Aggregate => state.applications[slot].clone(),
                ApplicationQueryMode::EventReplay => state.replay_applications(job_id),
            })
        })
    }

    async fn query_reputation(&self, address: Address) -> MarketplaceResult<u64> {
        let score = self.read(QueryKind::Reputation, |state| {
            Ok(state.reputation.get(&address).copied().unwrap_or(0))
        });
        *self
            .state
            .write()
            .reputation_queries
            .entry(address)
            .or_default() += 1;
        score
    }

    async fn submit_post_job(&self, posting: JobPosting) -> MarketplaceResult<MutationHandle<JobId>> {
        self.submit(SubmitKind::PostJob, move |state, caller| {
            Ok(state.post_job(caller, &posting, true))
        })
    }

    async fn submit_apply(
        &self,
        job_id: JobId,
        cover_letter: String,
    ) -> MarketplaceResult<MutationHandle<()>> {
        self.submit(SubmitKind::Apply, move |state, caller| {
            state.apply(caller, job_id, cover_letter).map(|_| ())
        })
    }

    async fn submit_accept_application(
        &self,
        job_id: JobId,
        index: usize,
        payment: Amount,
    ) -> MarketplaceResult<MutationHandle<()>> {
        self.submit(SubmitKind::AcceptApplication, move |state, caller| {
            state.accept(caller, job_id, index, payment)
        })
    }

    async fn submit_increase_reputation(
        &self,
        address: Address,
        delta: u64,
    ) -> MarketplaceResult<MutationHandle<()>> {
        self.submit(SubmitKind::IncreaseReputation, move |state, _caller| {
            state.increase_reputation(address, delta)
        })
    }
}

/// Serializable ledger contents, used to seed an [`InMemoryLedger`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFixture {
    /// Signing account.
    pub account: Address,
    /// Application query strategy.
    #[serde(default)]
    pub application_query: ApplicationQueryMode,
    /// Reputation rule.
    #[serde(default)]
    pub reputation_rule: ReputationRule,
    /// Opening balances.
    #[serde(default)]
    pub balances: BTreeMap<Address, Amount>,
    /// Opening reputation scores.
    #[serde(default)]
    pub reputation: BTreeMap<Address, u64>,
    /// Jobs in id order.
    #[serde(default)]
    pub jobs: Vec<FixtureJob>,
}

/// One job of a [`LedgerFixture`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureJob {
    /// Posting account.
    pub employer: Address,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Offered payment.
    pub payment_amount: Amount,
    /// Applications in submission order.
    #[serde(default)]
    pub applications: Vec<FixtureApplication>,
    /// Index of the accepted application; the job is closed if set.
    #[serde(default)]
    pub accepted: Option<usize>,
}

/// One application of a [`FixtureJob`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureApplication {
    /// Applying account.
    pub applicant: Address,
    /// Cover letter.
    pub cover_letter: String,
}
