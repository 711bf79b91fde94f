//! # Read-Model Cache
//!
//! Denormalized projection of the ledger: open jobs, applications per job,
//! reputation per address. Readers get immutable [`CacheSnapshot`]s; a
//! write builds the next snapshot and swaps it in, so a reader never sees
//! a half-applied resync.
//!
//! Writes are visible only inside `application` and are issued by the
//! `Synchronizer`.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::{
    invariant_open_jobs_ordered, Address, Application, Job, JobId, ScoredApplication,
};

/// Synchronizer bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Job count seen by the last full jobs resync.
    pub last_job_count: u64,
    /// Jobs whose application list was fetched since they entered the index.
    pub fresh_applications: BTreeSet<JobId>,
    /// Jobs synthesized locally and not yet confirmed by a full resync.
    pub provisional_jobs: BTreeSet<JobId>,
}

/// Immutable view of the cache at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    jobs: Vec<Job>,
    applications: BTreeMap<JobId, Vec<Application>>,
    reputation: HashMap<Address, u64>,
    sync_state: SyncState,
}

impl CacheSnapshot {
    /// Open jobs, ascending by id.
    pub fn open_jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Open job by id.
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs
            .binary_search_by_key(&id, |job| job.id)
            .ok()
            .map(|pos| &self.jobs[pos])
    }

    /// Cached applications of a job (empty if never fetched).
    pub fn applications(&self, job_id: JobId) -> &[Application] {
        self.applications
            .get(&job_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cached reputation score.
    pub fn reputation(&self, address: &Address) -> Option<u64> {
        self.reputation.get(address).copied()
    }

    /// Number of cached reputation entries.
    pub fn reputation_entries(&self) -> usize {
        self.reputation.len()
    }

    /// Applications joined with cached reputation, carrying their index.
    pub fn scored_applications(&self, job_id: JobId) -> Vec<ScoredApplication> {
        self.applications(job_id)
            .iter()
            .enumerate()
            .map(|(index, application)| ScoredApplication {
                index,
                application: application.clone(),
                reputation: self.reputation(&application.applicant),
            })
            .collect()
    }

    /// Synchronizer bookkeeping.
    pub fn sync_state(&self) -> &SyncState {
        &self.sync_state
    }

    // -------------------------------------------------------------------------
    // Mutators (Synchronizer only)
    // -------------------------------------------------------------------------

    /// Replace the jobs index wholesale. Provisional entries are dropped.
    pub(super) fn replace_jobs(&mut self, jobs: Vec<Job>, job_count: u64) {
        debug_assert!(invariant_open_jobs_ordered(&jobs));
        let indexed: BTreeSet<JobId> = jobs.iter().map(|job| job.id).collect();
        self.jobs = jobs;
        self.sync_state.last_job_count = job_count;
        self.sync_state.provisional_jobs.clear();
        self.sync_state
            .fresh_applications
            .retain(|id| indexed.contains(id));
    }

    /// Insert or overwrite a synthesized job, keeping id order.
    pub(super) fn upsert_provisional_job(&mut self, job: Job) {
        let id = job.id;
        match self.jobs.binary_search_by_key(&id, |existing| existing.id) {
            Ok(pos) => self.jobs[pos] = job,
            Err(pos) => self.jobs.insert(pos, job),
        }
        self.sync_state.provisional_jobs.insert(id);
        self.sync_state.last_job_count = self.sync_state.last_job_count.max(id.get());
    }

    /// Drop a job from the open index along with its applications.
    pub(super) fn remove_job(&mut self, id: JobId) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.id != id);
        self.applications.remove(&id);
        self.sync_state.fresh_applications.remove(&id);
        self.sync_state.provisional_jobs.remove(&id);
        self.jobs.len() != before
    }

    /// Replace the whole applications map. Lists of `keep` jobs survive from
    /// the previous snapshot; every other entry missing from `lists` is
    /// dropped. Jobs no longer in the open index are skipped. Returns the
    /// number of fetched lists stored.
    pub(super) fn replace_all_applications(
        &mut self,
        mut lists: BTreeMap<JobId, Vec<Application>>,
        keep: &[JobId],
    ) -> usize {
        lists.retain(|id, _| self.job(*id).is_some());
        let stored = lists.len();
        let mut fresh: BTreeSet<JobId> = lists.keys().copied().collect();
        for id in keep {
            if self.job(*id).is_none() {
                continue;
            }
            if let Some(previous) = self.applications.remove(id) {
                lists.entry(*id).or_insert(previous);
                if self.sync_state.fresh_applications.contains(id) {
                    fresh.insert(*id);
                }
            }
        }
        self.applications = lists;
        self.sync_state.fresh_applications = fresh;
        stored
    }

    /// Replace one job's application list.
    pub(super) fn replace_job_applications(&mut self, job_id: JobId, list: Vec<Application>) {
        self.applications.insert(job_id, list);
        self.sync_state.fresh_applications.insert(job_id);
    }

    /// Cache a score unless one is already cached. Returns true if inserted.
    pub(super) fn insert_reputation_if_absent(&mut self, address: Address, score: u64) -> bool {
        match self.reputation.entry(address) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(score);
                true
            }
        }
    }

    /// Overwrite a score.
    pub(super) fn set_reputation(&mut self, address: Address, score: u64) {
        self.reputation.insert(address, score);
    }
}

/// Owned cache store.
#[derive(Debug, Default)]
pub struct ReadModelCache {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl ReadModelCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Cheap; later writes do not affect it.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Apply a write to the next snapshot and publish it.
    pub(super) fn commit<R>(&self, write: impl FnOnce(&mut CacheSnapshot) -> R) -> R {
        let mut guard = self.current.write();
        let next = Arc::make_mut(&mut guard);
        let result = write(&mut *next);
        crate::metrics::set_open_jobs(next.jobs.len());
        result
    }
}
