//! # Outbound Ports
//!
//! The ledger as seen by this crate: idempotent reads and non-idempotent
//! submits whose finality is awaited through a [`MutationHandle`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    Address, Amount, Application, Job, JobId, JobPosting, MarketplaceError, MarketplaceResult,
};

/// Correlation id of a submitted mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pending mutation. Awaiting finality is the only suspension point of a
/// workflow step.
///
/// Dropping the handle abandons the wait, not the mutation: the ledger may
/// still apply it, and only a later resync tells.
#[derive(Debug)]
pub struct MutationHandle<T> {
    id: MutationId,
    kind: &'static str,
    receiver: oneshot::Receiver<MarketplaceResult<T>>,
}

/// Ledger-side end of a [`MutationHandle`].
#[derive(Debug)]
pub struct FinalityNotifier<T> {
    id: MutationId,
    sender: oneshot::Sender<MarketplaceResult<T>>,
}

impl<T> MutationHandle<T> {
    /// Create a handle and the notifier that settles it.
    pub fn pending(kind: &'static str) -> (FinalityNotifier<T>, Self) {
        let id = MutationId::new();
        let (sender, receiver) = oneshot::channel();
        (
            FinalityNotifier { id, sender },
            Self { id, kind, receiver },
        )
    }

    /// Handle that is already final with `value`.
    pub fn finalized(kind: &'static str, value: T) -> Self {
        let (notifier, handle) = Self::pending(kind);
        notifier.settle(Ok(value));
        handle
    }

    /// Correlation id.
    pub fn id(&self) -> MutationId {
        self.id
    }

    /// Mutation label, e.g. `"accept_application"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Wait until the mutation is final or `timeout` elapses.
    ///
    /// # Errors
    /// - `ValidationRejected` if the ledger refused the mutation
    /// - `Timeout` if finality was not observed in time (outcome unknown)
    /// - `ConnectionError` if the ledger side went away without an answer
    pub async fn await_finality(self, timeout: Duration) -> MarketplaceResult<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MarketplaceError::ConnectionError(format!(
                "finality channel for {} {} closed",
                self.kind, self.id
            ))),
            Err(_) => {
                warn!(
                    mutation_id = %self.id,
                    kind = self.kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "[jb-ledger] Finality not observed, outcome unknown"
                );
                Err(MarketplaceError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl<T> FinalityNotifier<T> {
    /// Correlation id shared with the handle.
    pub fn id(&self) -> MutationId {
        self.id
    }

    /// Deliver the final result. Returns false if the waiter is gone.
    pub fn settle(self, result: MarketplaceResult<T>) -> bool {
        self.sender.send(result).is_ok()
    }
}

/// Ledger client - outbound port.
///
/// Reads are idempotent. Submits are not: a submit that returned a handle
/// has been sent and cannot be cancelled.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Account that signs this client's submits.
    fn account(&self) -> Address;

    /// Number of jobs ever posted. Ids run `1..=count`.
    async fn query_job_count(&self) -> MarketplaceResult<u64>;

    /// Read one job. `JobNotFound` if the id was never assigned.
    async fn query_job(&self, id: JobId) -> MarketplaceResult<Job>;

    /// All applications of a job, in submission order.
    async fn query_applications(&self, job_id: JobId) -> MarketplaceResult<Vec<Application>>;

    /// Reputation score of an address (0 if never credited).
    async fn query_reputation(&self, address: Address) -> MarketplaceResult<u64>;

    /// Post a job. Finality yields the new id.
    async fn submit_post_job(&self, posting: JobPosting) -> MarketplaceResult<MutationHandle<JobId>>;

    /// Apply to a job as [`LedgerClient::account`].
    async fn submit_apply(
        &self,
        job_id: JobId,
        cover_letter: String,
    ) -> MarketplaceResult<MutationHandle<()>>;

    /// Pay `payment`, accept application `index` and close the job.
    async fn submit_accept_application(
        &self,
        job_id: JobId,
        index: usize,
        payment: Amount,
    ) -> MarketplaceResult<MutationHandle<()>>;

    /// Credit `delta` reputation to `address` (decoupled acceptance only).
    async fn submit_increase_reputation(
        &self,
        address: Address,
        delta: u64,
    ) -> MarketplaceResult<MutationHandle<()>>;
}
