//! Retrying Ledger Client
//!
//! Decorates a `LedgerClient`: reads that fail with `ConnectionError` are
//! retried with exponential backoff. Submits are forwarded once and never
//! retried, since a resent mutation may be applied twice.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MarketplaceConfig;
use crate::domain::{Address, Amount, Application, Job, JobId, JobPosting, MarketplaceResult};
use crate::ports::outbound::{LedgerClient, MutationHandle};

/// Upper bound on the delay between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Retry budget for idempotent reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub extra_attempts: u32,
    /// Delay before the first retry. Doubles per attempt, capped.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Policy from the read-retry settings.
    pub fn from_config(config: &MarketplaceConfig) -> Self {
        Self {
            extra_attempts: config.read_retry_attempts,
            initial_backoff: Duration::from_millis(config.read_retry_backoff_ms),
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self {
            extra_attempts: 0,
            initial_backoff: Duration::ZERO,
        }
    }
}

/// `LedgerClient` decorator retrying reads on connection errors.
pub struct RetryingLedgerClient<L: LedgerClient> {
    inner: L,
    policy: RetryPolicy,
}

impl<L: LedgerClient> RetryingLedgerClient<L> {
    /// Wrap `inner`.
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrapped client.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    async fn read<T, F, Fut>(&self, op: &'static str, mut attempt_read: F) -> MarketplaceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MarketplaceResult<T>>,
    {
        let mut delay = self.policy.initial_backoff;
        let mut attempt = 0;
        loop {
            match attempt_read().await {
                Err(err) if err.is_retryable() && attempt < self.policy.extra_attempts => {
                    attempt += 1;
                    debug!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "[jb-ledger] Retrying read"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                Err(err) => {
                    if attempt > 0 {
                        warn!(op, attempts = attempt + 1, error = %err, "[jb-ledger] Read failed after retries");
                    }
                    return Err(err);
                }
                ok => return ok,
            }
        }
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for RetryingLedgerClient<L> {
    fn account(&self) -> Address {
        self.inner.account()
    }

    async fn query_job_count(&self) -> MarketplaceResult<u64> {
        self.read("query_job_count", || self.inner.query_job_count())
            .await
    }

    async fn query_job(&self, id: JobId) -> MarketplaceResult<Job> {
        self.read("query_job", || self.inner.query_job(id)).await
    }

    async fn query_applications(&self, job_id: JobId) -> MarketplaceResult<Vec<Application>> {
        self.read("query_applications", || self.inner.query_applications(job_id))
            .await
    }

    async fn query_reputation(&self, address: Address) -> MarketplaceResult<u64> {
        self.read("query_reputation", || self.inner.query_reputation(address))
            .await
    }

    async fn submit_post_job(&self, posting: JobPosting) -> MarketplaceResult<MutationHandle<JobId>> {
        self.inner.submit_post_job(posting).await
    }

    async fn submit_apply(
        &self,
        job_id: JobId,
        cover_letter: String,
    ) -> MarketplaceResult<MutationHandle<()>> {
        self.inner.submit_apply(job_id, cover_letter).await
    }

    async fn submit_accept_application(
        &self,
        job_id: JobId,
        index: usize,
        payment: Amount,
    ) -> MarketplaceResult<MutationHandle<()>> {
        self.inner
            .submit_accept_application(job_id, index, payment)
            .await
    }

    async fn submit_increase_reputation(
        &self,
        address: Address,
        delta: u64,
    ) -> MarketplaceResult<MutationHandle<()>> {
        self.inner.submit_increase_reputation(address, delta).await
    }
}
