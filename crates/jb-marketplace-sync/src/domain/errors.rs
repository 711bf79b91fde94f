//! # Domain Errors
//!
//! Error taxonomy for ledger queries, submits and the accept workflow.

use thiserror::Error;

use super::acceptance::PartialFailure;
use super::value_objects::JobId;

/// Result alias used across the crate.
pub type MarketplaceResult<T> = Result<T, MarketplaceError>;

/// Marketplace error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketplaceError {
    /// Referenced job id does not exist on the ledger.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Referenced application index does not exist for the job.
    #[error("Application {index} not found for job {job_id}")]
    ApplicationNotFound {
        /// Job the application was looked up on
        job_id: JobId,
        /// Requested position in the job's application list
        index: usize,
    },

    /// Remote policy violation (insufficient funds, non-employer caller,
    /// out-of-range index, double acceptance, self-application).
    #[error("Rejected by ledger: {0}")]
    ValidationRejected(String),

    /// Finality was not observed in time. The true outcome is unknown.
    #[error("Finality not observed within {timeout_ms}ms (outcome unknown)")]
    Timeout {
        /// Bound that was exceeded
        timeout_ms: u64,
    },

    /// Transport failure talking to the ledger. Retryable.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A multi-step workflow committed its first step but not a later one.
    #[error("Partial failure: {0}")]
    PartialFailure(PartialFailure),

    /// Another accept workflow is already running against this job.
    #[error("Acceptance already in progress for job {0}")]
    AcceptanceInProgress(JobId),

    /// The ledger answered with data that breaks a domain invariant.
    #[error("Inconsistent ledger response: {0}")]
    InconsistentLedger(String),

    /// Caller-supplied input failed local validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Address string is not a 20-byte hex address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Workflow state machine received an event it cannot accept.
    #[error("Invalid workflow transition: {event} in state {from}")]
    InvalidTransition {
        /// State the machine was in
        from: String,
        /// Event that was rejected
        event: String,
    },
}

impl MarketplaceError {
    /// True when the ledger may or may not have applied the mutation.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, MarketplaceError::Timeout { .. })
    }

    /// True for transport failures that can be retried safely on reads.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketplaceError::ConnectionError(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketplaceError::JobNotFound(_) | MarketplaceError::ApplicationNotFound { .. } => {
                "not_found"
            }
            MarketplaceError::ValidationRejected(_) => "rejected",
            MarketplaceError::Timeout { .. } => "timeout",
            MarketplaceError::ConnectionError(_) => "connection",
            MarketplaceError::PartialFailure(_) => "partial",
            MarketplaceError::AcceptanceInProgress(_) => "in_progress",
            MarketplaceError::InconsistentLedger(_) => "inconsistent",
            MarketplaceError::InvalidInput(_) | MarketplaceError::InvalidAddress(_) => "invalid",
            MarketplaceError::InvalidTransition { .. } => "transition",
        }
    }
}
