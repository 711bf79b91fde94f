//! # Domain Entities
//!
//! Jobs and applications as recorded on the ledger.

use serde::{Deserialize, Serialize};

use super::errors::{MarketplaceError, MarketplaceResult};
use super::value_objects::{Address, Amount, JobId};

/// Job posting.
///
/// Everything except `is_active` is immutable once the ledger assigns the id.
/// `is_active` flips to false exactly once, when an application is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Ledger-assigned id.
    pub id: JobId,
    /// Account that posted the job and pays for it.
    pub employer: Address,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Payment released on acceptance, in the ledger's smallest unit.
    pub payment_amount: Amount,
    /// Open for applications.
    pub is_active: bool,
}

impl Job {
    /// Build the record a successful `post_job` produces, without a read.
    pub fn synthesized(id: JobId, employer: Address, posting: &JobPosting) -> Self {
        Self {
            id,
            employer,
            title: posting.title.clone(),
            description: posting.description.clone(),
            payment_amount: posting.payment_amount,
            is_active: true,
        }
    }
}

/// Caller-supplied values for a new job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Payment offered.
    pub payment_amount: Amount,
}

impl JobPosting {
    /// Create a posting.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        payment_amount: Amount,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            payment_amount,
        }
    }

    /// Local checks before anything is sent to the ledger.
    pub fn validate(&self) -> MarketplaceResult<()> {
        if self.title.trim().is_empty() {
            return Err(MarketplaceError::InvalidInput(
                "job title must not be empty".to_string(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(MarketplaceError::InvalidInput(
                "job description must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Application to a job. Position in the job's list is its index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Job applied to.
    pub job_id: JobId,
    /// Applying account. Never the job's employer.
    pub applicant: Address,
    /// Free-form cover letter.
    pub cover_letter: String,
    /// Set once, when the employer accepts this application.
    pub is_accepted: bool,
}

/// Application joined with its applicant's cached reputation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredApplication {
    /// Position in the job's application list (the accept index).
    pub index: usize,
    /// The application.
    pub application: Application,
    /// Cached score, `None` if never fetched.
    pub reputation: Option<u64>,
}
