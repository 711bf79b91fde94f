//! # Domain Invariants
//!
//! Rules every ledger answer and every cache state must satisfy.

use super::entities::{Application, Job};
use super::errors::{MarketplaceError, MarketplaceResult};
use super::value_objects::{Address, JobId};

/// Reputation increment per accepted application.
pub const DEFAULT_REPUTATION_DELTA: u64 = 1;

/// Default bound for awaiting finality (milliseconds).
pub const DEFAULT_FINALITY_TIMEOUT_MS: u64 = 60_000;

/// Invariant: the ledger returned the job that was asked for.
///
/// Ids are dense and ledger-assigned, so a mismatch means the ledger
/// client is broken, not that the id moved.
pub fn invariant_job_id_matches(requested: JobId, job: &Job) -> MarketplaceResult<()> {
    if job.id != requested {
        return Err(MarketplaceError::InconsistentLedger(format!(
            "asked for job {}, received job {}",
            requested, job.id
        )));
    }
    Ok(())
}

/// Invariant: an applicant never applies to their own job.
pub fn invariant_not_self_application(employer: &Address, applicant: &Address) -> MarketplaceResult<()> {
    if employer == applicant {
        return Err(MarketplaceError::ValidationRejected(
            "employer cannot apply to own job".to_string(),
        ));
    }
    Ok(())
}

/// Invariant: every application in a job's list belongs to that job and at
/// most one of them is accepted.
pub fn invariant_application_list(job_id: JobId, applications: &[Application]) -> MarketplaceResult<()> {
    if let Some(stray) = applications.iter().find(|a| a.job_id != job_id) {
        return Err(MarketplaceError::InconsistentLedger(format!(
            "application list for job {} contains an application for job {}",
            job_id, stray.job_id
        )));
    }

    let accepted = applications.iter().filter(|a| a.is_accepted).count();
    if accepted > 1 {
        return Err(MarketplaceError::InconsistentLedger(format!(
            "job {} has {} accepted applications",
            job_id, accepted
        )));
    }
    Ok(())
}

/// Invariant: open-jobs index is active-only, strictly ascending by id.
pub fn invariant_open_jobs_ordered(jobs: &[Job]) -> bool {
    jobs.iter().all(|job| job.is_active) && jobs.windows(2).all(|w| w[0].id < w[1].id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Amount;

    fn job(id: u64, active: bool) -> Job {
        Job {
            id: JobId::new(id),
            employer: Address::from_bytes([0xE1; 20]),
            title: format!("job {}", id),
            description: "desc".to_string(),
            payment_amount: Amount::new(1),
            is_active: active,
        }
    }

    fn application(job_id: u64, applicant: u8, accepted: bool) -> Application {
        Application {
            job_id: JobId::new(job_id),
            applicant: Address::from_bytes([applicant; 20]),
            cover_letter: String::new(),
            is_accepted: accepted,
        }
    }

    #[test]
    fn test_job_id_matches() {
        assert!(invariant_job_id_matches(JobId::new(2), &job(2, true)).is_ok());
        assert!(matches!(
            invariant_job_id_matches(JobId::new(2), &job(3, true)),
            Err(MarketplaceError::InconsistentLedger(_))
        ));
    }

    #[test]
    fn test_self_application_rejected() {
        let employer = Address::from_bytes([0xE1; 20]);
        assert!(invariant_not_self_application(&employer, &employer).is_err());
        assert!(invariant_not_self_application(&employer, &Address::from_bytes([1; 20])).is_ok());
    }

    #[test]
    fn test_single_acceptance() {
        let ok = vec![application(1, 1, true), application(1, 2, false)];
        assert!(invariant_application_list(JobId::new(1), &ok).is_ok());

        let double = vec![application(1, 1, true), application(1, 2, true)];
        assert!(invariant_application_list(JobId::new(1), &double).is_err());
    }

    #[test]
    fn test_application_list_foreign_job() {
        let mixed = vec![application(1, 1, false), application(2, 2, false)];
        assert!(invariant_application_list(JobId::new(1), &mixed).is_err());
    }

    #[test]
    fn test_open_jobs_ordered() {
        assert!(invariant_open_jobs_ordered(&[job(1, true), job(3, true)]));
        assert!(!invariant_open_jobs_ordered(&[job(3, true), job(1, true)]));
        assert!(!invariant_open_jobs_ordered(&[job(1, true), job(1, true)]));
        assert!(!invariant_open_jobs_ordered(&[job(1, true), job(2, false)]));
        assert!(invariant_open_jobs_ordered(&[]));
    }
}
