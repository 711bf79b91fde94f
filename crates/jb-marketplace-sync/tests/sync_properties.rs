//! # Read-Model Synchronization Tests
//!
//! Cache behaviour against an `InMemoryLedger`.
//!
//! ## Test Categories
//!
//! 1. **Open-jobs index** - active-only, ascending, no duplicates
//! 2. **Idempotence** - resync twice without mutations is a no-op
//! 3. **Address canonicalization** - one cache entry and one fetch per address
//! 4. **Batch failure policies** - fail-fast vs isolate
//! 5. **Optimistic updates** - synthesized jobs superseded by resync

use std::sync::Arc;

use jb_marketplace_sync::{
    Address, Amount, ApplicationQueryMode, BatchFailurePolicy, InMemoryLedger, JobId, JobPosting,
    LedgerClient, MarketplaceApi, MarketplaceConfig, MarketplaceError, MarketplaceService,
    QueryKind, RetryPolicy, RetryingLedgerClient,
};
use proptest::prelude::*;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

fn employer() -> Address {
    addr(0xE1)
}

fn service_with(
    ledger: &Arc<InMemoryLedger>,
    policy: BatchFailurePolicy,
) -> MarketplaceService<InMemoryLedger> {
    MarketplaceService::new(
        Arc::clone(ledger),
        MarketplaceConfig::for_testing().with_policy(policy),
    )
}

fn open_ids<L: LedgerClient>(service: &MarketplaceService<L>) -> Vec<u64> {
    service
        .list_open_jobs()
        .iter()
        .map(|job| job.id.get())
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("runtime")
}

// =============================================================================
// OPEN-JOBS INDEX
// =============================================================================

#[tokio::test]
async fn test_three_jobs_middle_inactive() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    ledger.seed_job(employer(), "one", "first", Amount::new(10), true);
    ledger.seed_job(employer(), "two", "second", Amount::new(20), false);
    ledger.seed_job(employer(), "three", "third", Amount::new(30), true);

    let service = service_with(&ledger, BatchFailurePolicy::FailFast);
    service.full_resync().await.unwrap();

    let jobs = service.list_open_jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0], ledger.job(JobId::new(1)).unwrap());
    assert_eq!(jobs[1], ledger.job(JobId::new(3)).unwrap());
}

#[tokio::test]
async fn test_empty_ledger() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    let service = service_with(&ledger, BatchFailurePolicy::FailFast);
    let report = service.full_resync().await.unwrap();
    assert!(service.list_open_jobs().is_empty());
    assert_eq!(report.jobs_scanned, 0);
    assert_eq!(ledger.query_count(QueryKind::Job), 0);
}

proptest! {
    #[test]
    fn prop_open_jobs_are_exactly_the_active_ones(
        flags in prop::collection::vec(any::<bool>(), 0..24),
        policy in prop_oneof![Just(BatchFailurePolicy::FailFast), Just(BatchFailurePolicy::Isolate)],
    ) {
        let ledger = Arc::new(InMemoryLedger::new(employer()));
        for (i, active) in flags.iter().enumerate() {
            ledger.seed_job(employer(), format!("job {}", i), "d", Amount::new(1), *active);
        }
        let service = service_with(&ledger, policy);
        runtime().block_on(service.full_resync()).unwrap();

        let expected: Vec<u64> = flags
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(|(i, _)| i as u64 + 1)
            .collect();
        prop_assert_eq!(open_ids(&service), expected);
    }

    #[test]
    fn prop_resync_is_idempotent(
        layout in prop::collection::vec((any::<bool>(), prop::collection::vec(0u8..6, 0..4)), 0..10),
    ) {
        let ledger = Arc::new(InMemoryLedger::new(employer()));
        for (i, (active, applicants)) in layout.iter().enumerate() {
            let id = ledger.seed_job(employer(), format!("job {}", i), "d", Amount::new(1), *active);
            for applicant in applicants {
                ledger.seed_application(id, addr(0xA0 + applicant), "hi").unwrap();
            }
        }
        ledger.set_reputation(addr(0xA0), 7);

        let service = service_with(&ledger, BatchFailurePolicy::FailFast);
        let rt = runtime();
        rt.block_on(service.full_resync()).unwrap();
        let first = service.snapshot();
        rt.block_on(service.full_resync()).unwrap();
        prop_assert_eq!(&*service.snapshot(), &*first);
    }
}

// =============================================================================
// ADDRESS CANONICALIZATION
// =============================================================================

#[tokio::test]
async fn test_mixed_case_addresses_share_one_entry() {
    let upper = Address::parse("0xABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
    let lower = Address::parse("0xabcdef0123456789abcdef0123456789abcdef01").unwrap();

    let ledger = Arc::new(InMemoryLedger::new(employer()));
    let first = ledger.seed_job(employer(), "a", "b", Amount::new(1), true);
    let second = ledger.seed_job(employer(), "c", "d", Amount::new(1), true);
    ledger.seed_application(first, upper, "x").unwrap();
    ledger.seed_application(second, lower, "y").unwrap();
    ledger.set_reputation(lower, 3);

    let service = service_with(&ledger, BatchFailurePolicy::FailFast);
    service.full_resync().await.unwrap();
    service.full_resync().await.unwrap();

    assert_eq!(ledger.reputation_queries_for(&upper), 1);
    assert_eq!(service.snapshot().reputation_entries(), 1);
    assert_eq!(service.list_applications(first)[0].reputation, Some(3));
    assert_eq!(service.list_applications(second)[0].reputation, Some(3));
}

#[tokio::test]
async fn test_cached_reputation_is_not_refetched_by_resync() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    let id = ledger.seed_job(employer(), "a", "b", Amount::new(1), true);
    ledger.seed_application(id, addr(0xA1), "x").unwrap();

    let service = service_with(&ledger, BatchFailurePolicy::FailFast);
    service.full_resync().await.unwrap();
    ledger.set_reputation(addr(0xA1), 9);
    service.full_resync().await.unwrap();

    assert_eq!(service.list_applications(id)[0].reputation, Some(0));
    assert_eq!(
        service.synchronizer().refresh_reputation(addr(0xA1)).await.unwrap(),
        9
    );
    assert_eq!(service.list_applications(id)[0].reputation, Some(9));
}

// =============================================================================
// BATCH FAILURE POLICIES
// =============================================================================

#[tokio::test]
async fn test_fail_fast_application_error_keeps_previous_cache() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    let id = ledger.seed_job(employer(), "a", "b", Amount::new(1), true);
    ledger.seed_application(id, addr(0xA1), "x").unwrap();
    let service = service_with(&ledger, BatchFailurePolicy::FailFast);
    service.full_resync().await.unwrap();
    let before = service.snapshot();

    ledger.seed_application(id, addr(0xA2), "y").unwrap();
    ledger.fail_next_query(
        QueryKind::Applications,
        MarketplaceError::ConnectionError("reset".into()),
    );
    let result = service.synchronizer().resync_applications().await;
    assert!(matches!(result, Err(MarketplaceError::ConnectionError(_))));
    assert_eq!(*service.snapshot(), *before);
}

#[tokio::test]
async fn test_isolate_skips_failed_job_and_commits_the_rest() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    let first = ledger.seed_job(employer(), "a", "b", Amount::new(1), true);
    let second = ledger.seed_job(employer(), "c", "d", Amount::new(1), true);
    ledger.seed_application(first, addr(0xA1), "x").unwrap();
    let service = service_with(&ledger, BatchFailurePolicy::Isolate);
    service.full_resync().await.unwrap();

    ledger.seed_application(first, addr(0xA2), "y").unwrap();
    ledger.seed_application(second, addr(0xA3), "z").unwrap();
    ledger.fail_next_query(
        QueryKind::Applications,
        MarketplaceError::ConnectionError("reset".into()),
    );
    let report = service.synchronizer().resync_applications().await.unwrap();

    assert_eq!(report.failed_items.len(), 1);
    assert_eq!(service.list_applications(first).len(), 1);
    assert_eq!(service.list_applications(second).len(), 1);
}

#[tokio::test]
async fn test_isolate_commits_lists_when_reputation_read_fails() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    let id = ledger.seed_job(employer(), "a", "b", Amount::new(1), true);
    ledger.seed_application(id, addr(0xA1), "x").unwrap();
    let service = service_with(&ledger, BatchFailurePolicy::Isolate);
    service.full_resync().await.unwrap();

    ledger.seed_application(id, addr(0xA2), "y").unwrap();
    ledger.set_reputation(addr(0xA2), 6);
    ledger.fail_next_query(
        QueryKind::Reputation,
        MarketplaceError::ConnectionError("reset".into()),
    );
    let report = service.synchronizer().resync_applications().await.unwrap();

    assert_eq!(report.failed_items.len(), 1);
    assert!(!report.is_complete());
    assert_eq!(report.application_lists, 1);
    assert_eq!(report.reputations_fetched, 0);

    let listed = service.list_applications(id);
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].reputation, Some(0));
    assert_eq!(listed[1].reputation, None);
    assert_eq!(service.snapshot().reputation(&addr(0xA2)), None);

    service.synchronizer().resync_applications().await.unwrap();
    assert_eq!(service.list_applications(id)[1].reputation, Some(6));
}

#[tokio::test]
async fn test_event_replay_ledger_gives_same_read_model() {
    let aggregate = Arc::new(InMemoryLedger::new(employer()));
    let replay = Arc::new(
        InMemoryLedger::new(employer()).with_application_query(ApplicationQueryMode::EventReplay),
    );
    for ledger in [&aggregate, &replay] {
        let id = ledger.seed_job(employer(), "a", "b", Amount::new(1), true);
        ledger.seed_application(id, addr(0xA1), "x").unwrap();
        ledger.seed_application(id, addr(0xA2), "y").unwrap();
    }

    let left = service_with(&aggregate, BatchFailurePolicy::FailFast);
    let right = service_with(&replay, BatchFailurePolicy::FailFast);
    left.full_resync().await.unwrap();
    right.full_resync().await.unwrap();
    assert_eq!(*left.snapshot(), *right.snapshot());
}

#[tokio::test(start_paused = true)]
async fn test_retrying_client_absorbs_transient_errors() {
    let inner = InMemoryLedger::new(employer());
    inner.seed_job(employer(), "a", "b", Amount::new(1), true);
    inner.fail_job_query(JobId::new(1), MarketplaceError::ConnectionError("reset".into()));
    inner.fail_next_query(
        QueryKind::JobCount,
        MarketplaceError::ConnectionError("reset".into()),
    );

    let config = MarketplaceConfig::for_testing();
    let policy = RetryPolicy {
        extra_attempts: 2,
        ..RetryPolicy::from_config(&config)
    };
    let ledger = Arc::new(RetryingLedgerClient::new(inner.clone(), policy));
    let service = MarketplaceService::new(ledger, config);

    assert!(matches!(
        service.full_resync().await,
        Err(MarketplaceError::ConnectionError(_))
    ));
    assert_eq!(inner.query_count(QueryKind::Job), 3);

    inner.clear_query_faults();
    service.full_resync().await.unwrap();
    assert_eq!(open_ids(&service), vec![1]);
}

// =============================================================================
// OPTIMISTIC UPDATES
// =============================================================================

#[tokio::test]
async fn test_posted_job_visible_then_confirmed_without_duplicate() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    ledger.seed_job(employer(), "old", "existing", Amount::new(1), true);
    let service = service_with(&ledger, BatchFailurePolicy::FailFast);
    service.full_resync().await.unwrap();

    let job = service
        .post_job(JobPosting::new("new", "fresh", Amount::new(25)))
        .await
        .unwrap();
    assert_eq!(job.id, JobId::new(2));
    assert_eq!(open_ids(&service), vec![1, 2]);
    assert_eq!(ledger.query_count(QueryKind::Job), 1);
    assert!(service
        .snapshot()
        .sync_state()
        .provisional_jobs
        .contains(&job.id));

    service.synchronizer().full_resync_jobs().await.unwrap();
    assert_eq!(open_ids(&service), vec![1, 2]);
    assert_eq!(service.list_open_jobs()[1], job);
    assert!(service.snapshot().sync_state().provisional_jobs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_post_job_timeout_synthesizes_nothing() {
    use jb_marketplace_sync::{Fault, SubmitKind};

    let ledger = Arc::new(InMemoryLedger::new(employer()));
    ledger.inject_submit_fault(SubmitKind::PostJob, Fault::WithholdFinality { commit: true });
    let service = service_with(&ledger, BatchFailurePolicy::FailFast);

    let result = service
        .post_job(JobPosting::new("new", "fresh", Amount::new(25)))
        .await;
    assert!(result.as_ref().is_err_and(MarketplaceError::is_outcome_unknown));
    assert!(service.list_open_jobs().is_empty());

    service.full_resync().await.unwrap();
    assert_eq!(open_ids(&service), vec![1]);
}

#[tokio::test]
async fn test_apply_refreshes_only_that_job() {
    let ledger = Arc::new(InMemoryLedger::new(employer()));
    let first = ledger.seed_job(employer(), "a", "b", Amount::new(1), true);
    let second = ledger.seed_job(employer(), "c", "d", Amount::new(1), true);
    let service = service_with(&ledger, BatchFailurePolicy::FailFast);
    service.full_resync().await.unwrap();
    ledger.seed_application(second, addr(0xA2), "sneaky").unwrap();

    let worker = Arc::new(ledger.as_account(addr(0xA1)));
    let worker_service = MarketplaceService::new(Arc::clone(&worker), MarketplaceConfig::for_testing());
    worker_service.full_resync().await.unwrap();
    let applications_before = ledger.query_count(QueryKind::Applications);

    worker_service.apply(first, "hire me".to_string()).await.unwrap();
    assert_eq!(ledger.query_count(QueryKind::Applications), applications_before + 1);

    let scored = worker_service.list_applications(first);
    assert_eq!(scored.len(), 1);
    assert_eq!(scored[0].application.applicant, addr(0xA1));
    assert_eq!(scored[0].index, 0);
    assert!(service.list_applications(first).is_empty());
}
