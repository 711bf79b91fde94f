//! # JB Marketplace Sync
//!
//! Local read model of a job marketplace kept consistent with an external,
//! append-only ledger, plus the accept-application workflow.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Project jobs, applications and reputation scores into an in-memory
//!   cache that can be rebuilt from the ledger at any time
//! - Reconcile that cache after every finalized mutation
//! - Drive acceptance as one atomic mutation or as two independently
//!   committed ones, reporting a partial outcome explicitly
//!
//! ## Consistency Rules
//!
//! | Rule | Enforced by |
//! |------|-------------|
//! | Single cache writer | `Synchronizer` (cache mutators are crate-private) |
//! | No torn reads | Readers hold immutable `CacheSnapshot`s |
//! | One batch failure policy | `BatchFailurePolicy`, fixed per service |
//! | One accept per job at a time | `AcceptanceWorkflow` in-flight set |
//! | Timeout is not failure | `MarketplaceError::is_outcome_unknown` |
//!
//! ## Module Structure
//!
//! ```text
//! jb-marketplace-sync/
//! ├── domain/          # Job, Application, Address, acceptance state machine, errors
//! ├── ports/           # MarketplaceApi (inbound) + LedgerClient (outbound)
//! ├── adapters/        # InMemoryLedger, RetryingLedgerClient
//! ├── application/     # cache, synchronizer, optimistic layer, workflow, service
//! ├── config.rs        # MarketplaceConfig
//! └── metrics.rs       # Prometheus metrics (feature "metrics")
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;

// Re-exports
pub use adapters::{
    ApplicationQueryMode, Fault, InMemoryLedger, LedgerEvent, LedgerFixture, QueryKind,
    ReputationRule, RetryPolicy, RetryingLedgerClient, SubmitKind,
};
pub use application::{
    AcceptanceWorkflow, CacheSnapshot, MarketplaceService, OptimisticLayer, ReadModelCache,
    SyncState, Synchronizer,
};
pub use config::{BatchFailurePolicy, MarketplaceConfig};
pub use domain::{
    Address, Amount, Application, Job, JobId, JobPosting, ScoredApplication,
    AcceptanceEvent, AcceptanceMachine, AcceptanceMode, AcceptanceOutcome, AcceptanceState,
    FailureKind, PartialFailure, PartialReason,
    MarketplaceError, MarketplaceResult, SyncReport, SyncScope,
    DEFAULT_FINALITY_TIMEOUT_MS, DEFAULT_REPUTATION_DELTA,
};
pub use ports::{FinalityNotifier, LedgerClient, MarketplaceApi, MutationHandle, MutationId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
