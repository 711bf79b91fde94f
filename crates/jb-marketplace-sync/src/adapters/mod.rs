//! # Adapters
//!
//! `LedgerClient` implementations: an in-process reference ledger and a
//! read-retrying decorator.

pub mod in_memory_ledger;
pub mod retrying_client;

pub use in_memory_ledger::{
    ApplicationQueryMode, Fault, FixtureApplication, FixtureJob, InMemoryLedger, LedgerEvent,
    LedgerFixture, QueryKind, ReputationRule, SubmitKind,
};
pub use retrying_client::{RetryPolicy, RetryingLedgerClient};
