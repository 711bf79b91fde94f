//! # Application Layer
//!
//! Read-model cache, synchronizer, optimistic updates and the accept
//! workflow, assembled by [`MarketplaceService`].

pub mod batch;
pub mod cache;
pub mod optimistic;
pub mod service;
pub mod synchronizer;
pub mod workflow;

pub use batch::{run_batch, BatchOutcome};
pub use cache::{CacheSnapshot, ReadModelCache, SyncState};
pub use optimistic::OptimisticLayer;
pub use service::MarketplaceService;
pub use synchronizer::Synchronizer;
pub use workflow::AcceptanceWorkflow;
