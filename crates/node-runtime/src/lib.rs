//! # Node Runtime Library
//!
//! This library exposes the internals of the `jobboard-node` binary for
//! testing. The main entry point is the `main.rs` binary.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (from env)
//! 2. Initialize telemetry
//! 3. Seed the in-memory ledger from a fixture
//! 4. Full resync of the read model
//! 5. Print the read model, then exit or keep resyncing

#![warn(missing_docs)]

pub mod config;
pub mod fixture;
pub mod runtime;

pub use config::NodeConfig;
pub use fixture::{load_fixture, parse_fixture, seed_ledger, FixtureError, SAMPLE_LEDGER};
pub use runtime::{JobView, NodeLedger, NodeRuntime, ReadModelView};
