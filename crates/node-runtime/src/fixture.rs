//! # Ledger Fixtures
//!
//! Loads the JSON description of the ledger the node starts from.

use std::fs;
use std::path::{Path, PathBuf};

use jb_marketplace_sync::{InMemoryLedger, LedgerFixture, MarketplaceError};
use thiserror::Error;

/// Ledger shipped with the binary.
pub const SAMPLE_LEDGER: &str = include_str!("../fixtures/sample_ledger.json");

/// Fixture loading errors.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// File could not be read.
    #[error("cannot read ledger fixture {path}: {source}")]
    Read {
        /// Fixture path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Contents are not a valid fixture.
    #[error("malformed ledger fixture: {0}")]
    Parse(#[from] serde_json::Error),

    /// Fixture references a missing job or application.
    #[error("inconsistent ledger fixture: {0}")]
    Seed(#[from] MarketplaceError),
}

/// Parse a fixture from JSON text.
pub fn parse_fixture(json: &str) -> Result<LedgerFixture, FixtureError> {
    Ok(serde_json::from_str(json)?)
}

/// Read a fixture from `path`, or the built-in sample when `None`.
pub fn load_fixture(path: Option<&Path>) -> Result<LedgerFixture, FixtureError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|source| FixtureError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            parse_fixture(&json)
        }
        None => parse_fixture(SAMPLE_LEDGER),
    }
}

/// Seed an in-memory ledger from a fixture.
pub fn seed_ledger(fixture: LedgerFixture) -> Result<InMemoryLedger, FixtureError> {
    Ok(InMemoryLedger::from_fixture(fixture)?)
}
