//! # Domain Value Objects
//!
//! Immutable value types: addresses, ids, amounts, sync reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::MarketplaceError;

/// Byte length of a ledger address.
pub const ADDRESS_LEN: usize = 20;

/// Ledger account address.
///
/// Stored as raw bytes so there is exactly one encoding: `"0xABC..."` and
/// `"0xabc..."` parse to the same value, compare equal and hash equal.
/// Rendered lowercase with a `0x` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Build from raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a hex address, with or without `0x`, in any letter case.
    pub fn parse(raw: &str) -> Result<Self, MarketplaceError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if body.len() != ADDRESS_LEN * 2 {
            return Err(MarketplaceError::InvalidAddress(format!(
                "expected {} hex digits, got {} in {:?}",
                ADDRESS_LEN * 2,
                body.len(),
                raw
            )));
        }

        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(body, &mut bytes)
            .map_err(|e| MarketplaceError::InvalidAddress(format!("{:?}: {}", raw, e)))?;
        Ok(Self(bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = MarketplaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

/// Ledger-assigned job id. Dense, starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Wrap a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Ids `1..=count` in ascending order.
    pub fn range_to(count: u64) -> impl Iterator<Item = JobId> {
        (1..=count).map(JobId)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payment amount in the ledger's smallest unit.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    /// Zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw amount.
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Raw amount.
    pub const fn get(self) -> u128 {
        self.0
    }

    /// Subtract, returning `None` on underflow.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Add, saturating at the maximum.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which resync produced a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncScope {
    /// `full_resync_jobs`
    Jobs,
    /// `resync_applications` over every indexed job
    Applications,
    /// Applications of a single job
    JobApplications(JobId),
    /// Jobs followed by applications
    Full,
}

/// Outcome of one resync run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Resync that ran.
    pub scope: SyncScope,
    /// Job ids read from the ledger.
    pub jobs_scanned: u64,
    /// Active jobs now in the index.
    pub jobs_retained: usize,
    /// Application lists replaced.
    pub application_lists: usize,
    /// Reputation entries newly fetched.
    pub reputations_fetched: usize,
    /// Items skipped under the isolate policy, with the reason.
    pub failed_items: Vec<String>,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl SyncReport {
    /// Empty report for a scope.
    pub fn new(scope: SyncScope) -> Self {
        Self {
            scope,
            jobs_scanned: 0,
            jobs_retained: 0,
            application_lists: 0,
            reputations_fetched: 0,
            failed_items: Vec::new(),
            duration_ms: 0,
        }
    }

    /// True when no item was skipped.
    pub fn is_complete(&self) -> bool {
        self.failed_items.is_empty()
    }

    /// Fold a later report into this one.
    pub fn merge(mut self, other: SyncReport) -> Self {
        self.jobs_scanned += other.jobs_scanned;
        self.jobs_retained = self.jobs_retained.max(other.jobs_retained);
        self.application_lists += other.application_lists;
        self.reputations_fetched += other.reputations_fetched;
        self.failed_items.extend(other.failed_items);
        self.duration_ms += other.duration_ms;
        self
    }
}
