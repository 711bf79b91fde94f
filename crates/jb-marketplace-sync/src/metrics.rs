//! # Marketplace Metrics
//!
//! Prometheus metrics for resyncs and the accept workflow.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! jb-marketplace-sync = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `jb_resync_runs_total{scope, outcome}` - Resync runs (outcome: ok/partial/aborted)
//! - `jb_ledger_reads_total{kind}` - Remote reads issued by the synchronizer
//! - `jb_acceptance_outcomes_total{mode, outcome}` - Accept workflows (full/partial/failed)
//! - `jb_provisional_jobs_total` - Jobs synthesized after `post_job`
//! - `jb_open_jobs` - Size of the open-jobs index after the last write

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Gauge, IntCounter,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Resync runs by scope and outcome
    pub static ref RESYNC_RUNS: CounterVec = register_counter_vec!(
        "jb_resync_runs_total",
        "Total resync runs",
        &["scope", "outcome"]
    )
    .expect("Failed to create RESYNC_RUNS metric");

    /// Remote reads by kind
    pub static ref LEDGER_READS: CounterVec = register_counter_vec!(
        "jb_ledger_reads_total",
        "Total ledger reads issued by the synchronizer",
        &["kind"]
    )
    .expect("Failed to create LEDGER_READS metric");

    /// Accept workflow outcomes by mode and outcome
    pub static ref ACCEPTANCE_OUTCOMES: CounterVec = register_counter_vec!(
        "jb_acceptance_outcomes_total",
        "Total accept-application workflows",
        &["mode", "outcome"]
    )
    .expect("Failed to create ACCEPTANCE_OUTCOMES metric");

    /// Jobs synthesized locally after post_job finality
    pub static ref PROVISIONAL_JOBS: IntCounter = register_int_counter!(
        "jb_provisional_jobs_total",
        "Total jobs synthesized after post_job finality"
    )
    .expect("Failed to create PROVISIONAL_JOBS metric");

    /// Open jobs in the index
    pub static ref OPEN_JOBS: Gauge = register_gauge!(
        "jb_open_jobs",
        "Number of jobs in the open-jobs index"
    )
    .expect("Failed to create OPEN_JOBS metric");
}

/// Record a resync run
#[cfg(feature = "metrics")]
pub fn record_resync(scope: &str, outcome: &str) {
    RESYNC_RUNS.with_label_values(&[scope, outcome]).inc();
}

/// Record remote reads
#[cfg(feature = "metrics")]
pub fn record_ledger_reads(kind: &str, count: u64) {
    LEDGER_READS.with_label_values(&[kind]).inc_by(count as f64);
}

/// Record an accept workflow outcome
#[cfg(feature = "metrics")]
pub fn record_acceptance(mode: &str, outcome: &str) {
    ACCEPTANCE_OUTCOMES.with_label_values(&[mode, outcome]).inc();
}

/// Record a synthesized job
#[cfg(feature = "metrics")]
pub fn record_provisional_job() {
    PROVISIONAL_JOBS.inc();
}

/// Update the open-jobs gauge
#[cfg(feature = "metrics")]
pub fn set_open_jobs(count: usize) {
    OPEN_JOBS.set(count as f64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_resync(_scope: &str, _outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_ledger_reads(_kind: &str, _count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_acceptance(_mode: &str, _outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_provisional_job() {}

#[cfg(not(feature = "metrics"))]
pub fn set_open_jobs(_count: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_callable() {
        record_resync("jobs", "ok");
        record_ledger_reads("job", 3);
        record_acceptance("atomic", "full");
        record_provisional_job();
        set_open_jobs(2);
    }
}
