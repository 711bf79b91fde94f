//! # Accept-Application State Machine
//!
//! ```text
//! [Pending] ──submit──→ [PaymentSubmitted] ──final──→ [PaymentConfirmed]
//!     │                        │                          │
//!     └──────── fail ──────────┴──→ [Failed(kind)]        │
//!                                                         │
//!   Atomic:    [PaymentConfirmed] ──complete──→ [Done]
//!
//!   Decoupled: [PaymentConfirmed] ──submit──→ [ReputationSubmitted] ──final──→ [ReputationConfirmed] ──complete──→ [Done]
//!                     │                               │
//!                     └──────────── fail ─────────────┴──→ [Partial(reason)]
//! ```
//!
//! Once payment is confirmed it cannot be rolled back, so nothing after
//! `PaymentConfirmed` may lead to `Failed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::{MarketplaceError, MarketplaceResult};
use super::value_objects::{Address, JobId};

/// How acceptance is committed on the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcceptanceMode {
    /// One mutation pays, accepts, deactivates and bumps reputation.
    #[default]
    Atomic,
    /// Payment/acceptance first, reputation increment as a second mutation.
    Decoupled,
}

impl FromStr for AcceptanceMode {
    type Err = MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(AcceptanceMode::Atomic),
            "decoupled" | "two-phase" => Ok(AcceptanceMode::Decoupled),
            other => Err(MarketplaceError::InvalidInput(format!(
                "unknown acceptance mode {:?}",
                other
            ))),
        }
    }
}

/// Why a workflow failed before payment was confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Job or application missing.
    NotFound,
    /// Ledger refused the mutation.
    ValidationRejected(String),
    /// Finality not observed; ledger state unknown until the next resync.
    Timeout,
    /// Transport failure.
    ConnectionError(String),
    /// Anything else (another workflow in flight, inconsistent data).
    Other(String),
}

impl From<&MarketplaceError> for FailureKind {
    fn from(err: &MarketplaceError) -> Self {
        match err {
            MarketplaceError::JobNotFound(_) | MarketplaceError::ApplicationNotFound { .. } => {
                FailureKind::NotFound
            }
            MarketplaceError::ValidationRejected(reason) => {
                FailureKind::ValidationRejected(reason.clone())
            }
            MarketplaceError::Timeout { .. } => FailureKind::Timeout,
            MarketplaceError::ConnectionError(reason) => {
                FailureKind::ConnectionError(reason.clone())
            }
            other => FailureKind::Other(other.to_string()),
        }
    }
}

/// Why the reputation phase of a decoupled acceptance did not complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialReason {
    /// Ledger refused the reputation increment.
    ValidationRejected(String),
    /// Finality of the increment not observed; it may still land.
    Timeout,
    /// Transport failure before or while submitting.
    ConnectionError(String),
    /// Applicant could not be determined after payment.
    Other(String),
}

impl From<&MarketplaceError> for PartialReason {
    fn from(err: &MarketplaceError) -> Self {
        match err {
            MarketplaceError::ValidationRejected(reason) => {
                PartialReason::ValidationRejected(reason.clone())
            }
            MarketplaceError::Timeout { .. } => PartialReason::Timeout,
            MarketplaceError::ConnectionError(reason) => {
                PartialReason::ConnectionError(reason.clone())
            }
            other => PartialReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PartialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialReason::ValidationRejected(reason) => write!(f, "rejected: {}", reason),
            PartialReason::Timeout => write!(f, "timeout"),
            PartialReason::ConnectionError(reason) => write!(f, "connection: {}", reason),
            PartialReason::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Payment committed, reputation increment outstanding.
///
/// Retry through `reconcile_reputation`: the applicant is owed
/// `baseline + pending_delta`, and only the part the ledger does not show yet
/// is submitted, so retrying twice never credits twice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    /// Job whose application was accepted.
    pub job_id: JobId,
    /// Applicant still owed the increment.
    pub applicant: Address,
    /// Increment that was attempted.
    pub pending_delta: u64,
    /// Applicant's ledger score read before the payment was submitted.
    pub baseline: u64,
    /// What went wrong.
    pub reason: PartialReason,
}

impl PartialFailure {
    /// Score the applicant should reach once the increment lands.
    pub fn target_score(&self) -> u64 {
        self.baseline.saturating_add(self.pending_delta)
    }
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} paid, reputation +{} for {} not confirmed ({})",
            self.job_id, self.pending_delta, self.applicant, self.reason
        )
    }
}

/// Result of a completed accept workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptanceOutcome {
    /// Every step committed.
    Full,
    /// Payment committed, reputation did not.
    Partial(PartialFailure),
}

impl AcceptanceOutcome {
    /// True for [`AcceptanceOutcome::Full`].
    pub fn is_full(&self) -> bool {
        matches!(self, AcceptanceOutcome::Full)
    }

    /// Convert a partial outcome into `MarketplaceError::PartialFailure`.
    pub fn into_result(self) -> MarketplaceResult<()> {
        match self {
            AcceptanceOutcome::Full => Ok(()),
            AcceptanceOutcome::Partial(partial) => Err(MarketplaceError::PartialFailure(partial)),
        }
    }
}

/// Workflow state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptanceState {
    /// Nothing sent yet.
    Pending,
    /// Payment/acceptance mutation sent.
    PaymentSubmitted,
    /// Payment/acceptance final on the ledger.
    PaymentConfirmed,
    /// Reputation increment sent (decoupled only).
    ReputationSubmitted,
    /// Reputation increment final (decoupled only).
    ReputationConfirmed,
    /// Terminal success.
    Done,
    /// Terminal failure, no ledger state changed (or outcome unknown on timeout).
    Failed(FailureKind),
    /// Terminal partial success (decoupled only).
    Partial(PartialReason),
}

impl AcceptanceState {
    /// True for `Done`, `Failed` and `Partial`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcceptanceState::Done | AcceptanceState::Failed(_) | AcceptanceState::Partial(_)
        )
    }
}

/// Events driving the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptanceEvent {
    /// Payment mutation handed to the ledger.
    PaymentSubmitted,
    /// Payment mutation final.
    PaymentFinalized,
    /// Reputation mutation handed to the ledger.
    ReputationSubmitted,
    /// Reputation mutation final.
    ReputationFinalized,
    /// Reputation step failed after payment.
    ReputationFailed(PartialReason),
    /// Workflow aborted before payment was confirmed.
    Failed(FailureKind),
    /// Remaining bookkeeping done.
    Completed,
}

/// Deterministic accept-application state machine.
#[derive(Debug, Clone)]
pub struct AcceptanceMachine {
    mode: AcceptanceMode,
    state: AcceptanceState,
    history: Vec<AcceptanceState>,
}

impl AcceptanceMachine {
    /// Start in `Pending`.
    pub fn new(mode: AcceptanceMode) -> Self {
        Self {
            mode,
            state: AcceptanceState::Pending,
            history: vec![AcceptanceState::Pending],
        }
    }

    /// Current state.
    pub fn state(&self) -> &AcceptanceState {
        &self.state
    }

    /// Every state visited, starting with `Pending`.
    pub fn history(&self) -> &[AcceptanceState] {
        &self.history
    }

    /// Configured mode.
    pub fn mode(&self) -> AcceptanceMode {
        self.mode
    }

    /// Apply an event.
    ///
    /// # Errors
    /// `InvalidTransition` if the event is not allowed in the current state
    /// and mode. The state is left unchanged.
    pub fn process_event(&mut self, event: AcceptanceEvent) -> MarketplaceResult<&AcceptanceState> {
        let next = self
            .next_state(&event)
            .ok_or_else(|| MarketplaceError::InvalidTransition {
                from: format!("{:?}", self.state),
                event: format!("{:?}", event),
            })?;
        self.state = next.clone();
        self.history.push(next);
        Ok(&self.state)
    }

    fn next_state(&self, event: &AcceptanceEvent) -> Option<AcceptanceState> {
        use AcceptanceEvent as E;
        use AcceptanceState as S;

        match (&self.state, event) {
            (S::Pending, E::PaymentSubmitted) => Some(S::PaymentSubmitted),
            (S::PaymentSubmitted, E::PaymentFinalized) => Some(S::PaymentConfirmed),
            (S::Pending | S::PaymentSubmitted, E::Failed(kind)) => Some(S::Failed(kind.clone())),

            (S::PaymentConfirmed, E::Completed) if self.mode == AcceptanceMode::Atomic => {
                Some(S::Done)
            }

            (S::PaymentConfirmed, E::ReputationSubmitted)
                if self.mode == AcceptanceMode::Decoupled =>
            {
                Some(S::ReputationSubmitted)
            }
            (S::PaymentConfirmed | S::ReputationSubmitted, E::ReputationFailed(reason))
                if self.mode == AcceptanceMode::Decoupled =>
            {
                Some(S::Partial(reason.clone()))
            }
            (S::ReputationSubmitted, E::ReputationFinalized) => Some(S::ReputationConfirmed),
            (S::ReputationConfirmed, E::Completed) => Some(S::Done),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(mode: AcceptanceMode, events: Vec<AcceptanceEvent>) -> AcceptanceMachine {
        let mut machine = AcceptanceMachine::new(mode);
        for event in events {
            machine.process_event(event).unwrap();
        }
        machine
    }

    #[test]
    fn test_atomic_happy_path() {
        let machine = run(
            AcceptanceMode::Atomic,
            vec![
                AcceptanceEvent::PaymentSubmitted,
                AcceptanceEvent::PaymentFinalized,
                AcceptanceEvent::Completed,
            ],
        );
        assert_eq!(machine.state(), &AcceptanceState::Done);
        assert_eq!(machine.history().len(), 4);
    }

    #[test]
    fn test_decoupled_happy_path() {
        let machine = run(
            AcceptanceMode::Decoupled,
            vec![
                AcceptanceEvent::PaymentSubmitted,
                AcceptanceEvent::PaymentFinalized,
                AcceptanceEvent::ReputationSubmitted,
                AcceptanceEvent::ReputationFinalized,
                AcceptanceEvent::Completed,
            ],
        );
        assert_eq!(machine.state(), &AcceptanceState::Done);
        assert!(machine
            .history()
            .contains(&AcceptanceState::ReputationConfirmed));
    }

    #[test]
    fn test_payment_timeout_fails() {
        let machine = run(
            AcceptanceMode::Decoupled,
            vec![
                AcceptanceEvent::PaymentSubmitted,
                AcceptanceEvent::Failed(FailureKind::Timeout),
            ],
        );
        assert_eq!(machine.state(), &AcceptanceState::Failed(FailureKind::Timeout));
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_reputation_timeout_is_partial() {
        let machine = run(
            AcceptanceMode::Decoupled,
            vec![
                AcceptanceEvent::PaymentSubmitted,
                AcceptanceEvent::PaymentFinalized,
                AcceptanceEvent::ReputationSubmitted,
                AcceptanceEvent::ReputationFailed(PartialReason::Timeout),
            ],
        );
        assert_eq!(machine.state(), &AcceptanceState::Partial(PartialReason::Timeout));
    }

    #[test]
    fn test_failed_not_reachable_after_payment_confirmed() {
        let mut machine = run(
            AcceptanceMode::Decoupled,
            vec![
                AcceptanceEvent::PaymentSubmitted,
                AcceptanceEvent::PaymentFinalized,
            ],
        );
        let result = machine.process_event(AcceptanceEvent::Failed(FailureKind::Timeout));
        assert!(matches!(
            result,
            Err(MarketplaceError::InvalidTransition { .. })
        ));
        assert_eq!(machine.state(), &AcceptanceState::PaymentConfirmed);
    }

    #[test]
    fn test_atomic_has_no_reputation_phase() {
        let mut machine = run(
            AcceptanceMode::Atomic,
            vec![
                AcceptanceEvent::PaymentSubmitted,
                AcceptanceEvent::PaymentFinalized,
            ],
        );
        assert!(machine
            .process_event(AcceptanceEvent::ReputationSubmitted)
            .is_err());
        assert!(machine
            .process_event(AcceptanceEvent::ReputationFailed(PartialReason::Timeout))
            .is_err());
    }

    #[test]
    fn test_terminal_states_absorb_nothing() {
        let mut machine = run(
            AcceptanceMode::Atomic,
            vec![AcceptanceEvent::Failed(FailureKind::NotFound)],
        );
        assert!(machine
            .process_event(AcceptanceEvent::PaymentSubmitted)
            .is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("atomic".parse::<AcceptanceMode>().unwrap(), AcceptanceMode::Atomic);
        assert_eq!(
            "Decoupled".parse::<AcceptanceMode>().unwrap(),
            AcceptanceMode::Decoupled
        );
        assert!("both".parse::<AcceptanceMode>().is_err());
    }

    #[test]
    fn test_partial_outcome_into_result() {
        let partial = PartialFailure {
            job_id: JobId::new(1),
            applicant: Address::from_bytes([0xA1; 20]),
            pending_delta: 1,
            baseline: 4,
            reason: PartialReason::Timeout,
        };
        assert_eq!(partial.target_score(), 5);
        let err = AcceptanceOutcome::Partial(partial.clone())
            .into_result()
            .unwrap_err();
        assert_eq!(err, MarketplaceError::PartialFailure(partial));
        assert!(AcceptanceOutcome::Full.into_result().is_ok());
    }
}
