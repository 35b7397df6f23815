//! Driver phases and their allowed transitions

use crate::error::PhaseError;
use serde::Serialize;

/// Where the driver is within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DriverPhase {
    /// Between passes
    Idle,
    /// Reading dependency payloads
    Gathering,
    /// Building the snapshot and checking readiness
    Validating,
    /// Invalid configuration; waiting for the input to change
    Blocked,
    /// Snapshot valid and mandatory dependencies present
    Ready,
    /// Pushing layers to the runtime
    Applying,
}

/// Phases reachable from `from`
///
/// Every non-idle phase may fall back to `Idle` when the pass ends early.
#[must_use]
pub fn allowed_transitions(from: DriverPhase) -> Vec<DriverPhase> {
    use DriverPhase::{Applying, Blocked, Gathering, Idle, Ready, Validating};
    match from {
        Idle => vec![Gathering],
        Gathering => vec![Validating, Blocked, Idle],
        Validating => vec![Blocked, Ready, Idle],
        Blocked => vec![Idle],
        Ready => vec![Applying, Idle],
        Applying => vec![Idle],
    }
}

/// Validate a phase transition
///
/// # Errors
/// Returns [`PhaseError`] when `to` is not reachable from `from`.
pub fn validate_transition(from: DriverPhase, to: DriverPhase) -> Result<(), PhaseError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PhaseError { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn phase() -> impl Strategy<Value = DriverPhase> {
        prop_oneof![
            Just(DriverPhase::Idle),
            Just(DriverPhase::Gathering),
            Just(DriverPhase::Validating),
            Just(DriverPhase::Blocked),
            Just(DriverPhase::Ready),
            Just(DriverPhase::Applying),
        ]
    }

    #[test]
    fn happy_path_is_allowed() {
        use DriverPhase::*;
        for (from, to) in [
            (Idle, Gathering),
            (Gathering, Validating),
            (Validating, Ready),
            (Ready, Applying),
            (Applying, Idle),
        ] {
            assert!(validate_transition(from, to).is_ok(), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn cannot_skip_validation() {
        assert!(validate_transition(DriverPhase::Gathering, DriverPhase::Ready).is_err());
        assert!(validate_transition(DriverPhase::Idle, DriverPhase::Applying).is_err());
    }

    proptest! {
        #[test]
        fn every_phase_returns_to_idle(from in phase()) {
            prop_assume!(from != DriverPhase::Idle);
            prop_assert!(validate_transition(from, DriverPhase::Idle).is_ok());
        }
    }
}
