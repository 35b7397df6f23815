//! Error types for the reconciliation driver
//!
//! Validation and readiness problems never appear here: the driver turns
//! them into a blocked or waiting status. What remains is:
//! - [`TransientApplyError`]: the pass was abandoned and will be retried
//! - [`PhaseError`]: the driver attempted an undefined phase transition
//! - [`ActionError`]: an admin action could not run

use crate::phase::DriverPhase;
use indico_coordination::CoordinationError;
use indico_topology::TopologyError;

/// Container runtime failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Container cannot be reached
    #[error("container {0} is unreachable")]
    Unreachable(String),

    /// Layer was not accepted
    #[error("failed to apply layer to {container}: {reason}")]
    ApplyFailed {
        /// Container name
        container: String,
        /// Runtime explanation
        reason: String,
    },

    /// Command could not be started
    #[error("failed to run command in {container}: {reason}")]
    ExecFailed {
        /// Container name
        container: String,
        /// Runtime explanation
        reason: String,
    },
}

/// Dependency source failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency source unavailable: {0}")]
pub struct SourceError(pub String);

/// A collaborator failed transiently; nothing was committed
#[derive(Debug, thiserror::Error)]
pub enum TransientApplyError {
    /// Dependency payloads could not be read
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Shared record store or vault failed
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Runtime boundary failed
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Undefined driver phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal driver transition: {from:?} -> {to:?}")]
pub struct PhaseError {
    /// Current phase
    pub from: DriverPhase,
    /// Requested phase
    pub to: DriverPhase,
}

/// Reconciliation pass failure
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Abandoned; retried on the next trigger
    #[error("transient failure, pass abandoned: {0}")]
    TransientApply(#[from] TransientApplyError),

    /// Driver bug
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Topology could not be rendered
    #[error(transparent)]
    Render(#[from] TopologyError),
}

impl ReconcileError {
    /// Check if the next trigger may succeed without any input change
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientApply(TransientApplyError::Coordination(err)) => err.is_transient(),
            Self::TransientApply(_) => true,
            Self::Phase(_) | Self::Render(_) => false,
        }
    }
}

impl From<CoordinationError> for ReconcileError {
    fn from(err: CoordinationError) -> Self {
        Self::TransientApply(err.into())
    }
}

impl From<RuntimeError> for ReconcileError {
    fn from(err: RuntimeError) -> Self {
        Self::TransientApply(err.into())
    }
}

impl From<SourceError> for ReconcileError {
    fn from(err: SourceError) -> Self {
        Self::TransientApply(err.into())
    }
}

/// Admin action failure
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Configuration is not usable yet
    #[error("{0}")]
    NotReady(String),

    /// Workload container cannot be reached
    #[error("Waiting to be able to connect to workload container")]
    Unreachable,

    /// Input rejected before running anything
    #[error("{0}")]
    Rejected(String),

    /// Command ran and failed
    #[error("{0}")]
    Failed(String),

    /// Collaborator failed
    #[error(transparent)]
    Transient(#[from] TransientApplyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use indico_coordination::StoreError;

    #[test]
    fn runtime_failures_are_retryable() {
        let err = ReconcileError::from(RuntimeError::Unreachable("indico".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn store_failures_are_retryable() {
        let err = ReconcileError::from(CoordinationError::from(StoreError::Unavailable("down".into())));
        assert!(err.is_retryable());
    }

    #[test]
    fn phase_errors_are_not_retryable() {
        let err = ReconcileError::from(PhaseError {
            from: DriverPhase::Idle,
            to: DriverPhase::Applying,
        });
        assert!(!err.is_retryable());
    }
}
