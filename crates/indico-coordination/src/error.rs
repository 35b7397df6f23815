//! Error types for replica coordination

use crate::singleton::PlacementPhase;

/// Shared record store failure
///
/// Always transient: the pass that hit it is abandoned and retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// Store refused the operation
    #[error("record store rejected write to {key}: {reason}")]
    Rejected {
        /// Key being written
        key: String,
        /// Reason given by the store
        reason: String,
    },
}

/// A create-once write found the key already set by a peer
///
/// Expected outcome of a race won by another replica; callers adopt
/// `stored`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lost race for {key}: value already stored by a peer")]
pub struct RaceLostError {
    /// Contended key
    pub key: String,
    /// Value the winner stored
    pub stored: String,
}

/// Secret vault failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    /// Vault could not be reached
    #[error("secret vault unavailable: {0}")]
    Unavailable(String),

    /// Referenced secret does not exist
    #[error("secret {0} not found in vault")]
    NotFound(String),
}

/// Coordination pass failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    /// Record store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Secret vault failure
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Conditional writes kept losing
    #[error("gave up writing {key} after {attempts} conflicting attempts")]
    Contention {
        /// Contended key
        key: String,
        /// Attempts made
        attempts: u32,
    },

    /// Worker placement tried an undefined transition
    #[error("illegal worker placement transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current phase
        from: PlacementPhase,
        /// Requested phase
        to: PlacementPhase,
    },
}

impl CoordinationError {
    /// Check if a later pass may succeed without outside intervention
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(_) | Self::Contention { .. } => true,
            Self::Vault(err) => matches!(err, VaultError::Unavailable(_)),
            Self::IllegalTransition { .. } => false,
        }
    }
}
