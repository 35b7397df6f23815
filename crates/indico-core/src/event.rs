//! Reconciliation triggers

use indico_config::{Channel, OperatorConfig};
use indico_coordination::{ReplicaId, ReplicaRole};
use std::fmt;

/// External event that starts a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// A dependency published new data
    DependencyChanged(Channel),
    /// Operator options changed
    ConfigChanged(OperatorConfig),
    /// The external election changed our role
    RoleChanged(ReplicaRole),
    /// A peer replica joined
    PeerJoined(ReplicaId),
    /// A peer replica is departing (possibly ourselves)
    PeerDeparted(ReplicaId),
    /// Re-derive and re-apply everything, refreshing cached values
    ReapplyRequested,
}

impl fmt::Display for ReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyChanged(channel) => write!(f, "dependency-changed({channel})"),
            Self::ConfigChanged(_) => f.write_str("config-changed"),
            Self::RoleChanged(role) => write!(f, "role-changed({role})"),
            Self::PeerJoined(peer) => write!(f, "peer-joined({peer})"),
            Self::PeerDeparted(peer) => write!(f, "peer-departed({peer})"),
            Self::ReapplyRequested => f.write_str("reapply"),
        }
    }
}
