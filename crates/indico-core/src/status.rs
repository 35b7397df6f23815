//! Externally visible replica status

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Message shown while containers are unreachable or unhealthy
pub const WAITING_FOR_RUNTIME: &str = "Waiting for runtime";

/// Status published for the local replica
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    /// Work in progress
    Maintenance(String),
    /// Waiting on something outside our control
    Waiting(String),
    /// Needs the operator to fix an input
    Blocked(String),
    /// Every container healthy
    Active,
}

impl UnitStatus {
    /// Status message, empty for [`UnitStatus::Active`]
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Maintenance(msg) | Self::Waiting(msg) | Self::Blocked(msg) => msg,
            Self::Active => "",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maintenance(msg) => write!(f, "maintenance: {msg}"),
            Self::Waiting(msg) => write!(f, "waiting: {msg}"),
            Self::Blocked(msg) => write!(f, "blocked: {msg}"),
            Self::Active => f.write_str("active"),
        }
    }
}

/// Sink for status updates
pub trait StatusReporter: Send + Sync {
    /// Publish a new status
    fn report(&self, status: UnitStatus);
}

/// [`StatusReporter`] that records every update
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusReporter {
    history: Arc<Mutex<Vec<UnitStatus>>>,
}

impl MemoryStatusReporter {
    /// Create empty recorder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest status
    #[must_use]
    pub fn current(&self) -> Option<UnitStatus> {
        self.history.lock().last().cloned()
    }

    /// Every status reported so far
    #[must_use]
    pub fn history(&self) -> Vec<UnitStatus> {
        self.history.lock().clone()
    }
}

impl StatusReporter for MemoryStatusReporter {
    fn report(&self, status: UnitStatus) {
        self.history.lock().push(status);
    }
}
