//! Shared record store
//!
//! The store is the only mutable state shared between replicas. Every write
//! is a single-key compare-and-write, so concurrent coordinators never need a
//! lock:
//! - [`RecordStore::read`] returns the current value of a key
//! - [`RecordStore::conditional_write`] replaces it only if it still equals
//!   the expected value

use crate::error::{RaceLostError, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Keys written by the coordinator
pub mod keys {
    /// Inline shared secret
    pub const SECRET_KEY: &str = "secret-key";
    /// Vault id of the shared secret
    pub const SECRET_ID: &str = "secret-id";
    /// Replica running the singleton worker
    pub const CELERY_UNIT: &str = "celery-unit";
}

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Value matched the expectation and was replaced
    Written,
    /// Value differed; nothing was written
    Conflict {
        /// Value found in the store
        current: Option<String>,
    },
}

/// Key-value store visible to every replica
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the current value of `key`
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set `key` to `new` (or remove it when `None`) only if its current value
    /// equals `expected` (`None` meaning absent)
    ///
    /// A failed precondition is a normal [`WriteOutcome::Conflict`], not an
    /// error.
    async fn conditional_write(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<WriteOutcome, StoreError>;
}

/// Outcome of a create-once write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Our value was stored
    Won(String),
    /// A peer stored first
    Lost(RaceLostError),
}

impl Claim {
    /// Value now held by the store
    #[must_use]
    pub fn into_value(self) -> String {
        match self {
            Self::Won(value) => value,
            Self::Lost(race) => race.stored,
        }
    }

    /// Check if our value was stored
    #[inline]
    #[must_use]
    pub fn is_won(&self) -> bool {
        matches!(self, Self::Won(_))
    }
}

/// Write `value` under `key` only if the key is absent
///
/// # Errors
/// Returns [`StoreError`] when the store fails. Losing the race is reported
/// as [`Claim::Lost`].
pub async fn write_if_absent(
    store: &dyn RecordStore,
    key: &str,
    value: &str,
) -> Result<Claim, StoreError> {
    match store.conditional_write(key, None, Some(value)).await? {
        WriteOutcome::Written => Ok(Claim::Won(value.to_owned())),
        WriteOutcome::Conflict {
            current: Some(stored),
        } => {
            let race = RaceLostError {
                key: key.to_owned(),
                stored,
            };
            debug!(%race, "Adopting stored value");
            Ok(Claim::Lost(race))
        }
        // Only reachable if the store violates its own precondition.
        WriteOutcome::Conflict { current: None } => Err(StoreError::Rejected {
            key: key.to_owned(),
            reason: "conflict reported for an absent key".to_owned(),
        }),
    }
}

/// In-memory [`RecordStore`] shared by cloning
///
/// Every operation yields to the scheduler first, so tasks racing on the
/// same store interleave the way remote callers would. Failures can be
/// injected for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Mutex<BTreeMap<String, String>>,
    fail_next: AtomicUsize,
    writes: AtomicU64,
}

impl MemoryRecordStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` operations with [`StoreError::Unavailable`]
    pub fn fail_next(&self, count: usize) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    /// Copy of all records
    #[must_use]
    pub fn records(&self) -> BTreeMap<String, String> {
        self.inner.records.lock().clone()
    }

    /// Current value of a key, without going through the async interface
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.records.lock().get(key).cloned()
    }

    /// Unconditionally set a key
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.records.lock().insert(key.into(), value.into());
    }

    /// Number of successful writes so far
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        let injected = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Unavailable("injected failure".to_owned())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        tokio::task::yield_now().await;
        self.check_failure()?;
        Ok(self.get(key))
    }

    async fn conditional_write(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<WriteOutcome, StoreError> {
        tokio::task::yield_now().await;
        self.check_failure()?;

        let mut records = self.inner.records.lock();
        let current = records.get(key).map(String::as_str);
        if current != expected {
            return Ok(WriteOutcome::Conflict {
                current: current.map(str::to_owned),
            });
        }
        match new {
            Some(value) => {
                records.insert(key.to_owned(), value.to_owned());
            }
            None => {
                records.remove(key);
            }
        }
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conditional_write_respects_expectation() {
        let store = MemoryRecordStore::new();
        let outcome = store.conditional_write("k", None, Some("a")).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let outcome = store.conditional_write("k", None, Some("b")).await.unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Conflict {
                current: Some("a".to_owned())
            }
        );

        let outcome = store.conditional_write("k", Some("a"), None).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(store.read("k").await.unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn write_if_absent_reports_lost_race() {
        let store = MemoryRecordStore::new();
        store.insert(keys::SECRET_KEY, "peer");
        let claim = write_if_absent(&store, keys::SECRET_KEY, "mine").await.unwrap();
        assert!(!claim.is_won());
        assert_eq!(claim.into_value(), "peer");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryRecordStore::new();
        store.fail_next(1);
        assert!(store.read("k").await.is_err());
        assert!(store.read("k").await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_records() {
        let store = MemoryRecordStore::new();
        let peer = store.clone();
        store.conditional_write("k", None, Some("v")).await.unwrap();
        assert_eq!(peer.read("k").await.unwrap().as_deref(), Some("v"));
    }
}
