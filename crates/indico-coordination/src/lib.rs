//! Indico Coordination - singleton state shared between replicas
//!
//! Replicas never talk to each other directly. They coordinate through a
//! shared [`RecordStore`] that offers single-key compare-and-write:
//! - [`SingletonManager`] creates the shared secret exactly once
//! - [`SingletonManager`] keeps exactly one singleton worker placement
//! - Followers only read; the externally elected coordinator writes
//!
//! # Example
//!
//! ```rust
//! use indico_coordination::{CoordinationInput, MemoryRecordStore, ReplicaRole, SingletonManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), indico_coordination::CoordinationError> {
//! let store = MemoryRecordStore::new();
//! let manager = SingletonManager::new(Arc::new(store.clone()));
//! let state = manager
//!     .run(&CoordinationInput::new("indico/0", ReplicaRole::Coordinator))
//!     .await?;
//! assert!(state.secret.is_some());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod replica;
pub mod secret;
pub mod singleton;
pub mod store;

pub use error::{CoordinationError, RaceLostError, StoreError, VaultError};
pub use replica::{ReplicaId, ReplicaRole};
pub use secret::{MemorySecretVault, SecretVault, SharedSecret, SECRET_BYTES};
pub use singleton::{
    allowed_transitions, plan, validate_transition, CoordinationInput, PlacementPhase, SingletonManager,
    SingletonState, WorkerPlacement, MAX_WRITE_ATTEMPTS,
};
pub use store::{keys, write_if_absent, Claim, MemoryRecordStore, RecordStore, WriteOutcome};
