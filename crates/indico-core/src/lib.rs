//! Indico Core - the per-replica reconciliation driver
//!
//! Each replica runs one [`Reconciler`]. It reacts to external events by
//! gathering every dependency payload, validating them into a snapshot,
//! coordinating singletons through the shared record store and applying the
//! derived topology to the container runtime:
//! - Invalid configuration blocks until the input changes
//! - Missing mandatory dependencies report a waiting status
//! - Collaborator failures abandon the pass for a retry on the next event
//!
//! # Example
//!
//! ```rust
//! use indico_core::{
//!     MemoryDependencySource, MemoryRuntime, MemoryStatusReporter, ReconcileContext,
//!     ReconcileEvent, Reconciler,
//! };
//! use indico_coordination::{MemoryRecordStore, ReplicaRole, SingletonManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), indico_core::ReconcileError> {
//! let mut driver = Reconciler::new(
//!     ReconcileContext::new("indico/0", ReplicaRole::Coordinator),
//!     Arc::new(MemoryDependencySource::new()),
//!     Arc::new(MemoryRuntime::new()),
//!     Arc::new(MemoryStatusReporter::new()),
//!     SingletonManager::new(Arc::new(MemoryRecordStore::new())),
//! );
//! let report = driver.handle(ReconcileEvent::ReapplyRequested).await?;
//! assert!(!report.is_active());
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod context;
pub mod error;
pub mod event;
pub mod extensions;
pub mod phase;
pub mod reconciler;
pub mod runtime;
pub mod source;
pub mod status;

pub use actions::{ActionReport, AdminActions, MAX_ANONYMIZE_EMAILS};
pub use context::ReconcileContext;
pub use error::{ActionError, PhaseError, ReconcileError, RuntimeError, SourceError, TransientApplyError};
pub use event::ReconcileEvent;
pub use extensions::{ExternalResources, SyncReport};
pub use phase::{allowed_transitions, validate_transition, DriverPhase};
pub use reconciler::{PassId, PassOutcome, PassReport, Reconciler};
pub use runtime::{ExecOutput, ExecRequest, MemoryRuntime, WorkloadRuntime};
pub use source::{gather_inputs, DependencySource, MemoryDependencySource};
pub use status::{MemoryStatusReporter, StatusReporter, UnitStatus, WAITING_FOR_RUNTIME};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
