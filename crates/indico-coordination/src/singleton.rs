//! Coordinator & singleton manager
//!
//! Runs identically on every replica, once per reconciliation pass. Only the
//! coordinator writes; followers read the current values. Two resources are
//! managed:
//! - the shared secret, created once and never overwritten
//! - the singleton worker placement (`celery-unit`), reassigned when its
//!   holder departs
//!
//! Every write is a single-key compare-and-write against the shared record
//! store, so two replicas that both believe they coordinate still converge on
//! one stored value.

use crate::error::{CoordinationError, VaultError};
use crate::replica::{ReplicaId, ReplicaRole};
use crate::secret::{SecretVault, SharedSecret};
use crate::store::{keys, write_if_absent, Claim, RecordStore, WriteOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Conditional write attempts per resource per pass
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Lifecycle phase of the worker placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementPhase {
    /// No holder
    Unassigned,
    /// A replica holds the worker
    Assigned,
    /// Holder departed, placement being released
    Vacating,
    /// Worker moved to a new holder
    Reassigned,
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: PlacementPhase) -> Vec<PlacementPhase> {
    use PlacementPhase::{Assigned, Reassigned, Unassigned, Vacating};
    match from {
        Unassigned => vec![Assigned],
        Assigned | Reassigned => vec![Vacating],
        Vacating => vec![Reassigned, Unassigned],
    }
}

/// Validate a placement transition
///
/// # Errors
/// Returns [`CoordinationError::IllegalTransition`] for transitions not in
/// [`allowed_transitions`].
pub fn validate_transition(from: PlacementPhase, to: PlacementPhase) -> Result<(), CoordinationError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(CoordinationError::IllegalTransition { from, to })
    }
}

/// Where the singleton worker runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerPlacement {
    /// Nobody runs it
    Unassigned,
    /// This replica runs it
    Assigned(ReplicaId),
}

impl WorkerPlacement {
    fn from_stored(value: Option<&str>) -> Self {
        value.map_or(Self::Unassigned, |holder| Self::Assigned(ReplicaId::new(holder)))
    }

    /// Current holder
    #[inline]
    #[must_use]
    pub fn holder(&self) -> Option<&ReplicaId> {
        match self {
            Self::Unassigned => None,
            Self::Assigned(holder) => Some(holder),
        }
    }

    /// Check if `replica` holds the worker
    #[inline]
    #[must_use]
    pub fn is_held_by(&self, replica: &ReplicaId) -> bool {
        self.holder() == Some(replica)
    }
}

/// What one replica knows at the start of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationInput {
    /// Local replica
    pub replica: ReplicaId,
    /// Local role
    pub role: ReplicaRole,
    /// Replicas reported as departed and not yet handled by a coordinator pass
    pub departed: BTreeSet<ReplicaId>,
    /// Live peers (excluding the local replica), when known
    pub live_peers: Option<BTreeSet<ReplicaId>>,
}

impl CoordinationInput {
    /// Create input with no departure and unknown peers
    pub fn new(replica: impl Into<ReplicaId>, role: ReplicaRole) -> Self {
        Self {
            replica: replica.into(),
            role,
            departed: BTreeSet::new(),
            live_peers: None,
        }
    }

    /// Add a departed replica
    #[must_use]
    pub fn with_departed(mut self, replica: impl Into<ReplicaId>) -> Self {
        self.departed.insert(replica.into());
        self
    }

    /// Set live peer set
    #[must_use]
    pub fn with_live_peers(mut self, peers: impl IntoIterator<Item = ReplicaId>) -> Self {
        self.live_peers = Some(peers.into_iter().collect());
        self
    }

    fn is_gone(&self, holder: &str) -> bool {
        if self.departed.iter().any(|d| d.as_str() == holder) {
            return true;
        }
        holder != self.replica.as_str()
            && self
                .live_peers
                .as_ref()
                .is_some_and(|peers| !peers.iter().any(|p| p.as_str() == holder))
    }

    fn is_departing(&self) -> bool {
        self.departed.contains(&self.replica)
    }
}

/// Singleton values observed (and possibly written) by one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingletonState {
    /// Shared secret; a follower may see none before the first coordinator pass
    pub secret: Option<SharedSecret>,
    /// Worker placement
    pub worker: WorkerPlacement,
}

impl SingletonState {
    /// Check if `replica` should run the singleton worker
    #[inline]
    #[must_use]
    pub fn runs_worker(&self, replica: &ReplicaId) -> bool {
        self.worker.is_held_by(replica)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Keep,
    Write(Option<ReplicaId>),
}

fn decide(current: Option<&str>, input: &CoordinationInput) -> Decision {
    match current {
        None if input.is_departing() => Decision::Keep,
        None => Decision::Write(Some(input.replica.clone())),
        Some(holder) if !input.is_gone(holder) => Decision::Keep,
        // A departing coordinator releases the worker for the next coordinator.
        Some(_) if input.is_departing() => Decision::Write(None),
        Some(_) => Decision::Write(Some(input.replica.clone())),
    }
}

/// Phases the placement passes through when moving from the stored holder
/// to `target`
///
/// A held placement is always vacated before it is reassigned or cleared.
///
/// # Errors
/// Returns [`CoordinationError::IllegalTransition`] when the move is not a
/// change of placement (clearing an empty placement, or rewriting the same
/// holder).
pub fn plan(current: Option<&str>, target: Option<&ReplicaId>) -> Result<Vec<PlacementPhase>, CoordinationError> {
    use PlacementPhase::{Assigned, Reassigned, Unassigned, Vacating};
    let from = if current.is_some() { Assigned } else { Unassigned };
    let to = match target {
        None => Unassigned,
        Some(holder) if current == Some(holder.as_str()) => Assigned,
        Some(_) if current.is_some() => Reassigned,
        Some(_) => Assigned,
    };
    let path = if from == Assigned && to != Assigned {
        vec![Assigned, Vacating, to]
    } else {
        vec![from, to]
    };
    for step in path.windows(2) {
        validate_transition(step[0], step[1])?;
    }
    Ok(path)
}

/// Maintains the shared secret and the worker placement
#[derive(Clone)]
pub struct SingletonManager {
    store: Arc<dyn RecordStore>,
    vault: Option<Arc<dyn SecretVault>>,
}

impl std::fmt::Debug for SingletonManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonManager")
            .field("vault", &self.vault.is_some())
            .finish_non_exhaustive()
    }
}

impl SingletonManager {
    /// Create manager over a shared record store, storing secrets inline
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store, vault: None }
    }

    /// Keep secret content in a vault and store only its id
    #[must_use]
    pub fn with_vault(mut self, vault: Arc<dyn SecretVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Run one coordination pass
    ///
    /// # Errors
    /// Returns [`CoordinationError`] when the store or vault fails or writes
    /// keep conflicting; nothing is left half-written.
    pub async fn run(&self, input: &CoordinationInput) -> Result<SingletonState, CoordinationError> {
        if input.role.is_coordinator() {
            let secret = self.ensure_secret(input).await?;
            let worker = self.place_worker(input).await?;
            Ok(SingletonState {
                secret: Some(secret),
                worker,
            })
        } else {
            let secret = self.read_secret().await?;
            let current = self.store.read(keys::CELERY_UNIT).await?;
            Ok(SingletonState {
                secret,
                worker: WorkerPlacement::from_stored(current.as_deref()),
            })
        }
    }

    async fn read_secret(&self) -> Result<Option<SharedSecret>, CoordinationError> {
        if let Some(inline) = self.store.read(keys::SECRET_KEY).await? {
            return Ok(Some(SharedSecret::from_stored(inline)));
        }
        let Some(vault) = &self.vault else {
            return Ok(None);
        };
        match self.store.read(keys::SECRET_ID).await? {
            Some(id) => fetch(vault.as_ref(), &id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn ensure_secret(&self, input: &CoordinationInput) -> Result<SharedSecret, CoordinationError> {
        if let Some(secret) = self.read_secret().await? {
            return Ok(secret);
        }
        let fresh = SharedSecret::generate();

        let Some(vault) = &self.vault else {
            let claim = write_if_absent(self.store.as_ref(), keys::SECRET_KEY, fresh.expose()).await?;
            if claim.is_won() {
                info!(replica = %input.replica, "Generated shared secret");
            }
            return Ok(SharedSecret::from_stored(claim.into_value()));
        };

        let id = vault.create(fresh.expose()).await?;
        let claim = match write_if_absent(self.store.as_ref(), keys::SECRET_ID, &id).await {
            Ok(claim) => claim,
            Err(err) => {
                if let Err(cleanup) = vault.remove(&id).await {
                    warn!(secret_id = %id, error = %cleanup, "Failed to remove unreferenced vault secret");
                }
                return Err(err.into());
            }
        };
        match claim {
            Claim::Won(_) => {
                info!(replica = %input.replica, secret_id = %id, "Generated shared secret in vault");
                Ok(fresh)
            }
            Claim::Lost(race) => {
                vault.remove(&id).await?;
                fetch(vault.as_ref(), &race.stored).await
            }
        }
    }

    async fn place_worker(&self, input: &CoordinationInput) -> Result<WorkerPlacement, CoordinationError> {
        let mut current = self.store.read(keys::CELERY_UNIT).await?;
        let mut attempts = 0;
        loop {
            let Decision::Write(target) = decide(current.as_deref(), input) else {
                return Ok(WorkerPlacement::from_stored(current.as_deref()));
            };
            if attempts == MAX_WRITE_ATTEMPTS {
                return Err(CoordinationError::Contention {
                    key: keys::CELERY_UNIT.to_owned(),
                    attempts,
                });
            }
            attempts += 1;
            let path = plan(current.as_deref(), target.as_ref())?;

            let new = target.as_ref().map(ReplicaId::as_str);
            match self
                .store
                .conditional_write(keys::CELERY_UNIT, current.as_deref(), new)
                .await?
            {
                WriteOutcome::Written => {
                    info!(
                        replica = %input.replica,
                        previous = current.as_deref().unwrap_or("-"),
                        holder = new.unwrap_or("-"),
                        path = ?path,
                        "Moved singleton worker"
                    );
                    return Ok(WorkerPlacement::from_stored(new));
                }
                WriteOutcome::Conflict { current: stored } => {
                    debug!(replica = %input.replica, attempt = attempts, "Worker placement changed concurrently");
                    current = stored;
                }
            }
        }
    }
}

async fn fetch(vault: &dyn SecretVault, id: &str) -> Result<SharedSecret, CoordinationError> {
    vault
        .get(id)
        .await?
        .map(SharedSecret::from_stored)
        .ok_or_else(|| VaultError::NotFound(id.to_owned()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::secret::MemorySecretVault;
    use crate::store::MemoryRecordStore;
    use async_trait::async_trait;
    use proptest::prelude::*;

    fn manager(store: &MemoryRecordStore) -> SingletonManager {
        SingletonManager::new(Arc::new(store.clone()))
    }

    /// Store that reads normally but refuses every write
    struct ReadOnlyStore(MemoryRecordStore);

    #[async_trait]
    impl RecordStore for ReadOnlyStore {
        async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.read(key).await
        }

        async fn conditional_write(
            &self,
            _key: &str,
            _expected: Option<&str>,
            _new: Option<&str>,
        ) -> Result<WriteOutcome, StoreError> {
            Err(StoreError::Unavailable("read-only".to_owned()))
        }
    }

    #[test]
    fn placement_transition_table() {
        use PlacementPhase::*;
        assert!(validate_transition(Unassigned, Assigned).is_ok());
        assert!(validate_transition(Vacating, Reassigned).is_ok());
        assert!(validate_transition(Vacating, Unassigned).is_ok());
        assert!(validate_transition(Unassigned, Vacating).is_err());
        assert!(validate_transition(Assigned, Reassigned).is_err());
    }

    #[tokio::test]
    async fn coordinator_assigns_itself_when_empty() {
        let store = MemoryRecordStore::new();
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator);
        let state = manager(&store).run(&input).await.unwrap();
        assert!(state.runs_worker(&ReplicaId::new("indico/0")));
        assert_eq!(store.get(keys::CELERY_UNIT).as_deref(), Some("indico/0"));
        assert!(state.secret.is_some());
    }

    #[tokio::test]
    async fn coordinator_keeps_live_holder() {
        let store = MemoryRecordStore::new();
        store.insert(keys::CELERY_UNIT, "indico/1");
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator)
            .with_live_peers([ReplicaId::new("indico/1")]);
        let state = manager(&store).run(&input).await.unwrap();
        assert_eq!(state.worker, WorkerPlacement::Assigned(ReplicaId::new("indico/1")));
    }

    #[tokio::test]
    async fn departed_holder_is_replaced() {
        let store = MemoryRecordStore::new();
        store.insert(keys::CELERY_UNIT, "indico/1");
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator).with_departed("indico/1");
        let state = manager(&store).run(&input).await.unwrap();
        assert!(state.runs_worker(&ReplicaId::new("indico/0")));
    }

    #[tokio::test]
    async fn dead_holder_missing_from_peers_is_replaced() {
        let store = MemoryRecordStore::new();
        store.insert(keys::CELERY_UNIT, "indico/7");
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator)
            .with_live_peers([ReplicaId::new("indico/1")]);
        let state = manager(&store).run(&input).await.unwrap();
        assert!(state.runs_worker(&ReplicaId::new("indico/0")));
    }

    #[tokio::test]
    async fn departing_coordinator_clears_its_own_placement() {
        let store = MemoryRecordStore::new();
        store.insert(keys::CELERY_UNIT, "indico/0");
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator).with_departed("indico/0");
        let state = manager(&store).run(&input).await.unwrap();
        assert_eq!(state.worker, WorkerPlacement::Unassigned);
        assert_eq!(store.get(keys::CELERY_UNIT), None);
    }

    #[tokio::test]
    async fn follower_never_writes() {
        let store = MemoryRecordStore::new();
        let input = CoordinationInput::new("indico/1", ReplicaRole::Follower).with_departed("indico/0");
        let state = manager(&store).run(&input).await.unwrap();
        assert_eq!(state.secret, None);
        assert_eq!(state.worker, WorkerPlacement::Unassigned);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn existing_secret_is_never_overwritten() {
        let store = MemoryRecordStore::new();
        store.insert(keys::SECRET_KEY, "existing");
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator);
        let state = manager(&store).run(&input).await.unwrap();
        assert_eq!(state.secret.unwrap().expose(), "existing");
        assert_eq!(store.get(keys::SECRET_KEY).as_deref(), Some("existing"));
    }

    #[tokio::test]
    async fn store_failure_aborts_pass() {
        let store = MemoryRecordStore::new();
        store.fail_next(1);
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator);
        let err = manager(&store).run(&input).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.records().is_empty());
    }

    #[test]
    fn placement_plan_vacates_before_moving() {
        use PlacementPhase::*;
        let holder = ReplicaId::new("indico/1");
        assert_eq!(plan(None, Some(&holder)).unwrap(), vec![Unassigned, Assigned]);
        assert_eq!(
            plan(Some("indico/0"), Some(&holder)).unwrap(),
            vec![Assigned, Vacating, Reassigned]
        );
        assert_eq!(plan(Some("indico/0"), None).unwrap(), vec![Assigned, Vacating, Unassigned]);
    }

    #[test]
    fn placement_plan_rejects_non_moves() {
        let holder = ReplicaId::new("indico/1");
        assert!(matches!(
            plan(None, None),
            Err(CoordinationError::IllegalTransition { .. })
        ));
        assert!(matches!(
            plan(Some("indico/1"), Some(&holder)),
            Err(CoordinationError::IllegalTransition { .. })
        ));
    }

    #[tokio::test]
    async fn every_departed_holder_is_remembered() {
        let store = MemoryRecordStore::new();
        store.insert(keys::CELERY_UNIT, "indico/5");
        let input = CoordinationInput::new("indico/1", ReplicaRole::Coordinator)
            .with_departed("indico/5")
            .with_departed("indico/6");
        let state = manager(&store).run(&input).await.unwrap();
        assert!(state.runs_worker(&ReplicaId::new("indico/1")));
        assert_eq!(store.get(keys::CELERY_UNIT).as_deref(), Some("indico/1"));
    }

    #[tokio::test]
    async fn vault_secret_is_removed_when_store_write_fails() {
        let vault = Arc::new(MemorySecretVault::new());
        let manager = SingletonManager::new(Arc::new(ReadOnlyStore(MemoryRecordStore::new())))
            .with_vault(vault.clone());
        let input = CoordinationInput::new("indico/0", ReplicaRole::Coordinator);
        let err = manager.run(&input).await.unwrap_err();
        assert!(err.is_transient());
        assert!(vault.is_empty());
    }

    fn replica() -> impl Strategy<Value = ReplicaId> {
        (0..4u8).prop_map(|n| ReplicaId::new(format!("indico/{n}")))
    }

    proptest! {
        #[test]
        fn placement_decisions_keep_one_live_holder(
            local in replica(),
            current in proptest::option::of(replica()),
            departed in proptest::collection::btree_set(replica(), 0..3),
            peers in proptest::option::of(proptest::collection::btree_set(replica(), 0..4)),
        ) {
            let mut input = CoordinationInput::new(local.clone(), ReplicaRole::Coordinator);
            input.departed = departed;
            input.live_peers = peers.map(|p| p.into_iter().filter(|r| *r != local).collect());
            let stored = current.as_ref().map(ReplicaId::as_str);
            let holder_alive = current.as_ref().is_some_and(|holder| {
                !input.departed.contains(holder)
                    && (*holder == local || input.live_peers.as_ref().map_or(true, |p| p.contains(holder)))
            });

            match decide(stored, &input) {
                Decision::Keep => {
                    prop_assert!(stored.is_some() || input.is_departing());
                    prop_assert!(stored.is_none() || holder_alive);
                }
                Decision::Write(target) => {
                    prop_assert!(!holder_alive);
                    // Only ever this replica, or nobody when it is leaving.
                    prop_assert!(target.is_none() || target.as_ref() == Some(&local));
                    prop_assert_eq!(target.is_none(), input.is_departing());
                    prop_assert!(stored.map_or(true, |holder| input.is_gone(holder)));
                    prop_assert!(plan(stored, target.as_ref()).is_ok());
                }
            }
        }
    }
}
