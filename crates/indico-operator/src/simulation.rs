//! Seeded multi-replica simulation
//!
//! Drives several replicas over one shared record store through random
//! elections, departures, joins and store outages. After every round each
//! live replica runs a pass (coordinator first) and the singleton
//! invariants are checked:
//! - The shared secret never changes once written and every replica uses it
//! - At most one replica runs the singleton worker
//! - While a coordinator is alive the worker is held by a live replica

use indico_config::{Channel, ChannelPayload};
use indico_coordination::{keys, MemoryRecordStore, ReplicaId, ReplicaRole, SingletonManager};
use indico_core::{
    MemoryDependencySource, MemoryRuntime, MemoryStatusReporter, ReconcileContext, ReconcileError,
    ReconcileEvent, Reconciler,
};
use indico_topology::{containers, WORKER_SERVICE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Random seed
    pub seed: u64,
    /// Replicas at start
    pub replicas: usize,
    /// Rounds to run
    pub rounds: u64,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            replicas: 3,
            rounds: 200,
            stop_on_first_violation: false,
        }
    }
}

/// One random step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOperation {
    /// The external election picks another coordinator
    Elect(ReplicaId),
    /// A replica leaves
    Depart(ReplicaId),
    /// A new replica joins
    Join(ReplicaId),
    /// The shared store fails the next calls
    StoreOutage(usize),
    /// Explicit re-apply on every replica
    Reapply,
}

/// Invariant broken during a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Stored secret changed after being written
    SecretChanged {
        /// Round number
        round: u64,
    },
    /// A replica runs with a secret other than the stored one
    SecretMismatch {
        /// Round number
        round: u64,
        /// Offending replica
        replica: ReplicaId,
    },
    /// More than one replica runs the worker
    DuplicateWorker {
        /// Round number
        round: u64,
        /// Replicas running it
        holders: Vec<ReplicaId>,
    },
    /// Coordinator alive but the worker is unassigned or on a dead replica
    OrphanedWorker {
        /// Round number
        round: u64,
        /// Stored holder
        stored: Option<String>,
    },
    /// A pass failed for a reason other than a transient collaborator error
    PassFailed {
        /// Round number
        round: u64,
        /// Error text
        error: String,
    },
}

/// Counters collected by the simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Rounds run
    pub rounds: u64,
    /// Passes run
    pub passes: u64,
    /// Passes abandoned on a transient error
    pub transient_failures: u64,
    /// Coordinator changes
    pub elections: u64,
    /// Departures
    pub departures: u64,
    /// Joins
    pub joins: u64,
    /// Worker moves between replicas
    pub worker_moves: u64,
}

/// Final report
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Parameters used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Broken invariants
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if no invariant was broken
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== Indico replica simulation ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Rounds: {}", self.stats.rounds);
        let _ = writeln!(report, "Passes: {}", self.stats.passes);
        let _ = writeln!(report, "Transient failures: {}", self.stats.transient_failures);
        let _ = writeln!(report, "Elections: {}", self.stats.elections);
        let _ = writeln!(report, "Departures: {}", self.stats.departures);
        let _ = writeln!(report, "Joins: {}", self.stats.joins);
        let _ = writeln!(report, "Worker moves: {}", self.stats.worker_moves);
        let _ = writeln!(report, "Violations: {}", self.violations.len());
        for (i, violation) in self.violations.iter().enumerate() {
            let _ = writeln!(report, "  {}. {violation:?}", i + 1);
        }
        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

struct SimReplica {
    id: ReplicaId,
    runtime: MemoryRuntime,
    driver: Reconciler,
}

impl SimReplica {
    fn runs_worker(&self) -> bool {
        self.runtime
            .layer(containers::INDICO)
            .is_some_and(|layer| layer.services.contains_key(WORKER_SERVICE))
    }

    fn secret(&self) -> Option<String> {
        self.runtime
            .layer(containers::INDICO)?
            .services
            .get(containers::INDICO)?
            .environment
            .get("SECRET_KEY")
            .cloned()
    }

    fn is_coordinator(&self) -> bool {
        self.driver.context().role.is_coordinator()
    }
}

struct Cluster {
    store: MemoryRecordStore,
    sources: MemoryDependencySource,
    replicas: Vec<SimReplica>,
    next_id: usize,
}

impl Cluster {
    fn new(size: usize) -> Self {
        let sources = MemoryDependencySource::new();
        for (channel, payload) in demo_payloads() {
            sources.set(channel, payload);
        }
        let mut cluster = Self {
            store: MemoryRecordStore::new(),
            sources,
            replicas: Vec::new(),
            next_id: size.max(1),
        };
        let ids: Vec<ReplicaId> = (0..cluster.next_id)
            .map(|i| ReplicaId::new(format!("indico/{i}")))
            .collect();
        for (i, id) in ids.iter().enumerate() {
            let role = if i == 0 {
                ReplicaRole::Coordinator
            } else {
                ReplicaRole::Follower
            };
            let peers = ids.iter().filter(|peer| *peer != id).cloned();
            cluster.add(id.clone(), role, peers);
        }
        cluster
    }

    fn spawn(&mut self) -> ReplicaId {
        let id = ReplicaId::new(format!("indico/{}", self.next_id));
        self.next_id += 1;
        let peers = self.ids();
        self.add(id.clone(), ReplicaRole::Follower, peers);
        id
    }

    fn add(&mut self, id: ReplicaId, role: ReplicaRole, peers: impl IntoIterator<Item = ReplicaId>) {
        let runtime = MemoryRuntime::new();
        let driver = Reconciler::new(
            ReconcileContext::new(id.clone(), role).with_peers(peers),
            Arc::new(self.sources.clone()),
            Arc::new(runtime.clone()),
            Arc::new(MemoryStatusReporter::new()),
            SingletonManager::new(Arc::new(self.store.clone())),
        );
        self.replicas.push(SimReplica { id, runtime, driver });
    }

    fn ids(&self) -> Vec<ReplicaId> {
        self.replicas.iter().map(|r| r.id.clone()).collect()
    }

    fn coordinator(&self) -> Option<&SimReplica> {
        self.replicas.iter().find(|r| r.is_coordinator())
    }
}

/// Baseline payloads: every mandatory dependency present
fn demo_payloads() -> Vec<(Channel, ChannelPayload)> {
    vec![
        (
            Channel::Database,
            ChannelPayload::cluster([
                ("username", "indico"),
                ("password", "simulated"),
                ("endpoint", "pg.local:5432"),
                ("database", "indico"),
            ]),
        ),
        (
            Channel::Cache,
            ChannelPayload::replica([("hostname", "cache-host"), ("port", "6379")]),
        ),
        (
            Channel::Queue,
            ChannelPayload::replica([("hostname", "broker-host"), ("port", "6379")]),
        ),
    ]
}

fn pick(rng: &mut StdRng, cluster: &Cluster) -> SimulatedOperation {
    let ids = cluster.ids();
    let any = ids[rng.random_range(0..ids.len())].clone();
    match rng.random_range(0..10) {
        0..=2 => SimulatedOperation::Elect(any),
        3..=4 if ids.len() > 1 => SimulatedOperation::Depart(any),
        3..=5 => SimulatedOperation::Join(ReplicaId::new(format!("indico/{}", cluster.next_id))),
        6 => SimulatedOperation::StoreOutage(rng.random_range(1..=2)),
        _ => SimulatedOperation::Reapply,
    }
}

/// Passes attempted per event before a transient failure counts as a violation
const MAX_PASS_ATTEMPTS: u32 = 3;

/// Deliver an event to one replica, retrying after transient failures
async fn deliver(
    replica: &mut SimReplica,
    event: ReconcileEvent,
    stats: &mut SimulatorStats,
) -> Result<(), ReconcileError> {
    let mut event = event;
    let mut attempt = 1;
    loop {
        stats.passes += 1;
        match replica.driver.handle(event).await {
            Ok(_) => return Ok(()),
            Err(err) if err.is_retryable() && attempt < MAX_PASS_ATTEMPTS => {
                debug!(replica = %replica.id, attempt, error = %err, "Pass abandoned, retrying");
                stats.transient_failures += 1;
                attempt += 1;
                event = ReconcileEvent::ReapplyRequested;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn apply(
    cluster: &mut Cluster,
    operation: &SimulatedOperation,
    stats: &mut SimulatorStats,
) -> Vec<Result<(), ReconcileError>> {
    let mut results = Vec::new();
    match operation {
        SimulatedOperation::Elect(target) => {
            stats.elections += 1;
            for replica in &mut cluster.replicas {
                let role = if replica.id == *target {
                    ReplicaRole::Coordinator
                } else {
                    ReplicaRole::Follower
                };
                if replica.driver.context().role != role {
                    results.push(deliver(replica, ReconcileEvent::RoleChanged(role), stats).await);
                }
            }
        }
        SimulatedOperation::Depart(target) => {
            stats.departures += 1;
            let Some(index) = cluster.replicas.iter().position(|r| r.id == *target) else {
                return results;
            };
            let mut leaving = cluster.replicas.remove(index);
            results.push(deliver(&mut leaving, ReconcileEvent::PeerDeparted(target.clone()), stats).await);
            for replica in &mut cluster.replicas {
                results.push(deliver(replica, ReconcileEvent::PeerDeparted(target.clone()), stats).await);
            }
            if leaving.is_coordinator() {
                stats.elections += 1;
                if let Some(next) = cluster.replicas.first_mut() {
                    results.push(
                        deliver(next, ReconcileEvent::RoleChanged(ReplicaRole::Coordinator), stats).await,
                    );
                }
            }
        }
        SimulatedOperation::Join(_) => {
            stats.joins += 1;
            let id = cluster.spawn();
            for replica in &mut cluster.replicas {
                if replica.id != id {
                    results.push(deliver(replica, ReconcileEvent::PeerJoined(id.clone()), stats).await);
                }
            }
        }
        SimulatedOperation::StoreOutage(calls) => cluster.store.fail_next(*calls),
        SimulatedOperation::Reapply => {}
    }
    results
}

/// Run every live replica once, coordinator first
async fn sweep(cluster: &mut Cluster, stats: &mut SimulatorStats) -> Vec<Result<(), ReconcileError>> {
    cluster.replicas.sort_by_key(|r| !r.is_coordinator());
    let mut results = Vec::new();
    for replica in &mut cluster.replicas {
        results.push(deliver(replica, ReconcileEvent::ReapplyRequested, stats).await);
    }
    results
}

fn check(cluster: &Cluster, round: u64, first_secret: &mut Option<String>, violations: &mut Vec<Violation>) {
    let stored_secret = cluster.store.get(keys::SECRET_KEY);
    match (first_secret.as_ref(), stored_secret.as_ref()) {
        (Some(first), Some(stored)) if first != stored => violations.push(Violation::SecretChanged { round }),
        (Some(_), None) => violations.push(Violation::SecretChanged { round }),
        (None, Some(stored)) => *first_secret = Some(stored.clone()),
        _ => {}
    }
    if let Some(stored) = &stored_secret {
        for replica in &cluster.replicas {
            if replica.secret().is_some_and(|s| s != *stored) {
                violations.push(Violation::SecretMismatch {
                    round,
                    replica: replica.id.clone(),
                });
            }
        }
    }

    let holders: Vec<ReplicaId> = cluster
        .replicas
        .iter()
        .filter(|r| r.runs_worker())
        .map(|r| r.id.clone())
        .collect();
    if holders.len() > 1 {
        violations.push(Violation::DuplicateWorker { round, holders });
    }

    let stored = cluster.store.get(keys::CELERY_UNIT);
    if cluster.coordinator().is_some() {
        let live = stored
            .as_deref()
            .is_some_and(|holder| cluster.replicas.iter().any(|r| r.id.as_str() == holder));
        if !live {
            violations.push(Violation::OrphanedWorker { round, stored });
        }
    }
}

/// Run the simulation
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut cluster = Cluster::new(config.replicas);
    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    let mut first_secret = None;
    let mut holder = None;

    info!(seed = config.seed, replicas = config.replicas, rounds = config.rounds, "Starting simulation");

    for round in 0..config.rounds {
        stats.rounds += 1;
        let operation = pick(&mut rng, &cluster);
        debug!(round, ?operation, "Simulating");

        let mut results = apply(&mut cluster, &operation, &mut stats).await;
        results.extend(sweep(&mut cluster, &mut stats).await);
        for result in results {
            if let Err(err) = result {
                violations.push(Violation::PassFailed {
                    round,
                    error: err.to_string(),
                });
            }
        }

        check(&cluster, round, &mut first_secret, &mut violations);
        let current = cluster.store.get(keys::CELERY_UNIT);
        if current.is_some() && current != holder {
            stats.worker_moves += 1;
        }
        holder = current;

        if config.stop_on_first_violation && !violations.is_empty() {
            break;
        }
    }

    info!(violations = violations.len(), "Simulation finished");
    SimulatorReport {
        config,
        stats,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_simulation_passes() {
        let report = run_simulator(SimulatorConfig {
            rounds: 60,
            ..SimulatorConfig::default()
        })
        .await;
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.rounds, 60);
    }

    #[tokio::test]
    async fn same_seed_same_stats() {
        let config = SimulatorConfig {
            seed: 7,
            rounds: 40,
            ..SimulatorConfig::default()
        };
        let a = run_simulator(config.clone()).await;
        let b = run_simulator(config).await;
        assert_eq!(a.stats, b.stats);
    }
}
