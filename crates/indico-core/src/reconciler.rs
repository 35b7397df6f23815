//! Reconciliation driver
//!
//! One driver runs per replica and handles one event at a time:
//!
//! ```text
//! Idle -> Gathering -> Validating -> Blocked ------------------> Idle
//!                                 -> Ready -> Applying --------> Idle
//! ```
//!
//! Invalid configuration blocks until the raw inputs change. A missing
//! mandatory dependency reports a waiting status. Collaborator failures
//! abandon the pass without touching the published status.

use crate::context::ReconcileContext;
use crate::error::{PhaseError, ReconcileError, RuntimeError};
use crate::event::ReconcileEvent;
use crate::extensions::{self, ExternalResources};
use crate::phase::{validate_transition, DriverPhase};
use crate::runtime::{ExecRequest, WorkloadRuntime};
use crate::source::{gather_inputs, DependencySource};
use crate::status::{StatusReporter, UnitStatus, WAITING_FOR_RUNTIME};
use indico_config::{check_readiness, ConfigurationSnapshot, RawInputs, SnapshotBuilder};
use indico_coordination::{ReplicaId, SingletonManager};
use indico_topology::{
    containers, InstalledPlugins, ServiceTopology, TopologyBuilder, TopologyInputs, LIST_PLUGINS_COMMAND,
    WORKLOAD_USER,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Identifier of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PassId(Ulid);

impl PassId {
    /// Create a fresh id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass-{}", self.0)
    }
}

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PassOutcome {
    /// Every container reachable and healthy
    Active,
    /// Waiting on a dependency or the runtime
    Waiting(String),
    /// Configuration rejected
    Blocked(String),
}

/// Summary of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Pass id
    pub pass: PassId,
    /// Final outcome
    pub outcome: PassOutcome,
    /// Containers that received a new layer
    pub applied: Vec<String>,
    /// Containers whose layer was already current
    pub unchanged: Vec<String>,
    /// Containers that could not be reached
    pub skipped: Vec<String>,
    /// Fingerprint of the derived topology
    pub fingerprint: Option<String>,
    /// Replica holding the singleton worker after the pass
    pub worker_holder: Option<ReplicaId>,
}

impl PassReport {
    fn new(pass: PassId, outcome: PassOutcome) -> Self {
        Self {
            pass,
            outcome,
            applied: Vec::new(),
            unchanged: Vec::new(),
            skipped: Vec::new(),
            fingerprint: None,
            worker_holder: None,
        }
    }

    /// Check if the pass ended active
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.outcome == PassOutcome::Active
    }
}

/// Per-replica reconciliation driver
pub struct Reconciler {
    context: ReconcileContext,
    sources: Arc<dyn DependencySource>,
    runtime: Arc<dyn WorkloadRuntime>,
    status: Arc<dyn StatusReporter>,
    singletons: SingletonManager,
    snapshots: SnapshotBuilder,
    topology: TopologyBuilder,
    phase: DriverPhase,
    blocked_on: Option<(RawInputs, String)>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("replica", &self.context.replica)
            .field("role", &self.context.role)
            .field("phase", &self.phase)
            .field("blocked", &self.blocked_on.is_some())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create driver for one replica
    #[must_use]
    pub fn new(
        context: ReconcileContext,
        sources: Arc<dyn DependencySource>,
        runtime: Arc<dyn WorkloadRuntime>,
        status: Arc<dyn StatusReporter>,
        singletons: SingletonManager,
    ) -> Self {
        Self {
            context,
            sources,
            runtime,
            status,
            singletons,
            snapshots: SnapshotBuilder::new(),
            topology: TopologyBuilder::new(),
            phase: DriverPhase::Idle,
            blocked_on: None,
        }
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Driver context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &ReconcileContext {
        &self.context
    }

    /// Check if the driver is latched on rejected configuration
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked_on.is_some()
    }

    /// Handle one trigger
    ///
    /// # Errors
    /// Returns [`ReconcileError`] when a collaborator fails. The pass is
    /// abandoned, the driver returns to idle and the published status is
    /// left as it was.
    pub async fn handle(&mut self, event: ReconcileEvent) -> Result<PassReport, ReconcileError> {
        let pass = PassId::new();
        let span = info_span!("reconcile", %pass, replica = %self.context.replica, %event);
        self.context.observe(&event);

        let result = self.run_pass(pass).instrument(span).await;
        if result.is_err() && self.phase != DriverPhase::Idle {
            // Abandoned passes skip straight back to idle.
            self.phase = DriverPhase::Idle;
        }
        result
    }

    async fn run_pass(&mut self, pass: PassId) -> Result<PassReport, ReconcileError> {
        self.transition(DriverPhase::Gathering)?;
        let inputs = gather_inputs(self.sources.as_ref(), &self.context.options, &self.context.proxy).await?;

        if let Some((_, message)) = self.blocked_on.as_ref().filter(|(latched, _)| *latched == inputs) {
            debug!("Inputs unchanged since rejection, staying blocked");
            let message = message.clone();
            self.transition(DriverPhase::Blocked)?;
            self.transition(DriverPhase::Idle)?;
            return Ok(PassReport::new(pass, PassOutcome::Blocked(message)));
        }

        self.transition(DriverPhase::Validating)?;
        let snapshot = match self.snapshots.build(&inputs) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(field = %err.field, error = %err, "Configuration rejected");
                self.transition(DriverPhase::Blocked)?;
                let message = err.to_string();
                self.status.report(UnitStatus::Blocked(message.clone()));
                self.blocked_on = Some((inputs, message.clone()));
                self.transition(DriverPhase::Idle)?;
                return Ok(PassReport::new(pass, PassOutcome::Blocked(message)));
            }
        };
        self.blocked_on = None;

        if let Err(missing) = check_readiness(&snapshot) {
            info!(channel = %missing.channel(), "Mandatory dependency missing");
            let message = missing.to_string();
            self.status.report(UnitStatus::Waiting(message.clone()));
            self.transition(DriverPhase::Idle)?;
            return Ok(PassReport::new(pass, PassOutcome::Waiting(message)));
        }
        self.transition(DriverPhase::Ready)?;

        self.sync_extensions(&snapshot).await?;
        let plugins = self.plugins().await;
        let input = self.context.coordination_input();
        let singleton = self.singletons.run(&input).await?;
        if input.role.is_coordinator() && !input.departed.is_empty() {
            debug!(departed = input.departed.len(), "Departures handled");
            self.context.departures_handled(&input.departed);
        }

        let topology = self.topology.build(&TopologyInputs {
            snapshot: &snapshot,
            replica: &self.context.replica,
            singleton: &singleton,
            plugins: &plugins,
        })?;

        self.transition(DriverPhase::Applying)?;
        self.status.report(UnitStatus::Maintenance("Applying service topology".to_owned()));
        let mut report = self.apply(pass, &topology).await?;
        report.fingerprint = Some(topology.fingerprint()?);
        report.worker_holder = singleton.worker.holder().cloned();

        let status = match &report.outcome {
            PassOutcome::Active => UnitStatus::Active,
            PassOutcome::Waiting(msg) => UnitStatus::Waiting(msg.clone()),
            PassOutcome::Blocked(msg) => UnitStatus::Blocked(msg.clone()),
        };
        self.status.report(status);
        self.transition(DriverPhase::Idle)?;

        info!(
            applied = report.applied.len(),
            unchanged = report.unchanged.len(),
            skipped = report.skipped.len(),
            outcome = ?report.outcome,
            "Pass complete"
        );
        Ok(report)
    }

    /// Install external plugins and customization sources that changed
    ///
    /// Skipped while the main container is unreachable; the next pass
    /// retries since nothing is recorded as synced.
    async fn sync_extensions(&mut self, snapshot: &ConfigurationSnapshot) -> Result<(), RuntimeError> {
        let desired = ExternalResources::from_snapshot(snapshot);
        if self.context.extensions.as_ref() == Some(&desired) {
            return Ok(());
        }
        if !self.runtime.can_connect(containers::INDICO).await {
            debug!("Main container unreachable, deferring external resources");
            return Ok(());
        }
        let report = extensions::sync(self.runtime.as_ref(), &desired, self.context.extensions.as_ref()).await?;
        if report.plugins_installed {
            self.context.plugins = None;
        }
        self.context.extensions = Some(desired);
        Ok(())
    }

    /// Cached plugin catalog, listed from the workload when unknown
    async fn plugins(&mut self) -> InstalledPlugins {
        if let Some(plugins) = &self.context.plugins {
            return plugins.clone();
        }
        let request = ExecRequest::new(LIST_PLUGINS_COMMAND.iter().copied()).with_user(WORKLOAD_USER);
        match self.runtime.exec(containers::INDICO, &request).await {
            Ok(output) if output.is_success() => {
                let plugins = InstalledPlugins::parse_table(&output.stdout);
                debug!(count = plugins.names().count(), "Listed installed plugins");
                self.context.plugins = Some(plugins.clone());
                plugins
            }
            Ok(output) => {
                warn!(exit_code = output.exit_code, "Listing plugins failed");
                InstalledPlugins::new()
            }
            Err(err) => {
                debug!(error = %err, "Plugins not listed yet");
                InstalledPlugins::new()
            }
        }
    }

    async fn apply(&self, pass: PassId, topology: &ServiceTopology) -> Result<PassReport, ReconcileError> {
        let mut report = PassReport::new(pass, PassOutcome::Active);
        let mut all_healthy = true;

        for (container, layer) in topology.containers() {
            if !self.runtime.can_connect(container).await {
                debug!(container, "Container unreachable, skipping");
                report.skipped.push(container.to_owned());
                continue;
            }
            if self.runtime.current_layer(container).await?.as_ref() == Some(layer) {
                report.unchanged.push(container.to_owned());
            } else {
                self.runtime.apply_layer(container, layer).await?;
                info!(container, "Applied layer");
                report.applied.push(container.to_owned());
            }
            all_healthy &= self.runtime.is_healthy(container).await?;
        }

        if !report.skipped.is_empty() || !all_healthy {
            report.outcome = PassOutcome::Waiting(WAITING_FOR_RUNTIME.to_owned());
        }
        Ok(report)
    }

    fn transition(&mut self, to: DriverPhase) -> Result<(), PhaseError> {
        validate_transition(self.phase, to)?;
        self.phase = to;
        Ok(())
    }
}
