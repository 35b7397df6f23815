//! Scenario files
//!
//! A scenario is a YAML description of everything one replica observes:
//!
//! ```yaml
//! replica: indico/0
//! role: coordinator
//! plugins: [saml_groups]
//! inputs:
//!   payloads:
//!     database:
//!       cluster: {username: user1, password: somepass, endpoint: "pg.local:5432", database: indico}
//!     redis-cache:
//!       replica: {hostname: cache-host, port: "1011"}
//!   options:
//!     site_url: https://events.example.com
//! ```

use anyhow::{bail, Context};
use indico_config::{check_readiness, RawInputs, SnapshotBuilder};
use indico_coordination::{MemoryRecordStore, ReplicaId, ReplicaRole, SingletonManager};
use indico_core::{
    MemoryDependencySource, MemoryRuntime, MemoryStatusReporter, PassOutcome, ReconcileContext,
    ReconcileEvent, Reconciler,
};
use indico_topology::{containers, InstalledPlugins, ServiceTopology};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Replica id used when a scenario names none
pub const DEFAULT_REPLICA: &str = "indico/0";

/// Inputs of one replica, as loaded from a file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Local replica
    #[serde(default = "default_replica")]
    pub replica: ReplicaId,
    /// Role from the external election
    #[serde(default = "default_role")]
    pub role: ReplicaRole,
    /// Plugins installed in the workload image
    #[serde(default)]
    pub plugins: Vec<String>,
    /// Payloads, options and proxy variables
    #[serde(default)]
    pub inputs: RawInputs,
}

fn default_replica() -> ReplicaId {
    ReplicaId::new(DEFAULT_REPLICA)
}

fn default_role() -> ReplicaRole {
    ReplicaRole::Coordinator
}

/// Result of validating a scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Snapshot valid and every mandatory dependency present
    Ready,
    /// Snapshot valid, a mandatory dependency missing
    Waiting(String),
    /// Configuration rejected
    Invalid {
        /// Offending field
        field: String,
        /// Message shown as blocked status
        message: String,
    },
}

impl Scenario {
    /// Parse a scenario from YAML text
    ///
    /// # Errors
    /// Fails when the text is not a valid scenario document.
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("invalid scenario document")
    }

    /// Load a scenario file
    ///
    /// # Errors
    /// Fails when the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("failed to load scenario {}", path.display()))
    }

    /// Override the local replica
    #[must_use]
    pub fn with_replica(mut self, replica: impl Into<ReplicaId>) -> Self {
        self.replica = replica.into();
        self
    }

    /// Override the local role
    #[must_use]
    pub fn with_role(mut self, role: ReplicaRole) -> Self {
        self.role = role;
        self
    }

    /// Validate the inputs and check readiness
    #[must_use]
    pub fn validate(&self) -> Validation {
        match SnapshotBuilder::new().build(&self.inputs) {
            Err(err) => Validation::Invalid {
                field: err.field.clone(),
                message: err.to_string(),
            },
            Ok(snapshot) => match check_readiness(&snapshot) {
                Ok(_) => Validation::Ready,
                Err(missing) => Validation::Waiting(missing.to_string()),
            },
        }
    }

    /// Run one pass against in-memory collaborators and return the applied topology
    ///
    /// # Errors
    /// Fails when the pass does not reach the apply phase or a collaborator fails.
    pub async fn render(&self) -> anyhow::Result<ServiceTopology> {
        let sources = MemoryDependencySource::new();
        for (channel, payload) in &self.inputs.payloads {
            sources.set(*channel, payload.clone());
        }
        let runtime = MemoryRuntime::new();
        let context = ReconcileContext::new(self.replica.clone(), self.role)
            .with_options(self.inputs.options.clone())
            .with_proxy(self.inputs.proxy.clone())
            .with_plugins(self.plugins.iter().cloned().collect::<InstalledPlugins>());

        let mut driver = Reconciler::new(
            context,
            Arc::new(sources),
            Arc::new(runtime.clone()),
            Arc::new(MemoryStatusReporter::new()),
            SingletonManager::new(Arc::new(MemoryRecordStore::new())),
        );
        let report = driver
            .handle(ReconcileEvent::ReapplyRequested)
            .await
            .context("reconciliation pass failed")?;
        match &report.outcome {
            PassOutcome::Blocked(msg) => bail!("configuration blocked: {msg}"),
            PassOutcome::Waiting(msg) if report.fingerprint.is_none() => bail!("not ready: {msg}"),
            _ => {}
        }

        let mut topology = ServiceTopology::new();
        for container in containers::ALL {
            if let Some(layer) = runtime.layer(container) {
                topology.insert(container, layer);
            }
        }
        info!(
            replica = %self.replica,
            containers = topology.len(),
            fingerprint = report.fingerprint.as_deref().unwrap_or("-"),
            "Rendered topology"
        );
        Ok(topology)
    }
}
