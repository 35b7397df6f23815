//! Operator-invoked admin actions
//!
//! Actions run a command inside the main container with the same
//! environment the main service gets, so they need a ready configuration
//! and a reachable container.

use crate::context::ReconcileContext;
use crate::error::{ActionError, RuntimeError, TransientApplyError};
use crate::extensions::{self, ExternalResources};
use crate::runtime::{ExecOutput, ExecRequest, WorkloadRuntime};
use crate::source::{gather_inputs, DependencySource};
use indico_config::{ConfigurationSnapshot, SnapshotBuilder};
use indico_coordination::{ReplicaRole, SingletonManager};
use indico_topology::{containers, TopologyBuilder, TopologyError, TopologyInputs, WORKLOAD_USER};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Application command line tool inside the main container
pub const INDICO_BIN: &str = "/usr/local/bin/indico";

/// Working directory of admin commands
pub const WORKLOAD_DIR: &str = "/srv/indico";

/// Most addresses a single anonymize request may carry
pub const MAX_ANONYMIZE_EMAILS: usize = 50;

/// Separator of the anonymize address list and of its joined output
pub const EMAIL_SEPARATOR: char = ',';

/// Result of an admin action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    /// Address(es) the action ran for
    pub user: String,
    /// Command output
    pub output: String,
    /// Failure message when the action did not fully succeed
    pub failure: Option<String>,
}

impl ActionReport {
    /// Check if the action succeeded
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs admin actions against the workload
pub struct AdminActions {
    sources: Arc<dyn DependencySource>,
    runtime: Arc<dyn WorkloadRuntime>,
    singletons: SingletonManager,
}

impl std::fmt::Debug for AdminActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminActions").finish_non_exhaustive()
    }
}

impl AdminActions {
    /// Create actions over the driver's collaborators
    #[must_use]
    pub fn new(
        sources: Arc<dyn DependencySource>,
        runtime: Arc<dyn WorkloadRuntime>,
        singletons: SingletonManager,
    ) -> Self {
        Self {
            sources,
            runtime,
            singletons,
        }
    }

    /// Create an administrator account
    ///
    /// # Errors
    /// Returns [`ActionError`] when the configuration is not ready, the
    /// container is unreachable or the command fails.
    pub async fn add_admin(
        &self,
        context: &ReconcileContext,
        email: &str,
        password: &str,
    ) -> Result<ActionReport, ActionError> {
        let environment = self.prepare(context).await?;
        let request = command(["autocreate", "admin", email, password], environment);
        let output = self.exec(&request).await?;
        if !output.is_success() {
            warn!(email, exit_code = output.exit_code, "Admin creation failed");
            return Err(ActionError::Failed(format!(
                "Failed to create admin {email}: {}",
                output.stdout
            )));
        }
        info!(email, "Created admin");
        Ok(ActionReport {
            user: email.to_owned(),
            output: output.stdout,
            failure: None,
        })
    }

    /// Anonymize a comma-separated list of users
    ///
    /// Every address is attempted even after a failure; the report then
    /// carries a failure message alongside the collected output.
    ///
    /// # Errors
    /// Returns [`ActionError::Rejected`] for more than
    /// [`MAX_ANONYMIZE_EMAILS`] addresses, otherwise as
    /// [`AdminActions::add_admin`].
    pub async fn anonymize_users(
        &self,
        context: &ReconcileContext,
        emails: &str,
    ) -> Result<ActionReport, ActionError> {
        let addresses: Vec<&str> = emails
            .split(EMAIL_SEPARATOR)
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();
        if addresses.len() > MAX_ANONYMIZE_EMAILS {
            return Err(ActionError::Rejected(format!(
                "Failed to anonymize user: List of more than {MAX_ANONYMIZE_EMAILS} emails are not allowed"
            )));
        }

        let environment = self.prepare(context).await?;
        let mut outputs = Vec::with_capacity(addresses.len());
        let mut failed = false;
        for email in addresses.iter().copied() {
            let request = command(["anonymize", "user", email], environment.clone());
            let output = self.exec(&request).await?;
            if !output.is_success() {
                warn!(email, exit_code = output.exit_code, "Anonymization failed");
                failed = true;
            }
            outputs.push(output.stdout.replace('\n', ""));
        }

        info!(count = addresses.len(), failed, "Anonymized users");
        Ok(ActionReport {
            user: addresses.join(","),
            output: outputs.join(","),
            failure: failed
                .then(|| "Failed to anonymize one or more users, please verify the results.".to_owned()),
        })
    }

    /// Pull customization changes and upgrade the external plugins
    ///
    /// Returns the combined command output; empty when neither is
    /// configured.
    ///
    /// # Errors
    /// Returns [`ActionError::Failed`] when git or pip exits with an error,
    /// otherwise as [`AdminActions::add_admin`].
    pub async fn refresh_external_resources(&self, context: &ReconcileContext) -> Result<String, ActionError> {
        let snapshot = self.snapshot(context).await?;
        let resources = ExternalResources::from_snapshot(&snapshot);

        let mut outputs = Vec::new();
        if let Some(pulled) = extensions::pull_customization(self.runtime.as_ref(), &resources)
            .await
            .map_err(action_failure)?
        {
            outputs.push(pulled);
        }
        if !resources.plugins.is_empty() {
            let installed = extensions::install_plugins(self.runtime.as_ref(), &resources, true)
                .await
                .map_err(action_failure)?;
            outputs.push(installed);
        }
        info!(
            customization = resources.customization_url.is_some(),
            plugins = resources.plugins.len(),
            "Refreshed external resources"
        );
        Ok(outputs.join("\n"))
    }

    /// Ready snapshot of the current configuration
    async fn snapshot(&self, context: &ReconcileContext) -> Result<ConfigurationSnapshot, ActionError> {
        if !self.runtime.can_connect(containers::INDICO).await {
            return Err(ActionError::Unreachable);
        }
        let inputs = gather_inputs(self.sources.as_ref(), &context.options, &context.proxy)
            .await
            .map_err(TransientApplyError::from)?;
        SnapshotBuilder::new()
            .build(&inputs)
            .map_err(|err| ActionError::NotReady(err.to_string()))
    }

    /// Main service environment for the current configuration
    async fn prepare(&self, context: &ReconcileContext) -> Result<BTreeMap<String, String>, ActionError> {
        let snapshot = self.snapshot(context).await?;

        // Read-only: actions never move singletons.
        let mut input = context.coordination_input();
        input.role = ReplicaRole::Follower;
        let singleton = self
            .singletons
            .run(&input)
            .await
            .map_err(TransientApplyError::from)?;

        let plugins = context.plugins.clone().unwrap_or_default();
        TopologyBuilder::new()
            .environment(&TopologyInputs {
                snapshot: &snapshot,
                replica: &context.replica,
                singleton: &singleton,
                plugins: &plugins,
            })
            .map_err(|err| match err {
                TopologyError::NotReady(missing) => ActionError::NotReady(missing.to_string()),
                other => ActionError::Failed(other.to_string()),
            })
    }

    async fn exec(&self, request: &ExecRequest) -> Result<ExecOutput, ActionError> {
        self.runtime
            .exec(containers::INDICO, request)
            .await
            .map_err(|err| ActionError::Transient(err.into()))
    }
}

fn action_failure(err: RuntimeError) -> ActionError {
    match err {
        RuntimeError::ExecFailed { reason, .. } => ActionError::Failed(reason),
        other => ActionError::Transient(other.into()),
    }
}

fn command<'a>(args: impl IntoIterator<Item = &'a str>, environment: BTreeMap<String, String>) -> ExecRequest {
    ExecRequest::new(std::iter::once(INDICO_BIN).chain(args))
        .with_user(WORKLOAD_USER)
        .with_working_dir(WORKLOAD_DIR)
        .with_environment(environment)
}

