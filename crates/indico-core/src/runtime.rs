//! Container runtime boundary
//!
//! The driver only produces layers. Starting processes, probing health and
//! running commands belong to the runtime behind [`WorkloadRuntime`].

use crate::error::RuntimeError;
use async_trait::async_trait;
use indico_topology::ContainerLayer;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Command to run inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Program and arguments
    pub command: Vec<String>,
    /// User to run as
    pub user: Option<String>,
    /// Working directory
    pub working_dir: Option<String>,
    /// Environment
    pub environment: BTreeMap<String, String>,
}

impl ExecRequest {
    /// Create request from program and arguments
    pub fn new<S: Into<String>>(command: impl IntoIterator<Item = S>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            user: None,
            working_dir: None,
            environment: BTreeMap::new(),
        }
    }

    /// Run as `user`
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Run in `dir`
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set environment
    #[must_use]
    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Command line joined with spaces
    #[must_use]
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit status
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ExecOutput {
    /// Successful output
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output
    pub fn failure(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Check if the command exited with zero
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runtime that supervises the workload containers
#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    /// Check if the container accepts requests
    async fn can_connect(&self, container: &str) -> bool;

    /// Layer currently applied to the container
    async fn current_layer(&self, container: &str) -> Result<Option<ContainerLayer>, RuntimeError>;

    /// Replace the container's layer and restart changed services
    async fn apply_layer(&self, container: &str, layer: &ContainerLayer) -> Result<(), RuntimeError>;

    /// Check if every health check of the container passes
    async fn is_healthy(&self, container: &str) -> Result<bool, RuntimeError>;

    /// Run a command to completion
    async fn exec(&self, container: &str, request: &ExecRequest) -> Result<ExecOutput, RuntimeError>;
}

/// In-memory [`WorkloadRuntime`] shared by cloning
///
/// Containers are reachable and healthy unless marked otherwise. Commands
/// succeed with empty output unless a response is registered for their
/// command line.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuntime {
    state: Arc<Mutex<RuntimeState>>,
}

#[derive(Debug, Default)]
struct RuntimeState {
    layers: BTreeMap<String, ContainerLayer>,
    applies: BTreeMap<String, u32>,
    unreachable: BTreeSet<String>,
    unhealthy: BTreeSet<String>,
    fail_apply: bool,
    responses: Vec<(String, ExecOutput)>,
    executed: Vec<(String, ExecRequest)>,
}

impl MemoryRuntime {
    /// Create runtime with every container reachable
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a container unreachable (or reachable again)
    pub fn set_reachable(&self, container: &str, reachable: bool) {
        let mut state = self.state.lock();
        if reachable {
            state.unreachable.remove(container);
        } else {
            state.unreachable.insert(container.to_owned());
        }
    }

    /// Mark a container unhealthy (or healthy again)
    pub fn set_healthy(&self, container: &str, healthy: bool) {
        let mut state = self.state.lock();
        if healthy {
            state.unhealthy.remove(container);
        } else {
            state.unhealthy.insert(container.to_owned());
        }
    }

    /// Make every layer apply fail
    pub fn set_fail_apply(&self, fail: bool) {
        self.state.lock().fail_apply = fail;
    }

    /// Respond to commands whose command line starts with `prefix`
    pub fn respond(&self, prefix: impl Into<String>, output: ExecOutput) {
        self.state.lock().responses.push((prefix.into(), output));
    }

    /// Layer currently held for a container
    #[must_use]
    pub fn layer(&self, container: &str) -> Option<ContainerLayer> {
        self.state.lock().layers.get(container).cloned()
    }

    /// Number of times a layer was applied to a container
    #[must_use]
    pub fn apply_count(&self, container: &str) -> u32 {
        self.state.lock().applies.get(container).copied().unwrap_or(0)
    }

    /// Commands run so far, with their container
    #[must_use]
    pub fn executed(&self) -> Vec<(String, ExecRequest)> {
        self.state.lock().executed.clone()
    }

    fn check_reachable(&self, container: &str) -> Result<(), RuntimeError> {
        if self.state.lock().unreachable.contains(container) {
            Err(RuntimeError::Unreachable(container.to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorkloadRuntime for MemoryRuntime {
    async fn can_connect(&self, container: &str) -> bool {
        !self.state.lock().unreachable.contains(container)
    }

    async fn current_layer(&self, container: &str) -> Result<Option<ContainerLayer>, RuntimeError> {
        self.check_reachable(container)?;
        Ok(self.layer(container))
    }

    async fn apply_layer(&self, container: &str, layer: &ContainerLayer) -> Result<(), RuntimeError> {
        self.check_reachable(container)?;
        let mut state = self.state.lock();
        if state.fail_apply {
            return Err(RuntimeError::ApplyFailed {
                container: container.to_owned(),
                reason: "injected failure".to_owned(),
            });
        }
        state.layers.insert(container.to_owned(), layer.clone());
        *state.applies.entry(container.to_owned()).or_default() += 1;
        Ok(())
    }

    async fn is_healthy(&self, container: &str) -> Result<bool, RuntimeError> {
        self.check_reachable(container)?;
        let state = self.state.lock();
        Ok(state.layers.contains_key(container) && !state.unhealthy.contains(container))
    }

    async fn exec(&self, container: &str, request: &ExecRequest) -> Result<ExecOutput, RuntimeError> {
        self.check_reachable(container)?;
        let line = request.command_line();
        let mut state = self.state.lock();
        state.executed.push((container.to_owned(), request.clone()));
        let output = state
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}
