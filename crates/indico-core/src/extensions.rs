//! External plugins and customization sources
//!
//! Both live inside the main container rather than in its layer, so they are
//! installed by running commands before the plugin catalog is listed. A pass
//! only runs the steps whose inputs changed since the last successful sync:
//! - git proxy settings, so pip and git reach remote repositories
//! - `pip install` of the external plugins (plus the S3 storage plugin when
//!   object storage is configured)
//! - a fresh clone of the customization repository when its URL changed

use crate::error::RuntimeError;
use crate::runtime::{ExecOutput, ExecRequest, WorkloadRuntime};
use indico_config::{ConfigurationSnapshot, ProxyConfig};
use indico_topology::{containers, WORKLOAD_USER};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Plugin installed whenever object storage is configured
pub const S3_STORAGE_PLUGIN: &str = "indico-plugin-storage-s3";

/// Checkout of the customization repository
pub const CUSTOMIZATION_DIR: &str = "/srv/indico/custom";

/// Interpreter used to install plugins
pub const PIP_COMMAND: [&str; 4] = ["python3", "-m", "pip", "install"];

/// Exit code of `git config --unset` when the key was never set
const GIT_CONFIG_KEY_MISSING: i32 = 5;

/// What the main container needs installed beyond its image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalResources {
    /// Plugin packages, in configuration order
    pub plugins: Vec<String>,
    /// Customization repository, when configured
    pub customization_url: Option<String>,
    /// Proxy used for downloads
    pub proxy: Option<ProxyConfig>,
}

impl ExternalResources {
    /// Resources required by a validated snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: &ConfigurationSnapshot) -> Self {
        let mut plugins = snapshot.options.external_plugin_list();
        if snapshot.object_storage.is_some() && !plugins.iter().any(|p| p == S3_STORAGE_PLUGIN) {
            plugins.push(S3_STORAGE_PLUGIN.to_owned());
        }
        let url = snapshot.options.customization_sources_url.trim();
        Self {
            plugins,
            customization_url: (!url.is_empty()).then(|| url.to_owned()),
            proxy: snapshot.proxy.clone(),
        }
    }

    /// Proxy variables for download commands
    #[must_use]
    pub fn proxy_environment(&self) -> BTreeMap<String, String> {
        let mut environment = BTreeMap::new();
        let Some(proxy) = &self.proxy else {
            return environment;
        };
        for (key, value) in [
            ("HTTP_PROXY", &proxy.http_proxy),
            ("HTTPS_PROXY", &proxy.https_proxy),
            ("NO_PROXY", &proxy.no_proxy),
        ] {
            if let Some(value) = value {
                environment.insert(key.to_owned(), value.clone());
            }
        }
        environment
    }
}

/// Steps a sync actually ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Git proxy settings were rewritten
    pub proxy_configured: bool,
    /// Plugin packages were installed
    pub plugins_installed: bool,
    /// Customization checkout was replaced
    pub customization_replaced: bool,
}

/// Bring the main container in line with `desired`
///
/// `previous` is what the last successful sync installed; steps whose inputs
/// are unchanged are skipped.
///
/// # Errors
/// Returns [`RuntimeError`] when a command cannot run or exits with an
/// unexpected status.
pub async fn sync(
    runtime: &dyn WorkloadRuntime,
    desired: &ExternalResources,
    previous: Option<&ExternalResources>,
) -> Result<SyncReport, RuntimeError> {
    let mut report = SyncReport::default();

    if previous.map(|p| &p.proxy) != Some(&desired.proxy) {
        configure_git_proxy(runtime, desired.proxy.as_ref()).await?;
        report.proxy_configured = true;
    }

    let plugins_changed = previous.map(|p| &p.plugins) != Some(&desired.plugins);
    if plugins_changed && !desired.plugins.is_empty() {
        install_plugins(runtime, desired, false).await?;
        report.plugins_installed = true;
    }

    if previous.map(|p| &p.customization_url) != Some(&desired.customization_url) {
        report.customization_replaced = replace_customization(runtime, desired).await?;
    }

    Ok(report)
}

/// Pull the latest customization changes
///
/// Returns the pull output, or `None` when no repository is configured.
///
/// # Errors
/// Returns [`RuntimeError`] when the pull cannot run or fails.
pub async fn pull_customization(
    runtime: &dyn WorkloadRuntime,
    resources: &ExternalResources,
) -> Result<Option<String>, RuntimeError> {
    let Some(url) = &resources.customization_url else {
        return Ok(None);
    };
    debug!(url, "Pulling customization changes");
    let request = in_checkout(["git", "pull"]).with_environment(resources.proxy_environment());
    let output = checked(runtime, &request).await?;
    Ok(Some(output.stdout))
}

/// Install (or upgrade, when `upgrade`) the external plugins
///
/// # Errors
/// Returns [`RuntimeError`] when pip cannot run or fails.
pub async fn install_plugins(
    runtime: &dyn WorkloadRuntime,
    resources: &ExternalResources,
    upgrade: bool,
) -> Result<String, RuntimeError> {
    let flags = upgrade.then_some("--upgrade");
    let command = PIP_COMMAND
        .iter()
        .copied()
        .chain(flags)
        .chain(resources.plugins.iter().map(String::as_str));
    let request = ExecRequest::new(command).with_environment(resources.proxy_environment());
    let output = checked(runtime, &request).await?;
    info!(plugins = ?resources.plugins, upgrade, "Installed external plugins");
    Ok(output.stdout)
}

async fn configure_git_proxy(runtime: &dyn WorkloadRuntime, proxy: Option<&ProxyConfig>) -> Result<(), RuntimeError> {
    let http = proxy.and_then(|p| p.http_proxy.as_deref());
    let https = proxy.and_then(|p| p.https_proxy.as_deref());
    for (key, value) in [("http.proxy", http), ("https.proxy", https)] {
        let request = match value {
            Some(url) => ExecRequest::new(["git", "config", "--global", key, url]),
            None => ExecRequest::new(["git", "config", "--global", "--unset", key]),
        };
        let output = run(runtime, &request).await?;
        let unset_missing = value.is_none() && output.exit_code == GIT_CONFIG_KEY_MISSING;
        if !output.is_success() && !unset_missing {
            return Err(exec_failed(&request, &output));
        }
    }
    debug!(http = http.is_some(), https = https.is_some(), "Configured git proxy");
    Ok(())
}

async fn replace_customization(
    runtime: &dyn WorkloadRuntime,
    desired: &ExternalResources,
) -> Result<bool, RuntimeError> {
    // A missing checkout reports an error; treat it as no remote.
    let current = run(runtime, &in_checkout(["git", "config", "--get", "remote.origin.url"])).await?;
    let current_url = if current.is_success() { current.stdout.trim() } else { "" };
    let wanted_url = desired.customization_url.as_deref().unwrap_or("");
    if current_url == wanted_url {
        return Ok(false);
    }

    info!(previous = current_url, url = wanted_url, "Replacing customization checkout");
    let reset: [&[&str]; 2] = [&["rm", "-rf", CUSTOMIZATION_DIR], &["mkdir", CUSTOMIZATION_DIR]];
    for command in reset {
        let request = ExecRequest::new(command.iter().copied()).with_user(WORKLOAD_USER);
        checked(runtime, &request).await?;
    }
    if let Some(url) = &desired.customization_url {
        let request = in_checkout(["git", "clone", url.as_str(), "."]).with_environment(desired.proxy_environment());
        checked(runtime, &request).await?;
    }
    Ok(true)
}

fn in_checkout<'a>(command: impl IntoIterator<Item = &'a str>) -> ExecRequest {
    ExecRequest::new(command)
        .with_user(WORKLOAD_USER)
        .with_working_dir(CUSTOMIZATION_DIR)
}

async fn run(runtime: &dyn WorkloadRuntime, request: &ExecRequest) -> Result<ExecOutput, RuntimeError> {
    runtime.exec(containers::INDICO, request).await
}

async fn checked(runtime: &dyn WorkloadRuntime, request: &ExecRequest) -> Result<ExecOutput, RuntimeError> {
    let output = run(runtime, request).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(exec_failed(request, &output))
    }
}

fn exec_failed(request: &ExecRequest, output: &ExecOutput) -> RuntimeError {
    RuntimeError::ExecFailed {
        container: containers::INDICO.to_owned(),
        reason: format!(
            "'{}' exited with {}: {}",
            request.command_line(),
            output.exit_code,
            output.stderr.trim()
        ),
    }
}
