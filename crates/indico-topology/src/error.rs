//! Error types for topology derivation

use indico_config::MissingDependencyError;

/// Topology could not be derived or rendered
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Snapshot lacks a mandatory dependency
    #[error(transparent)]
    NotReady(#[from] MissingDependencyError),

    /// JSON rendering failed
    #[error("failed to render topology as JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML rendering failed
    #[error("failed to render topology as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
