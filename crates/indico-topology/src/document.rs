//! Topology document handed to the runtime boundary

use crate::error::TopologyError;
use crate::service::ContainerLayer;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Layers keyed by container name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ServiceTopology {
    containers: BTreeMap<String, ContainerLayer>,
}

impl ServiceTopology {
    /// Create empty topology
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a container layer
    pub fn insert(&mut self, container: impl Into<String>, layer: ContainerLayer) {
        self.containers.insert(container.into(), layer);
    }

    /// Layer of one container
    #[must_use]
    pub fn container(&self, name: &str) -> Option<&ContainerLayer> {
        self.containers.get(name)
    }

    /// Containers in name order
    pub fn containers(&self) -> impl Iterator<Item = (&str, &ContainerLayer)> {
        self.containers.iter().map(|(name, layer)| (name.as_str(), layer))
    }

    /// Number of containers
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Check if there are no containers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Canonical JSON rendering
    ///
    /// # Errors
    /// Returns [`TopologyError::Json`] if rendering fails.
    pub fn to_json(&self) -> Result<String, TopologyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// YAML rendering
    ///
    /// # Errors
    /// Returns [`TopologyError::Yaml`] if rendering fails.
    pub fn to_yaml(&self) -> Result<String, TopologyError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// SHA-256 over the compact canonical JSON, hex-encoded
    ///
    /// # Errors
    /// Returns [`TopologyError::Json`] if rendering fails.
    pub fn fingerprint(&self) -> Result<String, TopologyError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
