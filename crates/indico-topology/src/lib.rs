//! Indico Topology - declarative service topology derivation
//!
//! Turns a ready configuration snapshot into the layer document the container
//! runtime applies:
//! - One layer per managed container, keyed by container name
//! - The singleton worker only on the replica holding it
//! - Typed environment flattened to strings at the very end
//! - A SHA-256 fingerprint so callers can detect unchanged topologies

pub mod builder;
pub mod document;
pub mod environment;
pub mod error;
pub mod plugins;
pub mod service;

pub use builder::{containers, TopologyBuilder, TopologyInputs, WORKER_SERVICE, WORKLOAD_USER};
pub use document::ServiceTopology;
pub use environment::{
    FederatedAuthSettings, IdentityProviderKind, SmtpSettings, StorageBackends, WorkloadEnvironment,
    AUTH_PROVIDER_NAME, DEFAULT_STORAGE,
};
pub use error::TopologyError;
pub use plugins::{InstalledPlugins, LIST_PLUGINS_COMMAND, SAML_GROUPS_PLUGIN};
pub use service::{CheckLevel, CheckMethod, ContainerLayer, HealthCheck, ServiceDeclaration, StartupPolicy};
