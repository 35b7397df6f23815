//! Indico Config - dependency channels and configuration snapshots
//!
//! This crate turns everything the controller observes into one validated
//! [`ConfigurationSnapshot`]:
//! - Channel adapters translating raw relation payloads into typed fragments
//! - Operator options and the derived site identity
//! - Model proxy settings from the process environment
//! - The readiness gate over the mandatory dependencies
//!
//! # Example
//!
//! ```rust
//! use indico_config::{Channel, ChannelPayload, RawInputs, SnapshotBuilder, check_readiness};
//!
//! let inputs = RawInputs::new().with_payload(
//!     Channel::Cache,
//!     ChannelPayload::replica([("hostname", "cache-host"), ("port", "1011")]),
//! );
//! let snapshot = SnapshotBuilder::new().build(&inputs).unwrap();
//! let waiting = check_readiness(&snapshot).unwrap_err();
//! assert_eq!(waiting.to_string(), "Waiting for redis-broker availability");
//! ```

pub mod adapters;
pub mod channel;
pub mod error;
pub mod options;
pub mod proxy;
pub mod readiness;
pub mod snapshot;

pub use adapters::{
    AuthType, DatabaseAdapter, DatabaseConfig, EndpointAdapter, EndpointConfig,
    FederatedAuthAdapter, FederatedAuthConfig, MailRelayAdapter, MailRelayConfig,
    ObjectStorageAdapter, ObjectStorageConfig, SamlEndpoint, TransportSecurity,
};
pub use channel::{Channel, ChannelAdapter, ChannelPayload};
pub use error::{InvalidConfigurationError, MissingDependencyError};
pub use options::{OperatorConfig, SiteIdentity};
pub use proxy::{ProxyConfig, ProxyEnvironment};
pub use readiness::{check_readiness, is_ready, MandatoryDependencies, READINESS_ORDER};
pub use snapshot::{ConfigurationSnapshot, RawInputs, SnapshotBuilder};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
