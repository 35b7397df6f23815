//! Dependency channel adapters
//!
//! One adapter per channel. Each turns the latest [`ChannelPayload`] into a
//! typed fragment:
//! - [`DatabaseAdapter`] → [`DatabaseConfig`]
//! - [`EndpointAdapter`] → [`EndpointConfig`] (cache and queue)
//! - [`MailRelayAdapter`] → [`MailRelayConfig`]
//! - [`FederatedAuthAdapter`] → [`FederatedAuthConfig`]
//! - [`ObjectStorageAdapter`] → [`ObjectStorageConfig`]
//!
//! [`ChannelPayload`]: crate::channel::ChannelPayload

mod database;
mod endpoint;
mod federated_auth;
mod mail;
mod object_storage;

pub use database::{DatabaseAdapter, DatabaseConfig};
pub use endpoint::{EndpointAdapter, EndpointConfig, ENDPOINT_SCHEME};
pub use federated_auth::{FederatedAuthAdapter, FederatedAuthConfig, SamlEndpoint};
pub use mail::{AuthType, MailRelayAdapter, MailRelayConfig, TransportSecurity, DEFAULT_SMTP_PORT};
pub use object_storage::{ObjectStorageAdapter, ObjectStorageConfig};
