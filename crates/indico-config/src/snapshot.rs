//! Configuration snapshot builder
//!
//! The builder runs every adapter over the gathered [`RawInputs`] and
//! aggregates the fragments into one immutable [`ConfigurationSnapshot`].
//! Fragments are validated independently; the first malformed input aborts
//! the build with an [`InvalidConfigurationError`].

use crate::adapters::{
    DatabaseAdapter, DatabaseConfig, EndpointAdapter, EndpointConfig, FederatedAuthAdapter,
    FederatedAuthConfig, MailRelayAdapter, MailRelayConfig, ObjectStorageAdapter,
    ObjectStorageConfig,
};
use crate::channel::{Channel, ChannelAdapter, ChannelPayload};
use crate::error::InvalidConfigurationError;
use crate::options::{OperatorConfig, SiteIdentity};
use crate::proxy::{ProxyConfig, ProxyEnvironment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Everything gathered before validation
///
/// Compared by value: the driver uses equality to detect that a blocked
/// configuration has not changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInputs {
    /// Latest payload per channel; missing key means nothing received
    #[serde(default)]
    pub payloads: BTreeMap<Channel, ChannelPayload>,
    /// Operator options
    #[serde(default)]
    pub options: OperatorConfig,
    /// Proxy variables
    #[serde(default)]
    pub proxy: ProxyEnvironment,
}

impl RawInputs {
    /// Create empty inputs with default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one channel payload
    #[must_use]
    pub fn with_payload(mut self, channel: Channel, payload: ChannelPayload) -> Self {
        self.payloads.insert(channel, payload);
        self
    }

    /// Set operator options
    #[must_use]
    pub fn with_options(mut self, options: OperatorConfig) -> Self {
        self.options = options;
        self
    }

    /// Set proxy variables
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyEnvironment) -> Self {
        self.proxy = proxy;
        self
    }

    /// Payload of a channel, treating an empty payload as absent
    #[must_use]
    pub fn payload(&self, channel: Channel) -> Option<&ChannelPayload> {
        self.payloads.get(&channel).filter(|p| !p.is_empty())
    }
}

/// One validated aggregation of every configuration source
///
/// Two snapshots with equal fields are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    /// Database, mandatory
    pub database: Option<DatabaseConfig>,
    /// Cache endpoint, mandatory
    pub cache: Option<EndpointConfig>,
    /// Queue endpoint, mandatory
    pub queue: Option<EndpointConfig>,
    /// Mail relay
    pub mail_relay: Option<MailRelayConfig>,
    /// Identity provider
    pub federated_auth: Option<FederatedAuthConfig>,
    /// Object storage
    pub object_storage: Option<ObjectStorageConfig>,
    /// Model proxy
    pub proxy: Option<ProxyConfig>,
    /// Public site identity
    pub site: SiteIdentity,
    /// Operator options the snapshot was built from
    pub options: OperatorConfig,
}

impl ConfigurationSnapshot {
    /// Whether the given channel produced a fragment
    #[must_use]
    pub fn has(&self, channel: Channel) -> bool {
        match channel {
            Channel::Database => self.database.is_some(),
            Channel::Cache => self.cache.is_some(),
            Channel::Queue => self.queue.is_some(),
            Channel::MailRelay => self.mail_relay.is_some(),
            Channel::FederatedAuth => self.federated_auth.is_some(),
            Channel::ObjectStorage => self.object_storage.is_some(),
        }
    }
}

/// Builds [`ConfigurationSnapshot`]s from [`RawInputs`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Create builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate and aggregate all inputs
    ///
    /// # Errors
    /// Returns the first [`InvalidConfigurationError`] raised by the options,
    /// the proxy variables or any channel adapter.
    pub fn build(&self, inputs: &RawInputs) -> Result<ConfigurationSnapshot, InvalidConfigurationError> {
        let site = inputs.options.validate()?;
        let proxy = inputs.proxy.validate()?;

        let snapshot = ConfigurationSnapshot {
            database: translate(&DatabaseAdapter, inputs)?,
            cache: translate(&EndpointAdapter::cache(), inputs)?,
            queue: translate(&EndpointAdapter::queue(), inputs)?,
            mail_relay: translate(&MailRelayAdapter, inputs)?,
            federated_auth: translate(&FederatedAuthAdapter, inputs)?,
            object_storage: translate(&ObjectStorageAdapter, inputs)?,
            proxy,
            site,
            options: inputs.options.clone(),
        };

        let present: Vec<&str> = Channel::ALL
            .into_iter()
            .filter(|c| snapshot.has(*c))
            .map(Channel::name)
            .collect();
        debug!(channels = ?present, "Built configuration snapshot");
        Ok(snapshot)
    }
}

fn translate<A: ChannelAdapter>(
    adapter: &A,
    inputs: &RawInputs,
) -> Result<Option<A::Fragment>, InvalidConfigurationError> {
    adapter.translate(inputs.payload(adapter.channel()))
}
