//! Dependency channels and their raw payloads
//!
//! A channel is one external, asynchronously updated source of configuration.
//! Its payload is string-keyed data split into a cluster-level map (shared by
//! every replica of the remote dependency) and a replica-level map (published
//! by the remote replica we are connected to).

use crate::error::InvalidConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One external dependency feeding the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// Relational database
    Database,
    /// Cache endpoint
    #[serde(rename = "redis-cache")]
    Cache,
    /// Queue endpoint (background task broker)
    #[serde(rename = "redis-broker")]
    Queue,
    /// Mail relay
    #[serde(rename = "smtp")]
    MailRelay,
    /// Federated-auth provider
    #[serde(rename = "saml")]
    FederatedAuth,
    /// Object storage provider
    #[serde(rename = "s3")]
    ObjectStorage,
}

impl Channel {
    /// Every channel, in declaration order
    pub const ALL: [Channel; 6] = [
        Channel::Database,
        Channel::Cache,
        Channel::Queue,
        Channel::MailRelay,
        Channel::FederatedAuth,
        Channel::ObjectStorage,
    ];

    /// Relation name used on the wire and in status messages
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Channel::Database => "database",
            Channel::Cache => "redis-cache",
            Channel::Queue => "redis-broker",
            Channel::MailRelay => "smtp",
            Channel::FederatedAuth => "saml",
            Channel::ObjectStorage => "s3",
        }
    }

    /// Whether the workload cannot start without this channel
    #[inline]
    #[must_use]
    pub fn is_mandatory(self) -> bool {
        matches!(self, Channel::Database | Channel::Cache | Channel::Queue)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw string-keyed data published on a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelPayload {
    /// Data shared by the whole remote application
    #[serde(default)]
    pub cluster: BTreeMap<String, String>,
    /// Data published by the remote replica
    #[serde(default)]
    pub replica: BTreeMap<String, String>,
}

impl ChannelPayload {
    /// Create empty payload
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload with cluster-level entries only
    pub fn cluster<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cluster: collect(entries),
            replica: BTreeMap::new(),
        }
    }

    /// Payload with replica-level entries only
    pub fn replica<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cluster: BTreeMap::new(),
            replica: collect(entries),
        }
    }

    /// Add a cluster-level entry
    #[must_use]
    pub fn with_cluster(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cluster.insert(key.into(), value.into());
        self
    }

    /// Add a replica-level entry
    #[must_use]
    pub fn with_replica(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.replica.insert(key.into(), value.into());
        self
    }

    /// True when neither map carries data
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cluster.is_empty() && self.replica.is_empty()
    }

    /// Non-blank cluster-level value
    #[must_use]
    pub fn cluster_value(&self, key: &str) -> Option<&str> {
        non_blank(self.cluster.get(key))
    }

    /// Non-blank replica-level value
    #[must_use]
    pub fn replica_value(&self, key: &str) -> Option<&str> {
        non_blank(self.replica.get(key))
    }
}

fn collect<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Translate one channel's raw payload into a typed fragment
///
/// Adapters are pure. An absent or incomplete payload yields `Ok(None)`;
/// only malformed-but-present data is an error.
pub trait ChannelAdapter {
    /// Typed, validated fragment produced by this adapter
    type Fragment;

    /// Channel this adapter reads
    fn channel(&self) -> Channel;

    /// Translate the latest payload
    ///
    /// # Errors
    /// Returns [`InvalidConfigurationError`] naming the offending field when
    /// present data is malformed.
    fn translate(
        &self,
        payload: Option<&ChannelPayload>,
    ) -> Result<Option<Self::Fragment>, InvalidConfigurationError>;
}

/// Parse a TCP port value
pub(crate) fn parse_port(
    channel: Channel,
    field: &str,
    value: &str,
) -> Result<u16, InvalidConfigurationError> {
    match value.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(InvalidConfigurationError::invalid_port(channel, field, value)),
        Ok(port) => Ok(port),
    }
}

/// Parse an absolute URL that must carry a host
pub(crate) fn parse_url(
    channel: Channel,
    field: &str,
    value: &str,
) -> Result<url::Url, InvalidConfigurationError> {
    url::Url::parse(value.trim())
        .ok()
        .filter(|u| u.host_str().is_some())
        .ok_or_else(|| InvalidConfigurationError::invalid_url(channel, field, value))
}
