//! Cache and queue endpoint channels
//!
//! Both channels share one wire shape: the remote replica publishes
//! `hostname` and `port`, and the remote cluster may publish a `leader-host`
//! that supersedes the per-replica host.

use crate::channel::{parse_port, Channel, ChannelAdapter, ChannelPayload};
use crate::error::InvalidConfigurationError;
use serde::{Deserialize, Serialize};

/// URL scheme of cache and queue endpoints
pub const ENDPOINT_SCHEME: &str = "redis";

/// Cache or queue endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host published by the remote replica
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Cluster-wide leader host, when the remote is highly available
    pub leader_host: Option<String>,
}

impl EndpointConfig {
    /// Create endpoint without leader override
    #[inline]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            leader_host: None,
        }
    }

    /// Set leader host override
    #[inline]
    #[must_use]
    pub fn with_leader_host(mut self, host: impl Into<String>) -> Self {
        self.leader_host = Some(host.into());
        self
    }

    /// Host clients should connect to; the leader host always wins
    #[inline]
    #[must_use]
    pub fn effective_host(&self) -> &str {
        self.leader_host.as_deref().unwrap_or(&self.host)
    }

    /// `redis://host:port`
    #[must_use]
    pub fn url(&self) -> String {
        format!("{ENDPOINT_SCHEME}://{}:{}", self.effective_host(), self.port)
    }
}

/// Adapter for the cache or the queue channel
#[derive(Debug, Clone, Copy)]
pub struct EndpointAdapter {
    channel: Channel,
}

impl EndpointAdapter {
    /// Adapter for the cache channel
    #[inline]
    #[must_use]
    pub fn cache() -> Self {
        Self {
            channel: Channel::Cache,
        }
    }

    /// Adapter for the queue channel
    #[inline]
    #[must_use]
    pub fn queue() -> Self {
        Self {
            channel: Channel::Queue,
        }
    }
}

impl ChannelAdapter for EndpointAdapter {
    type Fragment = EndpointConfig;

    fn channel(&self) -> Channel {
        self.channel
    }

    fn translate(
        &self,
        payload: Option<&ChannelPayload>,
    ) -> Result<Option<EndpointConfig>, InvalidConfigurationError> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        let (Some(host), Some(port)) = (payload.replica_value("hostname"), payload.replica_value("port"))
        else {
            return Ok(None);
        };

        let port = parse_port(self.channel, "port", port)?;
        let mut endpoint = EndpointConfig::new(host, port);
        if let Some(leader) = payload.cluster_value("leader-host") {
            endpoint = endpoint.with_leader_host(leader);
        }
        Ok(Some(endpoint))
    }
}
