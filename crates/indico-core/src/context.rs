//! Per-replica driver context
//!
//! Everything the driver remembers between passes lives here, including the
//! cached plugin catalog, so tests can seed deterministic values.

use crate::event::ReconcileEvent;
use crate::extensions::ExternalResources;
use indico_config::{OperatorConfig, ProxyEnvironment};
use indico_coordination::{CoordinationInput, ReplicaId, ReplicaRole};
use indico_topology::InstalledPlugins;
use std::collections::BTreeSet;

/// State carried by one replica's driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileContext {
    /// Local replica
    pub replica: ReplicaId,
    /// Role from the external election
    pub role: ReplicaRole,
    /// Operator options
    pub options: OperatorConfig,
    /// Proxy variables
    pub proxy: ProxyEnvironment,
    /// Live peers (excluding us), once known
    pub live_peers: Option<BTreeSet<ReplicaId>>,
    /// Departures not yet handled by a coordinator pass
    pub departed: BTreeSet<ReplicaId>,
    /// Cached plugin catalog
    pub plugins: Option<InstalledPlugins>,
    /// External resources installed by the last sync
    pub extensions: Option<ExternalResources>,
}

impl ReconcileContext {
    /// Create context with default options and no proxy
    pub fn new(replica: impl Into<ReplicaId>, role: ReplicaRole) -> Self {
        Self {
            replica: replica.into(),
            role,
            options: OperatorConfig::default(),
            proxy: ProxyEnvironment::default(),
            live_peers: None,
            departed: BTreeSet::new(),
            plugins: None,
            extensions: None,
        }
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

    /// Set known live peers
    #[must_use]
    pub fn with_peers(mut self, peers: impl IntoIterator<Item = ReplicaId>) -> Self {
        self.live_peers = Some(peers.into_iter().collect());
        self
    }

    /// Seed the plugin catalog
    #[must_use]
    pub fn with_plugins(mut self, plugins: InstalledPlugins) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Fold an event into the context
    pub fn observe(&mut self, event: &ReconcileEvent) {
        match event {
            ReconcileEvent::DependencyChanged(_) => {}
            ReconcileEvent::ConfigChanged(options) => self.options = options.clone(),
            ReconcileEvent::RoleChanged(role) => self.role = *role,
            ReconcileEvent::PeerJoined(peer) => {
                if *peer != self.replica {
                    self.live_peers.get_or_insert_with(BTreeSet::new).insert(peer.clone());
                }
                self.departed.remove(peer);
            }
            ReconcileEvent::PeerDeparted(peer) => {
                if let Some(peers) = &mut self.live_peers {
                    peers.remove(peer);
                }
                self.departed.insert(peer.clone());
            }
            ReconcileEvent::ReapplyRequested => {
                self.plugins = None;
                self.extensions = None;
            }
        }
    }

    /// Forget departures a coordinator pass has placed the worker against
    pub fn departures_handled(&mut self, handled: &BTreeSet<ReplicaId>) {
        self.departed.retain(|replica| !handled.contains(replica));
    }

    /// Input for the singleton manager
    #[must_use]
    pub fn coordination_input(&self) -> CoordinationInput {
        CoordinationInput {
            replica: self.replica.clone(),
            role: self.role,
            departed: self.departed.clone(),
            live_peers: self.live_peers.clone(),
        }
    }
}
