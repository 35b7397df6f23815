//! Service topology builder
//!
//! A pure function of its inputs: the same snapshot, singleton state and
//! plugin catalog always give a byte-identical topology, so unchanged inputs
//! never restart anything.

use crate::document::ServiceTopology;
use crate::environment::WorkloadEnvironment;
use crate::error::TopologyError;
use crate::plugins::InstalledPlugins;
use crate::service::{CheckLevel, ContainerLayer, HealthCheck, ServiceDeclaration};
use indico_config::{check_readiness, ConfigurationSnapshot};
use indico_coordination::{ReplicaId, SingletonState};
use std::collections::BTreeMap;
use tracing::debug;

/// Managed container names
pub mod containers {
    /// Main application container (also runs the singleton worker)
    pub const INDICO: &str = "indico";
    /// Reverse proxy
    pub const NGINX: &str = "indico-nginx";
    /// Nginx metrics exporter
    pub const NGINX_EXPORTER: &str = "nginx-prometheus-exporter";
    /// Statsd metrics exporter
    pub const STATSD_EXPORTER: &str = "statsd-prometheus-exporter";
    /// Queue metrics exporter
    pub const CELERY_EXPORTER: &str = "celery-prometheus-exporter";

    /// Every managed container
    pub const ALL: [&str; 5] = [INDICO, NGINX, NGINX_EXPORTER, STATSD_EXPORTER, CELERY_EXPORTER];
}

/// Service name of the singleton worker inside the main container
pub const WORKER_SERVICE: &str = "celery";

/// User the application processes run as
pub const WORKLOAD_USER: &str = "indico";

/// Inputs of one topology derivation
#[derive(Debug, Clone, Copy)]
pub struct TopologyInputs<'a> {
    /// Validated snapshot
    pub snapshot: &'a ConfigurationSnapshot,
    /// Local replica
    pub replica: &'a ReplicaId,
    /// Singleton values for this pass
    pub singleton: &'a SingletonState,
    /// Installed plugins
    pub plugins: &'a InstalledPlugins,
}

/// Derives [`ServiceTopology`] documents
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologyBuilder;

impl TopologyBuilder {
    /// Create builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Derive the typed main service environment
    ///
    /// # Errors
    /// Returns [`TopologyError::NotReady`] when a mandatory dependency is
    /// missing.
    pub fn workload(&self, inputs: &TopologyInputs<'_>) -> Result<WorkloadEnvironment, TopologyError> {
        let deps = check_readiness(inputs.snapshot)?;
        Ok(WorkloadEnvironment::derive(
            inputs.snapshot,
            deps,
            inputs.singleton.secret.as_ref(),
            inputs.plugins,
        ))
    }

    /// Derive the flat main service environment
    ///
    /// # Errors
    /// Returns [`TopologyError::NotReady`] when a mandatory dependency is
    /// missing, or [`TopologyError::Json`] if a structured value fails to render.
    pub fn environment(&self, inputs: &TopologyInputs<'_>) -> Result<BTreeMap<String, String>, TopologyError> {
        self.workload(inputs)?.flatten()
    }

    /// Derive the full topology
    ///
    /// # Errors
    /// Same as [`TopologyBuilder::environment`].
    pub fn build(&self, inputs: &TopologyInputs<'_>) -> Result<ServiceTopology, TopologyError> {
        let workload = self.workload(inputs)?;
        let environment = workload.flatten()?;
        let runs_worker = inputs.singleton.runs_worker(inputs.replica);

        let mut topology = ServiceTopology::new();
        topology.insert(containers::INDICO, indico_layer(&environment, runs_worker));
        topology.insert(containers::NGINX, nginx_layer());
        topology.insert(containers::NGINX_EXPORTER, nginx_exporter_layer());
        topology.insert(containers::STATSD_EXPORTER, statsd_exporter_layer());
        topology.insert(containers::CELERY_EXPORTER, celery_exporter_layer(&workload.queue_url));

        debug!(replica = %inputs.replica, runs_worker, "Derived service topology");
        Ok(topology)
    }
}

fn indico_layer(environment: &BTreeMap<String, String>, runs_worker: bool) -> ContainerLayer {
    let mut layer = ContainerLayer::new("Indico layer")
        .with_service(
            "indico",
            ServiceDeclaration::new("Indico service", "/srv/indico/start-indico.sh")
                .with_user(WORKLOAD_USER)
                .with_environment(environment.clone()),
        )
        .with_check("indico-ready", HealthCheck::tcp(CheckLevel::Ready, 8081));

    if runs_worker {
        layer = layer
            .with_service(
                WORKER_SERVICE,
                ServiceDeclaration::new("Indico celery", "/usr/local/bin/indico celery worker -B -E")
                    .with_user(WORKLOAD_USER)
                    .with_environment(environment.clone()),
            )
            .with_check(
                "celery-ready",
                HealthCheck::exec(
                    CheckLevel::Alive,
                    "/usr/local/bin/indico celery inspect ping",
                    environment.clone(),
                )
                .with_timing(20, 19),
            );
    }
    layer
}

fn nginx_layer() -> ContainerLayer {
    ContainerLayer::new("Indico nginx layer")
        .with_service("indico-nginx", ServiceDeclaration::new("Nginx service", "/usr/sbin/nginx"))
        .with_check(
            "nginx-up",
            HealthCheck::exec(CheckLevel::Ready, "service nginx status", BTreeMap::new()),
        )
        .with_check(
            "nginx-ready",
            HealthCheck::http(CheckLevel::Alive, "http://localhost:8080/health"),
        )
}

fn nginx_exporter_layer() -> ContainerLayer {
    ContainerLayer::new("Nginx prometheus exporter")
        .with_service(
            "exporter",
            ServiceDeclaration::new(
                "Exporter",
                "nginx-prometheus-exporter -nginx.scrape-uri=http://localhost:9080/stub_status",
            ),
        )
        .with_check(
            "exporter-up",
            HealthCheck::http(CheckLevel::Alive, "http://localhost:9113/metrics"),
        )
}

fn statsd_exporter_layer() -> ContainerLayer {
    ContainerLayer::new("Statsd prometheus exporter")
        .with_service(
            "statsd-exporter",
            ServiceDeclaration::new("Statsd exporter", "statsd_exporter"),
        )
        .with_check(
            "statsd-exporter-up",
            HealthCheck::http(CheckLevel::Alive, "http://localhost:9102/metrics"),
        )
}

fn celery_exporter_layer(queue_url: &str) -> ContainerLayer {
    ContainerLayer::new("Celery prometheus exporter")
        .with_service(
            "celery-exporter",
            ServiceDeclaration::new(
                "Celery exporter",
                format!("celery-exporter --broker-url={queue_url} --port=9808"),
            ),
        )
        .with_check(
            "celery-exporter-up",
            HealthCheck::http(CheckLevel::Alive, "http://localhost:9808/health"),
        )
}
