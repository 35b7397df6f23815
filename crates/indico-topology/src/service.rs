//! Declarative service and health-check types
//!
//! One [`ContainerLayer`] per managed container, holding its services and
//! health checks. The shapes mirror what the container runtime consumes.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Whether the runtime starts a service automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupPolicy {
    /// Start with the container
    Enabled,
}

/// One process the runtime supervises
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDeclaration {
    /// Always `replace`: the layer fully defines the service
    #[serde(rename = "override")]
    pub override_mode: &'static str,
    /// Human-readable summary
    pub summary: String,
    /// Command line
    pub command: String,
    /// Startup policy
    pub startup: StartupPolicy,
    /// User the process runs as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Flat environment
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl ServiceDeclaration {
    /// Create enabled service without user or environment
    pub fn new(summary: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            override_mode: "replace",
            summary: summary.into(),
            command: command.into(),
            startup: StartupPolicy::Enabled,
            user: None,
            environment: BTreeMap::new(),
        }
    }

    /// Run as `user`
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set environment
    #[must_use]
    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }
}

/// Severity of a failing check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckLevel {
    /// Failing means not ready for traffic
    Ready,
    /// Failing means the process must be restarted
    Alive,
}

/// How a check reaches the workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMethod {
    /// TCP connect to a local port
    Tcp {
        /// Port
        port: u16,
    },
    /// HTTP GET expecting a success status
    Http {
        /// URL
        url: String,
    },
    /// Command expected to exit with zero
    Exec {
        /// Command line
        command: String,
        /// Environment for the command
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        environment: BTreeMap<String, String>,
    },
}

/// Periodic health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// Always `replace`
    #[serde(rename = "override")]
    pub override_mode: &'static str,
    /// Severity
    pub level: CheckLevel,
    /// Interval in seconds; runtime default when absent
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "seconds")]
    pub period: Option<u32>,
    /// Timeout in seconds; runtime default when absent
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "seconds")]
    pub timeout: Option<u32>,
    /// Method
    #[serde(flatten)]
    pub method: CheckMethod,
}

impl HealthCheck {
    /// Check with runtime-default timing
    #[must_use]
    pub fn new(level: CheckLevel, method: CheckMethod) -> Self {
        Self {
            override_mode: "replace",
            level,
            period: None,
            timeout: None,
            method,
        }
    }

    /// TCP connect to a local port
    #[must_use]
    pub fn tcp(level: CheckLevel, port: u16) -> Self {
        Self::new(level, CheckMethod::Tcp { port })
    }

    /// HTTP GET
    #[must_use]
    pub fn http(level: CheckLevel, url: impl Into<String>) -> Self {
        Self::new(level, CheckMethod::Http { url: url.into() })
    }

    /// Command with environment
    #[must_use]
    pub fn exec(level: CheckLevel, command: impl Into<String>, environment: BTreeMap<String, String>) -> Self {
        Self::new(
            level,
            CheckMethod::Exec {
                command: command.into(),
                environment,
            },
        )
    }

    /// Set interval and timeout
    #[must_use]
    pub fn with_timing(mut self, period_secs: u32, timeout_secs: u32) -> Self {
        self.period = Some(period_secs);
        self.timeout = Some(timeout_secs);
        self
    }
}

#[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
fn seconds<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(secs) => serializer.serialize_str(&format!("{secs}s")),
        None => serializer.serialize_none(),
    }
}

/// Everything the runtime needs for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerLayer {
    /// Layer summary
    pub summary: String,
    /// Services by name
    pub services: BTreeMap<String, ServiceDeclaration>,
    /// Checks by name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, HealthCheck>,
}

impl ContainerLayer {
    /// Create empty layer
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            services: BTreeMap::new(),
            checks: BTreeMap::new(),
        }
    }

    /// Add a service
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, service: ServiceDeclaration) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// Add a check
    #[must_use]
    pub fn with_check(mut self, name: impl Into<String>, check: HealthCheck) -> Self {
        self.checks.insert(name.into(), check);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_serialises_like_runtime_layer() {
        let check = HealthCheck::exec(CheckLevel::Alive, "ping", BTreeMap::new()).with_timing(20, 19);
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "override": "replace",
                "level": "alive",
                "period": "20s",
                "timeout": "19s",
                "exec": {"command": "ping"}
            })
        );
    }

    #[test]
    fn tcp_check_has_no_timing() {
        let json = serde_json::to_value(HealthCheck::tcp(CheckLevel::Ready, 8081)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"override": "replace", "level": "ready", "tcp": {"port": 8081}})
        );
    }

    #[test]
    fn service_starts_with_container() {
        let service = ServiceDeclaration::new("Indico", "/srv/indico/start.sh").with_user("indico");
        let json = serde_json::to_value(&service).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "override": "replace",
                "summary": "Indico",
                "command": "/srv/indico/start.sh",
                "startup": "enabled",
                "user": "indico"
            })
        );
    }
}
