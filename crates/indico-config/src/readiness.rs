//! Readiness gate
//!
//! The workload needs the database and both redis endpoints. Missing
//! dependencies are checked in a fixed order (queue, cache, database) so the
//! reported waiting reason is stable.

use crate::adapters::{DatabaseConfig, EndpointConfig};
use crate::channel::Channel;
use crate::error::MissingDependencyError;
use crate::snapshot::ConfigurationSnapshot;

/// Order in which mandatory channels are checked
pub const READINESS_ORDER: [Channel; 3] = [Channel::Queue, Channel::Cache, Channel::Database];

/// Mandatory fragments of a ready snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MandatoryDependencies<'a> {
    /// Database
    pub database: &'a DatabaseConfig,
    /// Cache endpoint
    pub cache: &'a EndpointConfig,
    /// Queue endpoint
    pub queue: &'a EndpointConfig,
}

/// Check that every mandatory dependency is present
///
/// # Errors
/// Returns [`MissingDependencyError`] naming the first missing channel in
/// [`READINESS_ORDER`].
pub fn check_readiness(
    snapshot: &ConfigurationSnapshot,
) -> Result<MandatoryDependencies<'_>, MissingDependencyError> {
    let queue = snapshot
        .queue
        .as_ref()
        .ok_or(MissingDependencyError(Channel::Queue))?;
    let cache = snapshot
        .cache
        .as_ref()
        .ok_or(MissingDependencyError(Channel::Cache))?;
    let database = snapshot
        .database
        .as_ref()
        .ok_or(MissingDependencyError(Channel::Database))?;
    Ok(MandatoryDependencies {
        database,
        cache,
        queue,
    })
}

/// Whether every mandatory dependency is present
#[inline]
#[must_use]
pub fn is_ready(snapshot: &ConfigurationSnapshot) -> bool {
    check_readiness(snapshot).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MailRelayConfig, ObjectStorageConfig};
    use crate::options::OperatorConfig;
    use proptest::prelude::*;

    fn snapshot(database: bool, cache: bool, queue: bool) -> ConfigurationSnapshot {
        let options = OperatorConfig::new();
        ConfigurationSnapshot {
            database: database.then(|| DatabaseConfig {
                uri: "postgresql://u:p@db:5432/indico".to_owned(),
            }),
            cache: cache.then(|| EndpointConfig::new("cache-host", 1011)),
            queue: queue.then(|| EndpointConfig::new("broker-host", 1010)),
            mail_relay: None,
            federated_auth: None,
            object_storage: None,
            proxy: None,
            site: options.validate().unwrap(),
            options,
        }
    }

    #[test]
    fn reports_queue_first() {
        let err = check_readiness(&snapshot(false, false, false)).unwrap_err();
        assert_eq!(err.to_string(), "Waiting for redis-broker availability");
    }

    #[test]
    fn reports_cache_before_database() {
        let err = check_readiness(&snapshot(false, false, true)).unwrap_err();
        assert_eq!(err.to_string(), "Waiting for redis-cache availability");
    }

    #[test]
    fn reports_database_last() {
        let err = check_readiness(&snapshot(false, true, true)).unwrap_err();
        assert_eq!(err.to_string(), "Waiting for database availability");
    }

    proptest! {
        #[test]
        fn ready_iff_all_mandatory_present(
            database in any::<bool>(),
            cache in any::<bool>(),
            queue in any::<bool>(),
            mail in any::<bool>(),
            s3 in any::<bool>(),
        ) {
            let mut snap = snapshot(database, cache, queue);
            if mail {
                snap.mail_relay = Some(MailRelayConfig {
                    host: "relay".to_owned(),
                    port: 25,
                    login: None,
                    password: None,
                    use_tls: false,
                });
            }
            if s3 {
                snap.object_storage = Some(ObjectStorageConfig {
                    bucket: "b".to_owned(),
                    host: None,
                    access_key: "a".to_owned(),
                    secret_key: "s".to_owned(),
                });
            }
            prop_assert_eq!(is_ready(&snap), database && cache && queue);
        }
    }
}
