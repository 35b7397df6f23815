//! Workload environment
//!
//! Derived configuration stays typed until [`WorkloadEnvironment::flatten`]
//! renders it into the flat string map the runtime consumes. Structured values
//! (storage backends, identity providers) are rendered as JSON.

use crate::error::TopologyError;
use crate::plugins::{InstalledPlugins, SAML_GROUPS_PLUGIN};
use indico_config::adapters::DEFAULT_SMTP_PORT;
use indico_config::{
    ConfigurationSnapshot, FederatedAuthConfig, MailRelayConfig, MandatoryDependencies, ProxyConfig,
    SiteIdentity,
};
use indico_coordination::SharedSecret;
use serde::Serialize;
use std::collections::BTreeMap;

/// Filesystem backend always present in the storage block
pub const DEFAULT_STORAGE: &str = "fs:/srv/indico/archive";

/// Mail relay settings, defaulted when no relay is configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    /// Relay host, empty when absent
    pub server: String,
    /// Relay port
    pub port: u16,
    /// Login, empty when absent
    pub login: String,
    /// Password, empty when absent
    pub password: String,
    /// Transport security in use
    pub use_tls: bool,
}

impl SmtpSettings {
    fn from_relay(relay: Option<&MailRelayConfig>) -> Self {
        match relay {
            Some(relay) => Self {
                server: relay.host.clone(),
                port: relay.port,
                login: relay.login.clone().unwrap_or_default(),
                password: relay.password.clone().unwrap_or_default(),
                use_tls: relay.use_tls,
            },
            None => Self {
                server: String::new(),
                port: DEFAULT_SMTP_PORT,
                login: String::new(),
                password: String::new(),
                use_tls: false,
            },
        }
    }
}

/// Storage backends by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageBackends {
    /// Filesystem backend
    pub default: String,
    /// Object storage backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<String>,
}

impl StorageBackends {
    /// Backend new attachments are written to
    #[must_use]
    pub fn attachment_backend(&self) -> &'static str {
        if self.s3.is_some() {
            "s3"
        } else {
            "default"
        }
    }
}

/// Identity provider variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProviderKind {
    /// Plain SAML
    Saml,
    /// SAML with group synchronisation
    SamlGroups,
}

impl IdentityProviderKind {
    /// Groups-capable variant wins whenever its plugin is installed
    #[must_use]
    pub fn detect(plugins: &InstalledPlugins) -> Self {
        if plugins.contains(SAML_GROUPS_PLUGIN) {
            Self::SamlGroups
        } else {
            Self::Saml
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct AuthProvider {
    #[serde(rename = "type")]
    kind: &'static str,
    saml_config: SamlSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SamlSettings {
    strict: bool,
    sp: ServiceProvider,
    idp: IdentityProviderSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ServiceProvider {
    #[serde(rename = "entityId")]
    entity_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct IdentityProviderSettings {
    #[serde(rename = "entityId")]
    entity_id: String,
    x509cert: String,
    #[serde(flatten)]
    services: BTreeMap<String, IdpService>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct IdpService {
    url: String,
    binding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct IdentityProvider {
    #[serde(rename = "type")]
    kind: IdentityProviderKind,
    trusted_email: bool,
    mapping: IdentityMapping,
    identifier_field: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct IdentityMapping {
    user_name: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    email: &'static str,
}

/// Provider name used for the federated login
pub const AUTH_PROVIDER_NAME: &str = "ubuntu";

/// Authentication and identity provider blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedAuthSettings {
    auth: BTreeMap<&'static str, AuthProvider>,
    identity: BTreeMap<&'static str, IdentityProvider>,
}

impl FederatedAuthSettings {
    fn derive(config: &FederatedAuthConfig, site: &SiteIdentity, plugins: &InstalledPlugins) -> Self {
        let services = config
            .endpoints
            .iter()
            .map(|endpoint| {
                (
                    lower_first(&endpoint.name),
                    IdpService {
                        url: endpoint.url.clone(),
                        binding: endpoint.binding.clone(),
                        response_url: endpoint.response_url.clone(),
                    },
                )
            })
            .collect();

        let auth = AuthProvider {
            kind: "saml",
            saml_config: SamlSettings {
                strict: true,
                sp: ServiceProvider {
                    entity_id: site.url(),
                },
                idp: IdentityProviderSettings {
                    entity_id: config.entity_id.clone(),
                    x509cert: config.primary_certificate().unwrap_or_default().to_owned(),
                    services,
                },
            },
        };
        let identity = IdentityProvider {
            kind: IdentityProviderKind::detect(plugins),
            trusted_email: true,
            mapping: IdentityMapping {
                user_name: "username",
                first_name: "fullname",
                last_name: "",
                email: "email",
            },
            identifier_field: "openid",
        };

        Self {
            auth: BTreeMap::from([(AUTH_PROVIDER_NAME, auth)]),
            identity: BTreeMap::from([(AUTH_PROVIDER_NAME, identity)]),
        }
    }

    /// Identity provider variant in use
    #[must_use]
    pub fn identity_kind(&self) -> Option<IdentityProviderKind> {
        self.identity.get(AUTH_PROVIDER_NAME).map(|p| p.kind)
    }
}

/// `SingleSignOnService` → `singleSignOnService`
fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Typed environment of the main and singleton services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadEnvironment {
    /// Database URI
    pub database_uri: String,
    /// Cache URL
    pub cache_url: String,
    /// Queue URL
    pub queue_url: String,
    /// Shared secret, when known
    pub secret_key: Option<String>,
    /// Public site identity
    pub site: SiteIdentity,
    /// Mail relay
    pub smtp: SmtpSettings,
    /// Support address
    pub support_email: String,
    /// Public support address
    pub public_support_email: String,
    /// Sender address
    pub no_reply_email: String,
    /// Customization debugging
    pub customization_debug: bool,
    /// Room booking module
    pub enable_roombooking: bool,
    /// Installed plugins to enable
    pub extra_plugins: Vec<String>,
    /// Storage backends
    pub storage: StorageBackends,
    /// Federated login, when configured
    pub federated_auth: Option<FederatedAuthSettings>,
    /// Proxy, when configured
    pub proxy: Option<ProxyConfig>,
}

impl WorkloadEnvironment {
    /// Derive the environment from a ready snapshot
    #[must_use]
    pub fn derive(
        snapshot: &ConfigurationSnapshot,
        deps: MandatoryDependencies<'_>,
        secret: Option<&SharedSecret>,
        plugins: &InstalledPlugins,
    ) -> Self {
        let options = &snapshot.options;
        Self {
            database_uri: deps.database.uri.clone(),
            cache_url: deps.cache.url(),
            queue_url: deps.queue.url(),
            secret_key: secret.map(|s| s.expose().to_owned()),
            site: snapshot.site.clone(),
            smtp: SmtpSettings::from_relay(snapshot.mail_relay.as_ref()),
            support_email: options.indico_support_email.clone(),
            public_support_email: options.indico_public_support_email.clone(),
            no_reply_email: options.indico_no_reply_email.clone(),
            customization_debug: options.customization_debug,
            enable_roombooking: options.enable_roombooking,
            extra_plugins: plugins.names().map(str::to_owned).collect(),
            storage: StorageBackends {
                default: DEFAULT_STORAGE.to_owned(),
                s3: snapshot.object_storage.as_ref().map(|s3| s3.connection_string()),
            },
            federated_auth: snapshot
                .federated_auth
                .as_ref()
                .map(|auth| FederatedAuthSettings::derive(auth, &snapshot.site, plugins)),
            proxy: snapshot.proxy.clone(),
        }
    }

    /// Render as the flat variable map given to the runtime
    ///
    /// # Errors
    /// Returns [`TopologyError::Json`] if a structured value fails to render.
    pub fn flatten(&self) -> Result<BTreeMap<String, String>, TopologyError> {
        let mut env = BTreeMap::new();
        let mut set = |key: &str, value: String| {
            env.insert(key.to_owned(), value);
        };

        set("DB_URI", self.database_uri.clone());
        set("CACHE_URL", self.cache_url.clone());
        set("QUEUE_URL", self.queue_url.clone());
        if let Some(secret) = &self.secret_key {
            set("SECRET_KEY", secret.clone());
        }

        set("SERVICE_HOSTNAME", self.site.hostname.clone());
        set("SERVICE_SCHEME", self.site.scheme.clone());
        if let Some(port) = self.site.port {
            set("SERVICE_PORT", port.to_string());
        }

        set("SMTP_SERVER", self.smtp.server.clone());
        set("SMTP_PORT", self.smtp.port.to_string());
        set("SMTP_LOGIN", self.smtp.login.clone());
        set("SMTP_PASSWORD", self.smtp.password.clone());
        set("SMTP_USE_TLS", self.smtp.use_tls.to_string());

        set("INDICO_SUPPORT_EMAIL", self.support_email.clone());
        set("INDICO_PUBLIC_SUPPORT_EMAIL", self.public_support_email.clone());
        set("INDICO_NO_REPLY_EMAIL", self.no_reply_email.clone());
        set("CUSTOMIZATION_DEBUG", self.customization_debug.to_string());
        set("ENABLE_ROOMBOOKING", self.enable_roombooking.to_string());
        set("INDICO_EXTRA_PLUGINS", self.extra_plugins.join(","));

        set("ATTACHMENT_STORAGE", self.storage.attachment_backend().to_owned());
        set("STORAGE_DICT", serde_json::to_string(&self.storage)?);

        if let Some(auth) = &self.federated_auth {
            set("INDICO_AUTH_PROVIDERS", serde_json::to_string(&auth.auth)?);
            set("INDICO_IDENTITY_PROVIDERS", serde_json::to_string(&auth.identity)?);
        }

        if let Some(proxy) = &self.proxy {
            if let Some(http) = &proxy.http_proxy {
                set("HTTP_PROXY", http.clone());
            }
            if let Some(https) = &proxy.https_proxy {
                set("HTTPS_PROXY", https.clone());
            }
            if let Some(no_proxy) = &proxy.no_proxy {
                set("NO_PROXY", no_proxy.clone());
            }
        }

        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_first_letter() {
        assert_eq!(lower_first("SingleSignOnService"), "singleSignOnService");
        assert_eq!(lower_first(""), "");
    }

    #[test]
    fn storage_block_keeps_default_entry() {
        let storage = StorageBackends {
            default: DEFAULT_STORAGE.to_owned(),
            s3: Some("s3:bucket=b".to_owned()),
        };
        assert_eq!(storage.attachment_backend(), "s3");
        assert_eq!(
            serde_json::to_string(&storage).unwrap(),
            r#"{"default":"fs:/srv/indico/archive","s3":"s3:bucket=b"}"#
        );
    }

    #[test]
    fn identity_kind_follows_plugins() {
        let plain = InstalledPlugins::new();
        let groups: InstalledPlugins = ["saml_groups"].into_iter().collect();
        assert_eq!(IdentityProviderKind::detect(&plain), IdentityProviderKind::Saml);
        assert_eq!(IdentityProviderKind::detect(&groups), IdentityProviderKind::SamlGroups);
    }
}
