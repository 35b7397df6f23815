//! Operator-supplied configuration options
//!
//! Options arrive as one YAML/JSON document. Every field is defaulted so a
//! partial document is valid input; validation happens in
//! [`OperatorConfig::validate`], which the snapshot builder calls.

use crate::error::InvalidConfigurationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+$").ok());

/// Options set by the operator of the deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Public URL of the site; empty means a synthesized local hostname
    pub site_url: String,
    /// Reload customizations on every request
    pub customization_debug: bool,
    /// Enable the room booking module
    pub enable_roombooking: bool,
    /// Comma-separated list of extra plugin packages
    pub external_plugins: String,
    /// Git repository with site customizations
    pub customization_sources_url: String,
    /// Support address shown to logged-in users
    pub indico_support_email: String,
    /// Support address shown publicly
    pub indico_public_support_email: String,
    /// Sender address for automated mail
    pub indico_no_reply_email: String,
    /// Application name, used for the default hostname
    pub app_name: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            customization_debug: false,
            enable_roombooking: false,
            external_plugins: String::new(),
            customization_sources_url: String::new(),
            indico_support_email: "support-tech@mydomain.local".to_owned(),
            indico_public_support_email: "support@mydomain.local".to_owned(),
            indico_no_reply_email: "noreply@mydomain.local".to_owned(),
            app_name: "indico".to_owned(),
        }
    }
}

impl OperatorConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a YAML (or JSON) document
    ///
    /// # Errors
    /// Returns an error when the document is not valid YAML for this shape.
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    /// Set site URL
    #[must_use]
    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = url.into();
        self
    }

    /// Set application name
    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set extra plugins
    #[must_use]
    pub fn with_external_plugins(mut self, plugins: impl Into<String>) -> Self {
        self.external_plugins = plugins.into();
        self
    }

    /// Set customization repository
    #[must_use]
    pub fn with_customization_sources(mut self, url: impl Into<String>) -> Self {
        self.customization_sources_url = url.into();
        self
    }

    /// Set support address
    #[must_use]
    pub fn with_support_email(mut self, email: impl Into<String>) -> Self {
        self.indico_support_email = email.into();
        self
    }

    /// Enable room booking
    #[must_use]
    pub fn with_roombooking(mut self, enabled: bool) -> Self {
        self.enable_roombooking = enabled;
        self
    }

    /// Enable customization debugging
    #[must_use]
    pub fn with_customization_debug(mut self, enabled: bool) -> Self {
        self.customization_debug = enabled;
        self
    }

    /// Extra plugin names, blanks removed
    #[must_use]
    pub fn external_plugin_list(&self) -> Vec<String> {
        self.external_plugins
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Validate options and derive the site identity
    ///
    /// # Errors
    /// Returns [`InvalidConfigurationError`] for an unparsable `site_url` or a
    /// malformed email option.
    pub fn validate(&self) -> Result<SiteIdentity, InvalidConfigurationError> {
        for (name, value) in [
            ("indico_support_email", &self.indico_support_email),
            ("indico_public_support_email", &self.indico_public_support_email),
            ("indico_no_reply_email", &self.indico_no_reply_email),
        ] {
            if !value.is_empty() && !is_valid_email(value) {
                return Err(InvalidConfigurationError::invalid_email(name));
            }
        }
        SiteIdentity::from_options(self)
    }
}

fn is_valid_email(value: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(value))
}

/// Externally visible identity of the site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteIdentity {
    /// Public hostname
    pub hostname: String,
    /// URL scheme
    pub scheme: String,
    /// Explicit port, if the URL carries one
    pub port: Option<u16>,
}

impl SiteIdentity {
    fn from_options(options: &OperatorConfig) -> Result<Self, InvalidConfigurationError> {
        let site_url = options.site_url.trim();
        if site_url.is_empty() {
            return Ok(Self {
                hostname: format!("{}.local", options.app_name),
                scheme: "http".to_owned(),
                port: None,
            });
        }

        let invalid = || {
            InvalidConfigurationError::new("site_url", "Configuration option site_url is not valid")
        };
        let url = url::Url::parse(site_url).map_err(|_| invalid())?;
        let hostname = url.host_str().ok_or_else(invalid)?.to_owned();
        Ok(Self {
            hostname,
            scheme: url.scheme().to_owned(),
            port: url.port(),
        })
    }

    /// Site URL rebuilt from its parts
    #[must_use]
    pub fn url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.scheme, self.hostname),
            None => format!("{}://{}", self.scheme, self.hostname),
        }
    }
}
