//! Model proxy settings from the process environment

use crate::error::InvalidConfigurationError;
use serde::{Deserialize, Serialize};

/// Variable carrying the HTTP proxy URL
pub const HTTP_PROXY_VAR: &str = "JUJU_CHARM_HTTP_PROXY";
/// Variable carrying the HTTPS proxy URL
pub const HTTPS_PROXY_VAR: &str = "JUJU_CHARM_HTTPS_PROXY";
/// Variable carrying the proxy bypass list
pub const NO_PROXY_VAR: &str = "JUJU_CHARM_NO_PROXY";

const INVALID_PROXY: &str = "Invalid model proxy configuration.";

/// Raw proxy variables, as read from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEnvironment {
    /// Value of `JUJU_CHARM_HTTP_PROXY`
    #[serde(default)]
    pub http_proxy: Option<String>,
    /// Value of `JUJU_CHARM_HTTPS_PROXY`
    #[serde(default)]
    pub https_proxy: Option<String>,
    /// Value of `JUJU_CHARM_NO_PROXY`
    #[serde(default)]
    pub no_proxy: Option<String>,
}

impl ProxyEnvironment {
    /// Read the proxy variables of the current process
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read proxy variables through an arbitrary lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            http_proxy: read(HTTP_PROXY_VAR),
            https_proxy: read(HTTPS_PROXY_VAR),
            no_proxy: read(NO_PROXY_VAR),
        }
    }

    /// Validate into a [`ProxyConfig`]
    ///
    /// Returns `Ok(None)` when neither proxy URL is set.
    ///
    /// # Errors
    /// Returns [`InvalidConfigurationError`] naming the variable when a set
    /// URL does not parse or has no host.
    pub fn validate(&self) -> Result<Option<ProxyConfig>, InvalidConfigurationError> {
        if self.http_proxy.is_none() && self.https_proxy.is_none() {
            return Ok(None);
        }
        Ok(Some(ProxyConfig {
            http_proxy: check_url(HTTP_PROXY_VAR, self.http_proxy.as_deref())?,
            https_proxy: check_url(HTTPS_PROXY_VAR, self.https_proxy.as_deref())?,
            no_proxy: self.no_proxy.clone(),
        }))
    }
}

fn check_url(var: &str, value: Option<&str>) -> Result<Option<String>, InvalidConfigurationError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(None);
    };
    let valid = url::Url::parse(value)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some());
    if valid {
        Ok(Some(value.to_owned()))
    } else {
        Err(InvalidConfigurationError::new(var, INVALID_PROXY))
    }
}

/// Validated proxy settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// HTTP proxy URL
    pub http_proxy: Option<String>,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Comma-separated hosts that bypass the proxy
    pub no_proxy: Option<String>,
}
