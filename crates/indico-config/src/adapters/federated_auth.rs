//! Federated-auth (SAML) channel

use crate::channel::{parse_url, Channel, ChannelAdapter, ChannelPayload};
use crate::error::InvalidConfigurationError;
use serde::{Deserialize, Serialize};

const FIELDS: [&str; 4] = ["entity_id", "metadata_url", "certificates", "endpoints"];

/// One identity-provider service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamlEndpoint {
    /// Service name, e.g. `SingleSignOnService`
    pub name: String,
    /// Service URL
    pub url: String,
    /// SAML binding URN
    pub binding: String,
    /// Response URL (logout services only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
}

/// Identity provider settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FederatedAuthConfig {
    /// Identity provider entity id
    pub entity_id: String,
    /// Metadata document URL
    pub metadata_url: String,
    /// Signing certificates, in published order
    pub certificates: Vec<String>,
    /// Service endpoints, in published order
    pub endpoints: Vec<SamlEndpoint>,
}

impl FederatedAuthConfig {
    /// Certificate used to verify assertions
    #[inline]
    #[must_use]
    pub fn primary_certificate(&self) -> Option<&str> {
        self.certificates.first().map(String::as_str)
    }
}

/// Reads `{entity_id, metadata_url, certificates, endpoints}`
///
/// `certificates` and `endpoints` are JSON arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct FederatedAuthAdapter;

impl ChannelAdapter for FederatedAuthAdapter {
    type Fragment = FederatedAuthConfig;

    fn channel(&self) -> Channel {
        Channel::FederatedAuth
    }

    fn translate(
        &self,
        payload: Option<&ChannelPayload>,
    ) -> Result<Option<FederatedAuthConfig>, InvalidConfigurationError> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        if FIELDS.iter().all(|f| payload.cluster_value(f).is_none()) {
            return Ok(None);
        }

        let required = |field: &str| {
            payload
                .cluster_value(field)
                .ok_or_else(|| InvalidConfigurationError::missing_field(Channel::FederatedAuth, field))
        };

        let entity_id = required("entity_id")?.to_owned();
        let metadata_url = required("metadata_url")?;
        parse_url(Channel::FederatedAuth, "metadata_url", metadata_url)?;

        let certificates: Vec<String> = serde_json::from_str::<Vec<String>>(required("certificates")?)
            .map_err(|e| InvalidConfigurationError::malformed(Channel::FederatedAuth, "certificates", e))?
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .collect();
        if certificates.is_empty() {
            return Err(InvalidConfigurationError::malformed(
                Channel::FederatedAuth,
                "certificates",
                "at least one certificate is required",
            ));
        }

        let endpoints: Vec<SamlEndpoint> = serde_json::from_str(required("endpoints")?)
            .map_err(|e| InvalidConfigurationError::malformed(Channel::FederatedAuth, "endpoints", e))?;
        for endpoint in &endpoints {
            validate_endpoint(endpoint)?;
        }

        Ok(Some(FederatedAuthConfig {
            entity_id,
            metadata_url: metadata_url.to_owned(),
            certificates,
            endpoints,
        }))
    }
}

fn validate_endpoint(endpoint: &SamlEndpoint) -> Result<(), InvalidConfigurationError> {
    if endpoint.name.trim().is_empty() {
        return Err(InvalidConfigurationError::malformed(
            Channel::FederatedAuth,
            "endpoints",
            "endpoint without a name",
        ));
    }
    if endpoint.binding.trim().is_empty() {
        return Err(InvalidConfigurationError::malformed(
            Channel::FederatedAuth,
            "endpoints",
            format!("endpoint {} has no binding", endpoint.name),
        ));
    }
    parse_url(Channel::FederatedAuth, "endpoints", &endpoint.url)?;
    if let Some(response_url) = &endpoint.response_url {
        parse_url(Channel::FederatedAuth, "endpoints", response_url)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const ENDPOINTS: &str = r#"[
        {"name": "SingleSignOnService", "url": "https://login.ubuntu.com/saml/", "binding": "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"},
        {"name": "SingleLogoutService", "url": "https://login.ubuntu.com/+logout", "binding": "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect", "response_url": "https://login.ubuntu.com/+logout-done"}
    ]"#;

    fn saml() -> ChannelPayload {
        ChannelPayload::cluster([
            ("entity_id", "https://login.ubuntu.com"),
            ("metadata_url", "https://login.ubuntu.com/saml/metadata"),
            ("certificates", r#"["MIIC-first", "MIIC-second"]"#),
            ("endpoints", ENDPOINTS),
        ])
    }

    #[test]
    fn parses_full_payload() {
        let config = FederatedAuthAdapter.translate(Some(&saml())).unwrap().unwrap();
        assert_eq!(config.entity_id, "https://login.ubuntu.com");
        assert_eq!(config.primary_certificate(), Some("MIIC-first"));
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].response_url, None);
        assert_eq!(
            config.endpoints[1].response_url.as_deref(),
            Some("https://login.ubuntu.com/+logout-done")
        );
    }

    #[test]
    fn empty_payload_is_absent() {
        assert_eq!(FederatedAuthAdapter.translate(Some(&ChannelPayload::new())).unwrap(), None);
    }

    #[test]
    fn partial_payload_names_missing_field() {
        let mut payload = saml();
        payload.cluster.remove("certificates");
        let err = FederatedAuthAdapter.translate(Some(&payload)).unwrap_err();
        assert_eq!(err.field, "certificates");
    }

    #[test]
    fn bad_endpoint_url_is_rejected() {
        let payload = saml().with_cluster(
            "endpoints",
            r#"[{"name": "SingleSignOnService", "url": "nowhere", "binding": "b"}]"#,
        );
        let err = FederatedAuthAdapter.translate(Some(&payload)).unwrap_err();
        assert_eq!(err.field, "endpoints");
    }

    #[test]
    fn empty_certificate_list_is_rejected() {
        let payload = saml().with_cluster("certificates", "[]");
        assert!(FederatedAuthAdapter.translate(Some(&payload)).is_err());
    }

    #[test]
    fn blank_certificates_are_skipped() {
        let payload = saml().with_cluster("certificates", r#"["", "  ", "MIIC-real"]"#);
        let config = FederatedAuthAdapter.translate(Some(&payload)).unwrap().unwrap();
        assert_eq!(config.primary_certificate(), Some("MIIC-real"));
        assert_eq!(config.certificates, vec!["MIIC-real".to_owned()]);

        let blanks = saml().with_cluster("certificates", r#"["", " "]"#);
        let err = FederatedAuthAdapter.translate(Some(&blanks)).unwrap_err();
        assert_eq!(err.field, "certificates");
    }
}
