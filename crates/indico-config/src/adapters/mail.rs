//! Mail relay channel

use crate::channel::{parse_port, Channel, ChannelAdapter, ChannelPayload};
use crate::error::InvalidConfigurationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default SMTP port when the relay publishes none
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Authentication scheme announced by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// No authentication
    None,
    /// Relay did not say
    NotProvided,
    /// Plain login
    Plain,
}

impl FromStr for AuthType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "not_provided" => Ok(Self::NotProvided),
            "plain" => Ok(Self::Plain),
            _ => Err(()),
        }
    }
}

/// Transport security announced by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// Cleartext
    None,
    /// Upgrade with STARTTLS
    Starttls,
    /// Implicit TLS
    Tls,
}

impl FromStr for TransportSecurity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "starttls" => Ok(Self::Starttls),
            "tls" => Ok(Self::Tls),
            _ => Err(()),
        }
    }
}

/// Mail relay settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailRelayConfig {
    /// Relay host
    pub host: String,
    /// Relay port
    pub port: u16,
    /// Login, only with plain authentication
    pub login: Option<String>,
    /// Password, only with plain authentication
    pub password: Option<String>,
    /// Whether any transport security is in use
    pub use_tls: bool,
}

/// Reads `{host, port, user, password, auth_type, transport_security}`
#[derive(Debug, Clone, Copy, Default)]
pub struct MailRelayAdapter;

impl ChannelAdapter for MailRelayAdapter {
    type Fragment = MailRelayConfig;

    fn channel(&self) -> Channel {
        Channel::MailRelay
    }

    fn translate(
        &self,
        payload: Option<&ChannelPayload>,
    ) -> Result<Option<MailRelayConfig>, InvalidConfigurationError> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        let Some(host) = payload.cluster_value("host") else {
            return Ok(None);
        };

        let port = payload
            .cluster_value("port")
            .map(|p| parse_port(Channel::MailRelay, "port", p))
            .transpose()?
            .unwrap_or(DEFAULT_SMTP_PORT);

        let auth_type = parse_enum::<AuthType>(payload, "auth_type", "none, not_provided or plain")?
            .unwrap_or(AuthType::None);
        let transport_security =
            parse_enum::<TransportSecurity>(payload, "transport_security", "none, starttls or tls")?
                .unwrap_or(TransportSecurity::None);

        let (login, password) = if auth_type == AuthType::Plain {
            (
                payload.cluster_value("user").map(str::to_owned),
                payload.cluster_value("password").map(str::to_owned),
            )
        } else {
            (None, None)
        };

        Ok(Some(MailRelayConfig {
            host: host.to_owned(),
            port,
            login,
            password,
            use_tls: transport_security != TransportSecurity::None,
        }))
    }
}

fn parse_enum<T: FromStr>(
    payload: &ChannelPayload,
    field: &str,
    expected: &str,
) -> Result<Option<T>, InvalidConfigurationError> {
    payload
        .cluster_value(field)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                InvalidConfigurationError::malformed(
                    Channel::MailRelay,
                    field,
                    format!("'{raw}' is not one of {expected}"),
                )
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn relay() -> ChannelPayload {
        ChannelPayload::cluster([
            ("host", "smtp.example.com"),
            ("port", "587"),
            ("user", "mailer"),
            ("password", "hunter2"),
            ("auth_type", "plain"),
            ("transport_security", "starttls"),
        ])
    }

    #[test]
    fn plain_auth_keeps_credentials() {
        let config = MailRelayAdapter.translate(Some(&relay())).unwrap().unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.login.as_deref(), Some("mailer"));
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert!(config.use_tls);
    }

    #[test]
    fn no_auth_drops_credentials() {
        let payload = relay()
            .with_cluster("auth_type", "none")
            .with_cluster("transport_security", "none");
        let config = MailRelayAdapter.translate(Some(&payload)).unwrap().unwrap();
        assert_eq!(config.login, None);
        assert_eq!(config.password, None);
        assert!(!config.use_tls);
    }

    #[test]
    fn port_defaults_to_25() {
        let payload = ChannelPayload::cluster([("host", "relay")]);
        let config = MailRelayAdapter.translate(Some(&payload)).unwrap().unwrap();
        assert_eq!(config.port, DEFAULT_SMTP_PORT);
    }

    #[test]
    fn without_host_is_absent() {
        let payload = ChannelPayload::cluster([("port", "25")]);
        assert_eq!(MailRelayAdapter.translate(Some(&payload)).unwrap(), None);
    }

    #[test]
    fn unknown_transport_security_is_rejected() {
        let payload = relay().with_cluster("transport_security", "ssl3");
        let err = MailRelayAdapter.translate(Some(&payload)).unwrap_err();
        assert_eq!(err.field, "transport_security");
    }

    #[test]
    fn unknown_auth_type_names_accepted_values() {
        let payload = relay().with_cluster("auth_type", "kerberos");
        let err = MailRelayAdapter.translate(Some(&payload)).unwrap_err();
        assert_eq!(err.field, "auth_type");
        assert!(err.to_string().contains("'kerberos' is not one of"));
    }
}
