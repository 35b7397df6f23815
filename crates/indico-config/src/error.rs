//! Error types for configuration gathering
//!
//! Two failure kinds leave this crate:
//! - [`InvalidConfigurationError`]: present-but-malformed input, fatal until the input changes
//! - [`MissingDependencyError`]: a mandatory channel has no data yet, resolved by a later trigger

use crate::channel::Channel;

/// Present-but-malformed configuration input
///
/// The `Display` output is the message alone, so it can be surfaced
/// verbatim as a blocked status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvalidConfigurationError {
    /// Name of the offending field (wire key, option name or variable)
    pub field: String,
    /// Human-readable explanation
    pub message: String,
}

impl InvalidConfigurationError {
    /// Create error for a field with a custom message
    #[inline]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Port value that is not a valid TCP port
    pub fn invalid_port(channel: Channel, field: &str, value: &str) -> Self {
        Self::new(
            field,
            format!("Invalid {field} '{value}' in {channel} relation data: expected a TCP port"),
        )
    }

    /// URL value that failed to parse
    pub fn invalid_url(channel: Channel, field: &str, value: &str) -> Self {
        Self::new(
            field,
            format!("Invalid {field} '{value}' in {channel} relation data: not a valid URL"),
        )
    }

    /// Field missing from an otherwise populated payload
    pub fn missing_field(channel: Channel, field: &str) -> Self {
        Self::new(field, format!("Missing {field} in {channel} relation data"))
    }

    /// Field with a value outside the accepted set or shape
    pub fn malformed(channel: Channel, field: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            field,
            format!("Malformed {field} in {channel} relation data: {reason}"),
        )
    }

    /// Operator option that is not a valid email address
    pub fn invalid_email(option: &str) -> Self {
        Self::new(
            option,
            format!("Configuration option {option} is not a valid email address"),
        )
    }
}

/// A mandatory dependency channel has not supplied data yet
///
/// Not a failure: the driver reports it as a waiting status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("Waiting for {0} availability")]
pub struct MissingDependencyError(pub Channel);

impl MissingDependencyError {
    /// Channel that is missing
    #[inline]
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_displays_message_only() {
        let err = InvalidConfigurationError::new("site_url", "Configuration option site_url is not valid");
        assert_eq!(err.to_string(), "Configuration option site_url is not valid");
        assert_eq!(err.field, "site_url");
    }

    #[test]
    fn invalid_port_names_field() {
        let err = InvalidConfigurationError::invalid_port(Channel::Cache, "port", "abc");
        assert_eq!(err.field, "port");
        assert!(err.to_string().contains("redis-cache"));
        assert!(err.to_string().contains("'abc'"));
    }

    #[test]
    fn missing_dependency_reason() {
        let err = MissingDependencyError(Channel::Queue);
        assert_eq!(err.to_string(), "Waiting for redis-broker availability");
        assert_eq!(err.channel(), Channel::Queue);
    }
}
