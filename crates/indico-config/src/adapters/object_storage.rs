//! Object storage (S3) channel

use crate::channel::{Channel, ChannelAdapter, ChannelPayload};
use crate::error::InvalidConfigurationError;
use serde::{Deserialize, Serialize};

/// Object storage settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// Bucket name
    pub bucket: String,
    /// Storage endpoint; provider default when absent
    pub host: Option<String>,
    /// Access key
    pub access_key: String,
    /// Secret key
    pub secret_key: String,
}

impl ObjectStorageConfig {
    /// Storage backend connection string
    ///
    /// Field order is fixed: `bucket`, `access_key`, `secret_key`, `proxy`, then
    /// `host` when present.
    #[must_use]
    pub fn connection_string(&self) -> String {
        let mut conn = format!(
            "s3:bucket={},access_key={},secret_key={},proxy=true",
            self.bucket, self.access_key, self.secret_key
        );
        if let Some(host) = &self.host {
            conn.push_str(",host=");
            conn.push_str(host);
        }
        conn
    }
}

/// Reads `{bucket, endpoint, access-key, secret-key}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectStorageAdapter;

impl ChannelAdapter for ObjectStorageAdapter {
    type Fragment = ObjectStorageConfig;

    fn channel(&self) -> Channel {
        Channel::ObjectStorage
    }

    fn translate(
        &self,
        payload: Option<&ChannelPayload>,
    ) -> Result<Option<ObjectStorageConfig>, InvalidConfigurationError> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        let fields = (
            payload.cluster_value("bucket"),
            payload.cluster_value("access-key"),
            payload.cluster_value("secret-key"),
        );
        let (Some(bucket), Some(access_key), Some(secret_key)) = fields else {
            return Ok(None);
        };
        let host = payload.cluster_value("endpoint");

        for (field, value) in [
            ("bucket", Some(bucket)),
            ("access-key", Some(access_key)),
            ("secret-key", Some(secret_key)),
            ("endpoint", host),
        ] {
            if value.is_some_and(|v| v.contains([',', '='])) {
                return Err(InvalidConfigurationError::malformed(
                    Channel::ObjectStorage,
                    field,
                    "value must not contain ',' or '='",
                ));
            }
        }

        Ok(Some(ObjectStorageConfig {
            bucket: bucket.to_owned(),
            host: host.map(str::to_owned),
            access_key: access_key.to_owned(),
            secret_key: secret_key.to_owned(),
        }))
    }
}
