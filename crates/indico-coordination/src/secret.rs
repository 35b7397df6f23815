//! Shared secret material and the optional secret vault
//!
//! Without a vault the secret is stored inline under `secret-key`. With a
//! vault, the content lives in the vault and only its id is written under
//! `secret-id`.

use crate::error::VaultError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

/// Number of random bytes in a generated secret
pub const SECRET_BYTES: usize = 32;

/// Cluster-wide secret shared by every replica
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Generate fresh secret material from the thread CSPRNG
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a stored secret
    #[inline]
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Secret as string (hex for generated secrets)
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// External secret storage
#[async_trait]
pub trait SecretVault: Send + Sync {
    /// Store new content, returning its id
    async fn create(&self, content: &str) -> Result<String, VaultError>;

    /// Fetch content by id
    async fn get(&self, id: &str) -> Result<Option<String>, VaultError>;

    /// Delete content by id; absent ids are ignored
    async fn remove(&self, id: &str) -> Result<(), VaultError>;
}

/// In-memory [`SecretVault`] shared by cloning
#[derive(Debug, Clone, Default)]
pub struct MemorySecretVault {
    secrets: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemorySecretVault {
    /// Create empty vault
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.lock().len()
    }

    /// Check if the vault is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.lock().is_empty()
    }
}

#[async_trait]
impl SecretVault for MemorySecretVault {
    async fn create(&self, content: &str) -> Result<String, VaultError> {
        tokio::task::yield_now().await;
        let id = format!("secret:{}", Ulid::new());
        self.secrets.lock().insert(id.clone(), content.to_owned());
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<String>, VaultError> {
        tokio::task::yield_now().await;
        Ok(self.secrets.lock().get(id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<(), VaultError> {
        self.secrets.lock().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_is_hex_of_32_bytes() {
        let secret = SharedSecret::generate();
        assert_eq!(secret.expose().len(), SECRET_BYTES * 2);
        assert!(hex::decode(secret.expose()).is_ok());
        assert_ne!(secret, SharedSecret::generate());
    }

    #[test]
    fn debug_redacts_content() {
        let secret = SharedSecret::from_stored("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn vault_round_trip() {
        let vault = MemorySecretVault::new();
        let id = vault.create("content").await.unwrap();
        assert_eq!(vault.get(&id).await.unwrap().as_deref(), Some("content"));
        vault.remove(&id).await.unwrap();
        assert!(vault.is_empty());
    }
}
