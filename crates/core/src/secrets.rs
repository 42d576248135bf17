//! Secret storage contract used for session tokens.
//!
//! Platform keychains implement [`SecretStore`] outside this workspace. The
//! in-memory store is what tests and headless tools use.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::{Error, Result};

/// Key/value storage for credentials.
///
/// Implementations must be safe to call from several tasks at once.
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, key: &str) -> Result<Option<String>>;
    fn set_secret(&self, key: &str, value: &str) -> Result<()>;
    fn delete_secret(&self, key: &str) -> Result<()>;
}

/// Process-local secret store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for InMemorySecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>> {
        let secrets = self
            .secrets
            .read()
            .map_err(|_| Error::secret_store("secret map lock poisoned"))?;
        Ok(secrets.get(key).cloned())
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|_| Error::secret_store("secret map lock poisoned"))?;
        secrets.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|_| Error::secret_store("secret map lock poisoned"))?;
        secrets.remove(key);
        Ok(())
    }
}
