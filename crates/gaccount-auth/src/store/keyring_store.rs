//! OS keyring credential store.

use tracing::debug;

use crate::error::{AuthError, AuthResult};

use super::{CredentialStore, SERVICE_NAME};

/// Credential store backed by the platform secret manager.
///
/// Entries are keyed by `(service, alias)`. Atomicity of a single entry
/// update is whatever the platform keyring provides.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    /// Creates a store using the default [`SERVICE_NAME`].
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Creates a store under a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Returns the keyring service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, alias: &str) -> AuthResult<keyring::Entry> {
        keyring::Entry::new(&self.service, alias).map_err(|e| keyring_error(alias, "open", e))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

fn keyring_error(alias: &str, action: &str, err: keyring::Error) -> AuthError {
    AuthError::storage(format!("keyring {} failed: {}", action, err))
        .with_alias(alias)
        .with_source(err)
}

impl CredentialStore for KeyringCredentialStore {
    fn name(&self) -> &str {
        "keyring"
    }

    fn get(&self, alias: &str) -> AuthResult<Vec<u8>> {
        match self.entry(alias)?.get_secret() {
            Ok(secret) => {
                debug!(alias = %alias, service = %self.service, "read keyring entry");
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(AuthError::secret_not_found(alias)),
            Err(e) => Err(keyring_error(alias, "read", e)),
        }
    }

    fn set(&self, alias: &str, secret: &[u8]) -> AuthResult<()> {
        self.entry(alias)?
            .set_secret(secret)
            .map_err(|e| keyring_error(alias, "write", e))?;
        debug!(alias = %alias, service = %self.service, "wrote keyring entry");
        Ok(())
    }

    fn delete(&self, alias: &str) -> AuthResult<()> {
        match self.entry(alias)?.delete_credential() {
            Ok(()) => {
                debug!(alias = %alias, service = %self.service, "deleted keyring entry");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keyring_error(alias, "delete", e)),
        }
    }
}
