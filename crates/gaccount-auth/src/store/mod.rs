//! Opaque secret storage keyed by account alias.
//!
//! A [`CredentialStore`] maps an alias to a blob of bytes. It knows nothing
//! about tokens; the token manager serializes [`StoredToken`] values into
//! the bytes it hands over.
//!
//! Backends:
//!
//! - [`KeyringCredentialStore`] - the OS secret manager (default)
//! - [`FileCredentialStore`] - one owner-only file per alias, for hosts
//!   without a secret service
//! - [`MemoryCredentialStore`] - in-process, for tests and embedding
//!
//! Entries for different aliases never interfere. Two processes writing the
//! same alias race and the last writer wins.
//!
//! [`StoredToken`]: crate::tokens::StoredToken

mod file;
#[cfg(feature = "keyring")]
mod keyring_store;
mod memory;

pub use file::FileCredentialStore;
#[cfg(feature = "keyring")]
pub use keyring_store::KeyringCredentialStore;
pub use memory::MemoryCredentialStore;

use crate::error::{AuthErrorCode, AuthResult};

/// Keyring service name under which every alias is stored.
pub const SERVICE_NAME: &str = "gaccount";

/// Key/value secret storage keyed by alias.
pub trait CredentialStore: Send + Sync {
    /// Returns a short backend name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Reads the secret stored for `alias`.
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing is stored, `StorageFailed` if the backend fails.
    fn get(&self, alias: &str) -> AuthResult<Vec<u8>>;

    /// Stores `secret` for `alias`, replacing any previous value.
    fn set(&self, alias: &str, secret: &[u8]) -> AuthResult<()>;

    /// Deletes the secret for `alias`. Deleting a missing entry succeeds.
    fn delete(&self, alias: &str) -> AuthResult<()>;

    /// Returns true if a secret is stored for `alias`.
    fn contains(&self, alias: &str) -> AuthResult<bool> {
        match self.get(alias) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == AuthErrorCode::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
