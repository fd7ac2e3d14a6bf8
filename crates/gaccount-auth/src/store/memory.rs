//! In-process credential store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{AuthError, AuthResult};

use super::CredentialStore;

/// Credential store backed by a map in memory.
///
/// Nothing survives the process. Useful in tests and for callers that
/// manage persistence themselves.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> AuthResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| AuthError::internal("credential map lock poisoned"))
    }

    /// Returns the aliases that currently have a stored secret, sorted.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .entries()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        aliases.sort();
        aliases
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, alias: &str) -> AuthResult<Vec<u8>> {
        self.entries()?
            .get(alias)
            .cloned()
            .ok_or_else(|| AuthError::secret_not_found(alias))
    }

    fn set(&self, alias: &str, secret: &[u8]) -> AuthResult<()> {
        self.entries()?.insert(alias.to_string(), secret.to_vec());
        Ok(())
    }

    fn delete(&self, alias: &str) -> AuthResult<()> {
        self.entries()?.remove(alias);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorCode;

    #[test]
    fn set_get_delete() {
        let store = MemoryCredentialStore::new();
        store.set("work", b"secret").unwrap();
        assert_eq!(store.get("work").unwrap(), b"secret");
        assert!(store.contains("work").unwrap());

        store.delete("work").unwrap();
        let err = store.get("work").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::NotFound);
        assert_eq!(err.alias(), Some("work"));
    }

    #[test]
    fn delete_missing_is_ok() {
        let store = MemoryCredentialStore::new();
        assert!(store.delete("ghost").is_ok());
        assert!(!store.contains("ghost").unwrap());
    }

    #[test]
    fn aliases_are_independent() {
        let store = MemoryCredentialStore::new();
        store.set("a", b"one").unwrap();
        store.set("b", b"two").unwrap();
        store.set("a", b"three").unwrap();

        assert_eq!(store.get("a").unwrap(), b"three");
        assert_eq!(store.get("b").unwrap(), b"two");
        assert_eq!(store.aliases(), vec!["a".to_string(), "b".to_string()]);
    }
}
