//! File-backed credential store.
//!
//! Each alias gets its own file in a private directory. Writes go to a
//! temporary file that is renamed into place, so a concurrent reader sees
//! either the old or the new secret, never a partial one.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use gaccount_core::validate_alias;

use crate::error::{AuthError, AuthResult};

use super::CredentialStore;

/// Credential store keeping one owner-only file per alias.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, alias: &str) -> AuthResult<PathBuf> {
        validate_alias(alias)?;
        Ok(self.dir.join(format!("{}.json", alias)))
    }

    fn ensure_dir(&self) -> AuthResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AuthError::storage(format!(
                "failed to create credentials directory {}: {}",
                self.dir.display(),
                e
            ))
            .with_source(e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700));
        }

        Ok(())
    }
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)?;
    file.sync_all()
}

impl CredentialStore for FileCredentialStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, alias: &str) -> AuthResult<Vec<u8>> {
        let path = self.entry_path(alias)?;
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(alias = %alias, path = %path.display(), "read credentials file");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AuthError::secret_not_found(alias)),
            Err(e) => Err(AuthError::storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
            .with_alias(alias)
            .with_source(e)),
        }
    }

    fn set(&self, alias: &str, secret: &[u8]) -> AuthResult<()> {
        let path = self.entry_path(alias)?;
        self.ensure_dir()?;

        // Leading dot keeps temp files out of the alias namespace.
        let temp_path = self
            .dir
            .join(format!(".{}.json.tmp.{}", alias, std::process::id()));

        write_private(&temp_path, secret).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AuthError::storage(format!("failed to write {}: {}", temp_path.display(), e))
                .with_alias(alias)
                .with_source(e)
        })?;

        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AuthError::storage(format!("failed to replace {}: {}", path.display(), e))
                .with_alias(alias)
                .with_source(e)
        })?;

        debug!(alias = %alias, path = %path.display(), "wrote credentials file");
        Ok(())
    }

    fn delete(&self, alias: &str) -> AuthResult<()> {
        let path = self.entry_path(alias)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(alias = %alias, path = %path.display(), "removed credentials file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::storage(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))
            .with_alias(alias)
            .with_source(e)),
        }
    }
}
