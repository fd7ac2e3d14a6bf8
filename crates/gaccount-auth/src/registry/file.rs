//! JSON file holding the account list.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use gaccount_core::Account;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsDocument {
    #[serde(default)]
    accounts: Vec<Account>,
}

/// The registry's backing file.
///
/// Shared by every process running the tool, so it is never cached: each
/// registry operation loads it, and writes replace it in one rename. A
/// read-modify-write holds [`AccountFile::lock`] from the load to the save.
#[derive(Debug, Clone)]
pub struct AccountFile {
    path: PathBuf,
}

impl AccountFile {
    /// Creates a handle for the file at `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the exclusive lock on the sibling `<file>.lock`, blocking until
    /// other holders release it. Dropping the guard unlocks.
    pub fn lock(&self) -> AuthResult<AccountFileLock> {
        self.ensure_parent()?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                AuthError::storage(format!(
                    "failed to open lock file {}: {}",
                    lock_path.display(),
                    e
                ))
                .with_source(e)
            })?;

        flock_exclusive(&file).map_err(|e| {
            AuthError::storage(format!("failed to lock {}: {}", lock_path.display(), e))
                .with_source(e)
        })?;
        debug!(path = %lock_path.display(), "locked accounts file");
        Ok(AccountFileLock { _file: file })
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn ensure_parent(&self) -> AuthResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::storage(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
                .with_source(e)
            })?;
        }
        Ok(())
    }

    /// Reads the account list. A missing or empty file is an empty registry.
    pub fn load(&self) -> AuthResult<Vec<Account>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no accounts file");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            AuthError::storage(format!(
                "failed to read accounts file {}: {}",
                self.path.display(),
                e
            ))
            .with_source(e)
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: AccountsDocument = serde_json::from_str(&content).map_err(|e| {
            AuthError::storage(format!(
                "failed to parse accounts file {}: {}",
                self.path.display(),
                e
            ))
            .with_source(e)
        })?;

        debug!(
            path = %self.path.display(),
            count = document.accounts.len(),
            "loaded accounts"
        );
        Ok(document.accounts)
    }

    /// Replaces the account list on disk.
    pub fn save(&self, accounts: &[Account]) -> AuthResult<()> {
        self.ensure_parent()?;

        let document = AccountsDocument {
            accounts: accounts.to_vec(),
        };
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| AuthError::internal(format!("failed to serialize accounts: {}", e)))?;

        // Per-process temp name so two writers never share a temp file.
        let temp_path = self
            .path
            .with_extension(format!("json.tmp.{}", std::process::id()));

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AuthError::storage(format!(
                "failed to write accounts file {}: {}",
                self.path.display(),
                e
            ))
            .with_source(e)
        })?;

        debug!(
            path = %self.path.display(),
            count = accounts.len(),
            "saved accounts"
        );
        Ok(())
    }
}

/// Held while a registry operation reads, changes and rewrites the file.
#[derive(Debug)]
pub struct AccountFileLock {
    _file: File,
}

/// Blocking exclusive `flock`. The lock lives as long as the descriptor.
#[cfg(unix)]
fn flock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if result == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

// No advisory locking off unix; writes stay atomic through the rename.
#[cfg(not(unix))]
fn flock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}
