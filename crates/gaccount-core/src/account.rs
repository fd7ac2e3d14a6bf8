//! Registered Google account records.
//!
//! An [`Account`] is one row of the account registry: a user-chosen alias
//! pointing at an authenticated Google identity. The alias is the primary
//! key everywhere, including the credential store where the account's token
//! lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Alias used when the caller does not name the account being added.
pub const DEFAULT_ALIAS: &str = "default";

/// Reasons an alias is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AliasError {
    /// The alias is empty.
    #[error("alias must not be empty")]
    Empty,

    /// The alias contains whitespace.
    #[error("alias '{0}' must not contain whitespace")]
    Whitespace(String),

    /// The alias contains a path separator.
    #[error("alias '{0}' must not contain '/' or '\\'")]
    PathSeparator(String),

    /// The alias starts with a dot.
    #[error("alias '{0}' must not start with '.'")]
    LeadingDot(String),
}

/// Checks that an alias is usable as a registry key and a storage key.
///
/// File-backed credential stores use the alias as a file name, so anything
/// that could escape the storage directory is refused.
pub fn validate_alias(alias: &str) -> Result<(), AliasError> {
    if alias.is_empty() {
        return Err(AliasError::Empty);
    }
    if alias.chars().any(char::is_whitespace) {
        return Err(AliasError::Whitespace(alias.to_string()));
    }
    if alias.contains('/') || alias.contains('\\') {
        return Err(AliasError::PathSeparator(alias.to_string()));
    }
    if alias.starts_with('.') {
        return Err(AliasError::LeadingDot(alias.to_string()));
    }
    Ok(())
}

/// Returns the alias to use for a possibly empty user input.
pub fn alias_or_default(alias: &str) -> &str {
    let trimmed = alias.trim();
    if trimmed.is_empty() {
        DEFAULT_ALIAS
    } else {
        trimmed
    }
}

/// A registered Google account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique user-chosen short name (e.g. `"work"`).
    pub alias: String,

    /// Address of the authenticated Google account.
    #[serde(default)]
    pub email: String,

    /// Whether this account is used when no override is given.
    #[serde(default)]
    pub is_default: bool,

    /// When the account was first added. Never changes afterwards.
    pub added: DateTime<Utc>,

    /// OAuth scopes granted at authorization time.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Account {
    /// Creates a new, non-default account added now.
    pub fn new(alias: impl Into<String>, email: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            alias: alias.into(),
            email: email.into(),
            is_default: false,
            added: Utc::now(),
            scopes,
        }
    }

    /// Builder method to set the default flag.
    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Builder method to set the creation time.
    pub fn with_added(mut self, added: DateTime<Utc>) -> Self {
        self.added = added;
        self
    }

    /// Returns true if every scope in `required` was granted to this account.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }
}
