//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/gaccount/config.toml` by default:
//!
//! ```toml
//! default_account = "work"
//! credential_backend = "keyring"   # or "file"
//!
//! [oauth]
//! client_id = "pass::google/gaccount-client-id"
//! client_secret = "env::GACCOUNT_CLIENT_SECRET"
//! loopback_port_start = 8080
//! loopback_port_end = 8090
//! ```
//!
//! Credential values (`client_id`, `client_secret`) support secret references
//! resolved by [`crate::secret`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gaccount_auth::google::{OAuthConfig, OAuthCredentials};

use crate::secret::SecretRef;

/// Where per-account tokens are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// The OS secret manager.
    #[default]
    Keyring,
    /// Owner-only JSON files under `credentials_dir`.
    File,
}

/// Configuration for the gaccount client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Alias used when no account carries the default flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_account: Option<String>,

    /// Registry file; defaults to `<data dir>/gaccount/accounts.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts_file: Option<PathBuf>,

    /// Token storage backend.
    pub credential_backend: CredentialBackend,

    /// Directory for the file backend; defaults to
    /// `<data dir>/gaccount/credentials`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_dir: Option<PathBuf>,

    /// OAuth client settings.
    pub oauth: OAuthSettings,
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does not
    /// exist.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gaccount")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gaccount")
    }

    /// Returns the registry file path.
    pub fn accounts_path(&self) -> PathBuf {
        self.accounts_file
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("accounts.json"))
    }

    /// Returns the directory used by the file credential backend.
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("credentials"))
    }

    /// Checks values that do not need any secret to be resolved.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref alias) = self.default_account {
            gaccount_core::validate_alias(alias)
                .map_err(|e| format!("default_account: {}", e))?;
        }
        self.oauth.validate()
    }
}

/// OAuth client settings (`[oauth]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Google Cloud Console credentials JSON, used when the inline values
    /// are absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,

    /// First loopback port tried for the redirect.
    pub loopback_port_start: u16,

    /// Last loopback port tried for the redirect.
    pub loopback_port_end: u16,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,

    /// Deadline for the interactive browser flow in seconds.
    pub authorize_timeout_secs: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            credentials_file: None,
            loopback_port_start: OAuthConfig::DEFAULT_PORT_RANGE.0,
            loopback_port_end: OAuthConfig::DEFAULT_PORT_RANGE.1,
            timeout_secs: OAuthConfig::DEFAULT_TIMEOUT_SECS,
            authorize_timeout_secs: OAuthConfig::DEFAULT_AUTHORIZE_TIMEOUT_SECS,
        }
    }
}

impl OAuthSettings {
    /// Returns true if inline credentials or a credentials file are set.
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() || self.client_secret.is_some() || self.credentials_file.is_some()
    }

    /// Resolves OAuth credentials from the inline fields or the credentials
    /// file.
    ///
    /// Inline values may be `pass::` or `env::` references.
    pub fn resolve_credentials(&self) -> Result<OAuthCredentials, String> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(raw_id), Some(raw_secret)) => {
                let id = resolve_field("client_id", raw_id)?;
                let secret = resolve_field("client_secret", raw_secret)?;
                Ok(OAuthCredentials::new(id, secret))
            }
            (Some(_), None) => {
                Err("client_secret is missing from [oauth] section in config.toml".to_string())
            }
            (None, Some(_)) => {
                Err("client_id is missing from [oauth] section in config.toml".to_string())
            }
            (None, None) => match self.credentials_file {
                Some(ref path) => OAuthCredentials::from_file(path).map_err(|e| e.to_string()),
                None => Err(format!(
                    "Google OAuth credentials not found. Add to {}:\n  \
                     [oauth]\n  \
                     client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                     client_secret = \"YOUR_SECRET\"\n\n  \
                     Or run: gaccount auth add --credentials-file <path>",
                    ClientConfig::default_path().display()
                )),
            },
        }
    }

    /// Builds the OAuth client configuration around `credentials`.
    pub fn to_oauth_config(&self, credentials: OAuthCredentials) -> OAuthConfig {
        OAuthConfig::new(credentials)
            .with_loopback_port_range(self.loopback_port_start, self.loopback_port_end)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_authorize_timeout(Duration::from_secs(self.authorize_timeout_secs))
    }

    fn validate(&self) -> Result<(), String> {
        if self.loopback_port_start > self.loopback_port_end {
            return Err(format!(
                "oauth.loopback_port_start ({}) is greater than oauth.loopback_port_end ({})",
                self.loopback_port_start, self.loopback_port_end
            ));
        }
        if self.timeout_secs == 0 || self.authorize_timeout_secs == 0 {
            return Err("oauth timeouts must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn resolve_field(name: &str, raw: &str) -> Result<String, String> {
    let reference = SecretRef::parse(raw);
    reference
        .resolve()
        .map_err(|e| format!("oauth.{} ({}): {}", name, reference, e))
}
