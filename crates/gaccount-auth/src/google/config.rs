//! Google OAuth client configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AuthError, AuthResult};

/// OAuth 2.0 client credentials for Google API access.
///
/// Users must register their own desktop OAuth client in the Google Cloud
/// Console; Google does not allow shared public clients.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Credentials JSON from the Cloud Console (`installed` or `web` section), or
/// the flat form gcloud writes with both fields at the root.
#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialsFile {
    Installed { installed: ClientSection },
    Web { web: ClientSection },
    Flat(ClientSection),
}

#[derive(Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Cloud Console JSON string.
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            AuthError::configuration(format!("credentials file is not valid JSON: {}", e))
                .with_source(e)
        })?;
        let section = match serde_json::from_value(value) {
            Ok(CredentialsFile::Installed { installed }) => installed,
            Ok(CredentialsFile::Web { web }) => web,
            Ok(CredentialsFile::Flat(flat)) => flat,
            Err(_) => {
                return Err(AuthError::configuration(
                    "credentials file needs an 'installed' or 'web' section, \
                     or client_id and client_secret at the top level",
                ));
            }
        };
        Ok(Self::new(section.client_id, section.client_secret))
    }

    /// Checks that the credentials look like a Google desktop client.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.is_empty() {
            return Err(AuthError::configuration("client_id is required"));
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err(AuthError::configuration(
                "client_id should end with .apps.googleusercontent.com",
            ));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::configuration("client_secret is required"));
        }
        Ok(())
    }
}

/// Settings for [`OAuthClient`](super::OAuthClient).
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Client credentials.
    pub credentials: OAuthCredentials,

    /// Timeout for each HTTP request to Google.
    pub timeout: Duration,

    /// Deadline for the whole interactive flow, from opening the browser to
    /// receiving the callback.
    pub authorize_timeout: Duration,

    /// Inclusive port range tried, in order, for the loopback redirect.
    pub loopback_port_range: (u16, u16),

    /// User agent for requests.
    pub user_agent: String,
}

impl OAuthConfig {
    /// Default HTTP timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default interactive flow deadline in seconds.
    pub const DEFAULT_AUTHORIZE_TIMEOUT_SECS: u64 = 300;

    /// Default loopback port range.
    pub const DEFAULT_PORT_RANGE: (u16, u16) = (8080, 8090);

    /// Creates a configuration with default timeouts and ports.
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            authorize_timeout: Duration::from_secs(Self::DEFAULT_AUTHORIZE_TIMEOUT_SECS),
            loopback_port_range: Self::DEFAULT_PORT_RANGE,
            user_agent: format!("gaccount/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the interactive flow deadline.
    pub fn with_authorize_timeout(mut self, timeout: Duration) -> Self {
        self.authorize_timeout = timeout;
        self
    }

    /// Sets the loopback port range.
    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AuthResult<()> {
        self.credentials.validate().map_err(|e| {
            AuthError::configuration(format!("invalid credentials: {}", e.message()))
        })?;

        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err(AuthError::configuration(format!(
                "invalid loopback port range {}-{}",
                self.loopback_port_range.0, self.loopback_port_range.1
            )));
        }

        if self.authorize_timeout.is_zero() {
            return Err(AuthError::configuration(
                "authorize timeout must be greater than zero",
            ));
        }

        Ok(())
    }
}
