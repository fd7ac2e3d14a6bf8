//! OAuth token persistence and refresh.
//!
//! Tokens live in the [`CredentialStore`] as serialized [`StoredToken`]
//! values, one per alias. Nothing is cached between invocations: every
//! call reads the store, and every refresh writes the new token straight
//! back so the next process starts from it.
//!
//! # Refresh races
//!
//! Two processes can refresh the same alias at once. If the server has
//! rotated the refresh token, the slower process gets its refresh rejected.
//! Before reporting `RefreshFailed`, the token is re-read from the store:
//! a valid token written by the other process is adopted, and a changed
//! refresh token is tried once more.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use gaccount_core::scopes;

use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::flow::{BoxFuture, TokenRefresher};
use crate::store::CredentialStore;

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// An OAuth token pair as persisted for one alias.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// The access token for API requests.
    pub access_token: String,

    /// Token type, normally `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The refresh token. Without one the token cannot renew itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,

    /// Scopes granted when the token was issued.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// Creates a token from OAuth response data.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token,
            expiry: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
            scopes,
        }
    }

    /// Builder method to set the token type.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Builder method to set an absolute expiry.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= expiry,
            // Tokens without an expiry are assumed valid
            None => false,
        }
    }

    /// Returns true if a refresh token is present.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Serializes the token into the bytes kept by the credential store.
    pub fn to_bytes(&self) -> AuthResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AuthError::internal(format!("failed to serialize token: {}", e)))
    }

    /// Parses a token previously written with [`StoredToken::to_bytes`].
    pub fn from_bytes(alias: &str, bytes: &[u8]) -> AuthResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            AuthError::storage(format!("stored token is corrupt: {}", e))
                .with_alias(alias)
                .with_source(e)
        })
    }
}

// Hand-written so tokens never end up in logs.
impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Read-only token status for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Whether a token is stored for the alias.
    pub has_token: bool,
    /// Whether the stored access token has expired.
    pub is_expired: bool,
    /// RFC3339 expiry, empty when unknown.
    pub expiry_time: String,
    /// Scopes recorded at issuance.
    pub scopes: Vec<String>,
}

impl TokenInfo {
    /// Status for an alias with nothing stored.
    pub fn missing() -> Self {
        Self {
            has_token: false,
            is_expired: false,
            expiry_time: String::new(),
            scopes: Vec::new(),
        }
    }

    /// Status describing a stored token.
    pub fn from_token(token: &StoredToken) -> Self {
        Self {
            has_token: true,
            is_expired: token.is_expired(),
            expiry_time: token
                .expiry
                .map(|e| e.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            scopes: token.scopes.clone(),
        }
    }
}

fn load_token(store: &dyn CredentialStore, alias: &str) -> AuthResult<StoredToken> {
    let bytes = store.get(alias)?;
    StoredToken::from_bytes(alias, &bytes)
}

fn load_token_optional(store: &dyn CredentialStore, alias: &str) -> AuthResult<Option<StoredToken>> {
    match load_token(store, alias) {
        Ok(token) => Ok(Some(token)),
        Err(e) if e.code() == AuthErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn save_token(store: &dyn CredentialStore, alias: &str, token: &StoredToken) -> AuthResult<()> {
    store.set(alias, &token.to_bytes()?)
}

fn refresh_error(alias: &str, err: AuthError) -> AuthError {
    if err.code() == AuthErrorCode::RefreshFailed {
        let reason = err.message().to_string();
        AuthError::refresh_failed(alias, reason).with_source(err)
    } else {
        err.with_alias(alias)
    }
}

/// Refreshes `current`, persists the result, and applies the re-read policy
/// when the refresh token is rejected.
async fn refresh_and_persist(
    store: &dyn CredentialStore,
    refresher: &dyn TokenRefresher,
    alias: &str,
    current: &StoredToken,
) -> AuthResult<StoredToken> {
    if !current.can_refresh() {
        return Err(AuthError::refresh_failed(alias, "no refresh token stored"));
    }

    let err = match refresher.refresh(current).await {
        Ok(fresh) => {
            save_token(store, alias, &fresh)?;
            info!(alias = %alias, "refreshed access token");
            return Ok(fresh);
        }
        Err(e) if e.code() == AuthErrorCode::RefreshFailed => e,
        Err(e) => return Err(e.with_alias(alias)),
    };

    warn!(
        alias = %alias,
        "refresh rejected, re-reading stored token in case another process refreshed it"
    );

    let latest = load_token_optional(store, alias)?.ok_or_else(|| AuthError::secret_not_found(alias))?;
    if latest == *current {
        return Err(refresh_error(alias, err));
    }

    if !latest.is_expired() && latest.expiry > current.expiry {
        debug!(alias = %alias, "adopting token refreshed by another process");
        return Ok(latest);
    }

    if latest.can_refresh() && latest.refresh_token != current.refresh_token {
        debug!(alias = %alias, "retrying refresh with rotated refresh token");
        let fresh = refresher
            .refresh(&latest)
            .await
            .map_err(|e| refresh_error(alias, e))?;
        save_token(store, alias, &fresh)?;
        info!(alias = %alias, "refreshed access token after retry");
        return Ok(fresh);
    }

    Err(refresh_error(alias, err))
}

/// Yields a currently valid access token for one alias, refreshing and
/// persisting as needed.
pub struct TokenSource {
    alias: String,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    current: Mutex<StoredToken>,
}

impl TokenSource {
    /// Creates a token source starting from `token`.
    pub fn new(
        alias: impl Into<String>,
        token: StoredToken,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            alias: alias.into(),
            store,
            refresher,
            current: Mutex::new(token),
        }
    }

    /// Returns the alias this source serves.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Returns a valid token, refreshing it first if it has expired.
    ///
    /// # Errors
    ///
    /// `RefreshFailed` when the token cannot be renewed and the account must
    /// be added again.
    pub async fn token(&self) -> AuthResult<StoredToken> {
        let mut current = self.current.lock().await;
        if !current.is_expired() {
            return Ok(current.clone());
        }

        debug!(alias = %self.alias, "access token expired, refreshing");
        let fresh = refresh_and_persist(
            self.store.as_ref(),
            self.refresher.as_ref(),
            &self.alias,
            &current,
        )
        .await?;
        *current = fresh.clone();
        Ok(fresh)
    }

    /// Returns a valid access token string.
    pub async fn access_token(&self) -> AuthResult<String> {
        Ok(self.token().await?.access_token)
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("alias", &self.alias)
            .field("store", &self.store.name())
            .finish_non_exhaustive()
    }
}

/// Per-alias token operations.
pub trait TokenManager: Send + Sync {
    /// Returns a self-refreshing token source for `alias`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no token is stored for the alias.
    fn token_source(&self, alias: &str) -> AuthResult<TokenSource>;

    /// Reports token status without refreshing.
    fn token_info(&self, alias: &str) -> AuthResult<TokenInfo>;

    /// Refreshes regardless of expiry, persists and returns the new token.
    fn refresh_token<'a>(&'a self, alias: &'a str) -> BoxFuture<'a, AuthResult<StoredToken>>;

    /// Returns the scopes recorded when the token was issued.
    fn granted_scopes(&self, alias: &str) -> AuthResult<Vec<String>>;

    /// Persists a token for `alias`, replacing any previous one.
    fn save_token(&self, alias: &str, token: &StoredToken) -> AuthResult<()>;

    /// Returns true if the alias has no token or lacks any of `required`
    /// (shorthands are expanded before comparing).
    fn needs_reauth(&self, alias: &str, required: &[String]) -> AuthResult<bool> {
        let granted = match self.granted_scopes(alias) {
            Ok(granted) => granted,
            Err(e) if e.code() == AuthErrorCode::NotFound => return Ok(true),
            Err(e) => return Err(e),
        };
        let required: Vec<String> = required.iter().map(|s| scopes::expand(s)).collect();
        Ok(!scopes::missing(&granted, &required).is_empty())
    }
}

/// Token manager persisting tokens in a [`CredentialStore`].
pub struct CredentialTokenManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
}

impl CredentialTokenManager {
    /// Creates a manager over `store`, refreshing through `refresher`.
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { store, refresher }
    }

    /// Loads the stored token for `alias`.
    pub fn load(&self, alias: &str) -> AuthResult<StoredToken> {
        load_token(self.store.as_ref(), alias)
    }

    /// Forces a refresh through an explicitly supplied OAuth client.
    pub async fn refresh_token_with(
        &self,
        alias: &str,
        refresher: &dyn TokenRefresher,
    ) -> AuthResult<StoredToken> {
        let current = self.load(alias)?;
        refresh_and_persist(self.store.as_ref(), refresher, alias, &current).await
    }
}

impl fmt::Debug for CredentialTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialTokenManager")
            .field("store", &self.store.name())
            .finish_non_exhaustive()
    }
}

impl TokenManager for CredentialTokenManager {
    fn token_source(&self, alias: &str) -> AuthResult<TokenSource> {
        let token = self.load(alias)?;
        Ok(TokenSource::new(
            alias,
            token,
            Arc::clone(&self.store),
            Arc::clone(&self.refresher),
        ))
    }

    fn token_info(&self, alias: &str) -> AuthResult<TokenInfo> {
        Ok(match load_token_optional(self.store.as_ref(), alias)? {
            Some(token) => TokenInfo::from_token(&token),
            None => TokenInfo::missing(),
        })
    }

    fn refresh_token<'a>(&'a self, alias: &'a str) -> BoxFuture<'a, AuthResult<StoredToken>> {
        Box::pin(async move { self.refresh_token_with(alias, self.refresher.as_ref()).await })
    }

    fn granted_scopes(&self, alias: &str) -> AuthResult<Vec<String>> {
        Ok(self.load(alias)?.scopes)
    }

    fn save_token(&self, alias: &str, token: &StoredToken) -> AuthResult<()> {
        save_token(self.store.as_ref(), alias, token)?;
        debug!(alias = %alias, store = %self.store.name(), "saved token");
        Ok(())
    }
}
