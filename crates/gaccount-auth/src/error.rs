//! Error types for account and credential operations.
//!
//! Every failure in this crate is an [`AuthError`] carrying an
//! [`AuthErrorCode`], a human-readable message and, where one applies, the
//! alias of the account involved. Nothing here is fatal: the command layer
//! turns these into a message and a non-zero exit.

use std::fmt;
use thiserror::Error;

use gaccount_core::AliasError;

/// The category of an auth error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// Alias not registered, or no stored secret for it.
    NotFound,
    /// Rename target collides with an existing alias.
    AlreadyExists,
    /// Consent was denied or cancelled, or the interactive flow timed out.
    AuthorizationFailed,
    /// Refresh token is invalid, revoked or expired.
    RefreshFailed,
    /// Credential store or registry file I/O failed.
    StorageFailed,
    /// Resolution produced no usable account.
    NoAccountFound,
    /// Network error - connection failed, timeout, DNS resolution, etc.
    Network,
    /// Unexpected response from the OAuth server.
    InvalidResponse,
    /// Missing or invalid configuration (credentials, alias syntax, ports).
    Configuration,
    /// Internal error - unexpected state, bug.
    Internal,
}

impl AuthErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Returns a stable snake_case name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::AuthorizationFailed => "authorization_failed",
            Self::RefreshFailed => "refresh_failed",
            Self::StorageFailed => "storage_failed",
            Self::NoAccountFound => "no_account_found",
            Self::Network => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::Configuration => "configuration_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by the account registry, token manager, credential
/// store or authorization flow.
#[derive(Debug, Error)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    alias: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            alias: None,
            source: None,
        }
    }

    /// Creates a not found error for an alias.
    pub fn not_found(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self::new(
            AuthErrorCode::NotFound,
            format!("no account named '{}'", alias),
        )
        .with_alias(alias)
    }

    /// Creates a not found error for a missing stored secret.
    pub fn secret_not_found(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self::new(
            AuthErrorCode::NotFound,
            format!(
                "no stored credentials for '{}' - run 'gaccount auth add {}'",
                alias, alias
            ),
        )
        .with_alias(alias)
    }

    /// Creates an already exists error.
    pub fn already_exists(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self::new(
            AuthErrorCode::AlreadyExists,
            format!("an account named '{}' already exists", alias),
        )
        .with_alias(alias)
    }

    /// Creates an authorization failure.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthorizationFailed, message)
    }

    /// Creates a refresh failure with re-authorization guidance.
    pub fn refresh_failed(alias: impl Into<String>, reason: impl fmt::Display) -> Self {
        let alias = alias.into();
        Self::new(
            AuthErrorCode::RefreshFailed,
            format!(
                "token refresh failed ({}) - run 'gaccount auth add {}' to log in again",
                reason, alias
            ),
        )
        .with_alias(alias)
    }

    /// Creates a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::StorageFailed, message)
    }

    /// Creates a no account found error with guidance.
    pub fn no_account(message: impl Into<String>) -> Self {
        Self::new(
            AuthErrorCode::NoAccountFound,
            format!(
                "{} - run 'gaccount auth add <alias>' or 'gaccount auth switch <alias>'",
                message.into()
            ),
        )
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Network, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidResponse, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Configuration, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Internal, message)
    }

    /// Sets the alias this error refers to.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the alias, if set.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref alias) = self.alias {
            write!(f, "[{}] ", alias)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<AliasError> for AuthError {
    fn from(err: AliasError) -> Self {
        Self::configuration(err.to_string()).with_source(err)
    }
}

/// A specialized Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
