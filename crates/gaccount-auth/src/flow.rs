//! Capability traits for the network side of the credential lifecycle.
//!
//! The registry and token manager only talk to Google through these two
//! traits, so tests can substitute them without a browser or network:
//!
//! - [`AuthorizationFlow`] runs the interactive consent flow and yields the
//!   first token pair plus the account's email.
//! - [`TokenRefresher`] trades a refresh token for a new access token.
//!
//! Both return boxed futures. Dropping the future cancels the operation;
//! callers enforce deadlines with `tokio::time::timeout` or `tokio::select!`.

use std::future::Future;
use std::pin::Pin;

use crate::error::AuthResult;
use crate::tokens::StoredToken;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the traits object-safe so implementations can be
/// swapped behind an `Arc<dyn ...>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result of a successful interactive authorization.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// The freshly issued token pair.
    pub token: StoredToken,
    /// Email address of the account that granted consent.
    pub email: String,
}

/// Drives an interactive OAuth consent flow.
pub trait AuthorizationFlow: Send + Sync {
    /// Requests consent for `scopes` and returns the issued token and email.
    ///
    /// Denial, cancellation and timeouts are reported as
    /// `AuthorizationFailed`. Implementations must not persist anything.
    fn authorize<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, AuthResult<Authorization>>;
}

/// Exchanges a refresh token for a new access token.
pub trait TokenRefresher: Send + Sync {
    /// Returns a refreshed copy of `token`.
    ///
    /// The returned token keeps the old refresh token unless the server
    /// rotated it. A rejected refresh token is reported as `RefreshFailed`.
    fn refresh<'a>(&'a self, token: &'a StoredToken) -> BoxFuture<'a, AuthResult<StoredToken>>;
}
