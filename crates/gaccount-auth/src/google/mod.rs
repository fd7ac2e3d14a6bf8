//! Google implementation of [`AuthorizationFlow`](crate::AuthorizationFlow)
//! and [`TokenRefresher`](crate::TokenRefresher).
//!
//! [`OAuthClient::authorize`] runs the installed-app flow: bind a loopback
//! port from the configured range, send the browser to the consent page with
//! a PKCE challenge and a random `state`, wait for the redirect, exchange the
//! code, then ask the userinfo endpoint which address consented. The client
//! id and secret belong to the user's own Cloud project.
//!
//! Nothing here touches the credential store or the account file.
//!
//! ```ignore
//! let client = Arc::new(OAuthClient::new(OAuthConfig::new(
//!     OAuthCredentials::from_file("client_secret.json")?,
//! ))?);
//! let tokens = Arc::new(CredentialTokenManager::new(store.clone(), client.clone()));
//! let registry = AccountRegistry::new(AccountFile::new(path), store, client, tokens);
//! registry.add("work", &["gmail".to_string()]).await?;
//! ```

mod config;
mod oauth;

pub use config::{OAuthConfig, OAuthCredentials};
pub use oauth::{OAuthClient, PkceSession};
