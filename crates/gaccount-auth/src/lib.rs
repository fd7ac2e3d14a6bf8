//! Multi-account Google credential management.
//!
//! This crate keeps any number of named Google accounts authorized at once:
//!
//! - [`AccountRegistry`] - the account list with its single default
//! - [`CredentialStore`] - opaque per-alias secret storage (OS keyring, files
//!   or memory)
//! - [`TokenManager`] - token status, refresh and valid [`TokenSource`]s
//! - [`AuthorizationFlow`] / [`TokenRefresher`] - the network seams,
//!   implemented for Google by [`google::OAuthClient`]
//! - [`AuthError`] - the error taxonomy shared by all of the above
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │ AccountRegistry  │──── accounts.json
//!                 └──┬──────┬─────┬──┘
//!                    │      │     │
//!       ┌────────────┘      │     └──────────────┐
//!       ▼                   ▼                    ▼
//! ┌───────────────┐ ┌───────────────┐ ┌────────────────────┐
//! │ Authorization │ │ TokenManager  │ │  CredentialStore   │
//! │     Flow      │ └───────┬───────┘ │ keyring/file/memory│
//! └───────────────┘         │         └────────────────────┘
//!                           ▼                    ▲
//!                    ┌─────────────┐             │
//!                    │ TokenSource │─────────────┘
//!                    └─────────────┘
//! ```

pub mod error;
pub mod flow;
pub mod google;
pub mod registry;
pub mod store;
pub mod tokens;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use flow::{Authorization, AuthorizationFlow, BoxFuture, TokenRefresher};
pub use registry::{AccountFile, AccountRegistry, resolve_account};
#[cfg(feature = "keyring")]
pub use store::KeyringCredentialStore;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, SERVICE_NAME};
pub use tokens::{CredentialTokenManager, StoredToken, TokenInfo, TokenManager, TokenSource};

pub use gaccount_core::{Account, DEFAULT_ALIAS};
