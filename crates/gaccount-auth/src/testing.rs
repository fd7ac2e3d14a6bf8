//! Test doubles for the flow, refresher and store seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::flow::{Authorization, AuthorizationFlow, BoxFuture, TokenRefresher};
use crate::store::{CredentialStore, MemoryCredentialStore};
use crate::tokens::StoredToken;

fn scopes_of(scopes: &[&str]) -> Vec<String> {
    scopes.iter().map(|s| s.to_string()).collect()
}

/// A token valid for another hour with refresh token `refresh-<access>`.
pub fn valid_token(access: &str, scopes: &[&str]) -> StoredToken {
    StoredToken::new(
        access,
        Some(format!("refresh-{access}")),
        None,
        scopes_of(scopes),
    )
    .with_expiry(Utc::now() + Duration::hours(1))
}

/// A token that expired an hour ago with refresh token `refresh-<access>`.
pub fn expired_token(access: &str, scopes: &[&str]) -> StoredToken {
    StoredToken::new(
        access,
        Some(format!("refresh-{access}")),
        None,
        scopes_of(scopes),
    )
    .with_expiry(Utc::now() - Duration::hours(1))
}

fn rejected() -> AuthError {
    AuthError::new(AuthErrorCode::RefreshFailed, "invalid_grant")
}

/// How a [`MockRefresher`] answers.
pub enum RefreshBehavior {
    /// Issue `refreshed-<n>` valid for an hour.
    Succeed,
    /// Reject every refresh token.
    Reject,
    /// Fail at the transport level.
    NetworkDown,
    /// Store `token` for `alias` (as a concurrent process would) and reject.
    RejectAndStore {
        store: Arc<MemoryCredentialStore>,
        alias: String,
        token: StoredToken,
    },
    /// Accept only `accepted_refresh_token`; otherwise store `token` for
    /// `alias` and reject.
    RejectUnless {
        store: Arc<MemoryCredentialStore>,
        alias: String,
        token: StoredToken,
        accepted_refresh_token: String,
    },
}

/// Scripted [`TokenRefresher`] that counts its calls.
pub struct MockRefresher {
    behavior: RefreshBehavior,
    calls: AtomicUsize,
}

impl MockRefresher {
    pub fn new(behavior: RefreshBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, token: &StoredToken) -> AuthResult<StoredToken> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let success = || {
            let mut fresh = token.clone();
            fresh.access_token = format!("refreshed-{call}");
            fresh.expiry = Some(Utc::now() + Duration::hours(1));
            fresh
        };

        match &self.behavior {
            RefreshBehavior::Succeed => Ok(success()),
            RefreshBehavior::Reject => Err(rejected()),
            RefreshBehavior::NetworkDown => Err(AuthError::network("connection refused")),
            RefreshBehavior::RejectAndStore {
                store,
                alias,
                token: other,
            } => {
                store.set(alias, &other.to_bytes()?)?;
                Err(rejected())
            }
            RefreshBehavior::RejectUnless {
                store,
                alias,
                token: other,
                accepted_refresh_token,
            } => {
                if token.refresh_token.as_deref() == Some(accepted_refresh_token.as_str()) {
                    return Ok(success());
                }
                store.set(alias, &other.to_bytes()?)?;
                Err(rejected())
            }
        }
    }
}

impl TokenRefresher for MockRefresher {
    fn refresh<'a>(&'a self, token: &'a StoredToken) -> BoxFuture<'a, AuthResult<StoredToken>> {
        Box::pin(async move { self.answer(token) })
    }
}

/// Scripted [`AuthorizationFlow`] that records the scopes it was asked for.
pub struct MockFlow {
    email: String,
    fail: bool,
    calls: AtomicUsize,
    last_scopes: Mutex<Vec<String>>,
}

impl MockFlow {
    /// A flow where the user always consents as `email`.
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            last_scopes: Mutex::new(Vec::new()),
        }
    }

    /// A flow where the user always denies consent.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_scopes(&self) -> Vec<String> {
        self.last_scopes.lock().unwrap().clone()
    }
}

impl AuthorizationFlow for MockFlow {
    fn authorize<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, AuthResult<Authorization>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            *self.last_scopes.lock().unwrap() = scopes.to_vec();
            if self.fail {
                return Err(AuthError::authorization("access_denied"));
            }

            let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
            Ok(Authorization {
                token: valid_token(&format!("access-{call}"), &scopes),
                email: self.email.clone(),
            })
        })
    }
}

/// Memory store whose writes or deletes can be made to fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryCredentialStore,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn aliases(&self) -> Vec<String> {
        self.inner.aliases()
    }
}

impl CredentialStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    fn get(&self, alias: &str) -> AuthResult<Vec<u8>> {
        self.inner.get(alias)
    }

    fn set(&self, alias: &str, secret: &[u8]) -> AuthResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuthError::storage("secret service unavailable").with_alias(alias));
        }
        self.inner.set(alias, secret)
    }

    fn delete(&self, alias: &str) -> AuthResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AuthError::storage("secret service locked").with_alias(alias));
        }
        self.inner.delete(alias)
    }
}
