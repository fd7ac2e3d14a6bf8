//! The account registry.
//!
//! [`AccountRegistry`] owns the list of named accounts and keeps it in step
//! with the credential store. It is built once per CLI invocation from
//! explicit collaborators; there is no global state.
//!
//! Every operation re-reads the account file first and writes it back in a
//! single rename at the end, so concurrent invocations never observe a
//! registry with zero or several defaults. Writers hold the file lock from
//! that read to the credential changes that go with it, so two invocations
//! cannot drop each other's rows or leave a token without its account.
//!
//! # Default invariant
//!
//! Whenever the registry is non-empty exactly one account is the default.
//! `add` makes the first account the default, `switch` moves the flag, and
//! `remove` promotes the earliest-added remaining account when the default
//! goes away.

mod file;
mod resolve;

pub use file::{AccountFile, AccountFileLock};
pub use resolve::resolve_account;

use std::sync::Arc;

use tracing::{info, warn};

use gaccount_core::{Account, alias_or_default, scopes, validate_alias};

use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::flow::AuthorizationFlow;
use crate::store::CredentialStore;
use crate::tokens::TokenManager;

/// Makes sure exactly one account is the default when the list is non-empty.
///
/// Returns true if anything changed.
fn normalize_defaults(accounts: &mut [Account]) -> bool {
    let defaults = accounts.iter().filter(|a| a.is_default).count();
    if accounts.is_empty() || defaults == 1 {
        return false;
    }

    // Prefer an account that already claims the flag.
    let candidates: Vec<usize> = if defaults > 1 {
        (0..accounts.len()).filter(|&i| accounts[i].is_default).collect()
    } else {
        (0..accounts.len()).collect()
    };
    let Some(keep) = candidates
        .into_iter()
        .min_by_key(|&i| (accounts[i].added, accounts[i].alias.clone()))
    else {
        return false;
    };

    warn!(
        defaults,
        alias = %accounts[keep].alias,
        "repairing default account flag"
    );
    for (i, account) in accounts.iter_mut().enumerate() {
        account.is_default = i == keep;
    }
    true
}

fn position(accounts: &[Account], alias: &str) -> AuthResult<usize> {
    accounts
        .iter()
        .position(|a| a.alias == alias)
        .ok_or_else(|| AuthError::not_found(alias))
}

/// Registry of named Google accounts.
pub struct AccountRegistry {
    file: AccountFile,
    credentials: Arc<dyn CredentialStore>,
    flow: Arc<dyn AuthorizationFlow>,
    tokens: Arc<dyn TokenManager>,
    default_hint: Option<String>,
}

impl AccountRegistry {
    /// Creates a registry over its backing file and collaborators.
    pub fn new(
        file: AccountFile,
        credentials: Arc<dyn CredentialStore>,
        flow: Arc<dyn AuthorizationFlow>,
        tokens: Arc<dyn TokenManager>,
    ) -> Self {
        Self {
            file,
            credentials,
            flow,
            tokens,
            default_hint: None,
        }
    }

    /// Sets the configured default alias used when no account carries the
    /// default flag.
    pub fn with_default_hint(mut self, alias: Option<String>) -> Self {
        self.default_hint = alias.filter(|a| !a.trim().is_empty());
        self
    }

    /// Returns the backing file.
    pub fn file(&self) -> &AccountFile {
        &self.file
    }

    /// Returns the token manager for status and refresh operations.
    pub fn token_manager(&self) -> &dyn TokenManager {
        self.tokens.as_ref()
    }

    /// Returns every registered account in file order.
    pub fn list(&self) -> AuthResult<Vec<Account>> {
        self.file.load()
    }

    /// Returns the account registered under `alias`.
    pub fn get(&self, alias: &str) -> AuthResult<Account> {
        let accounts = self.file.load()?;
        let index = position(&accounts, alias)?;
        Ok(accounts[index].clone())
    }

    /// Authorizes `scopes` for `alias` and registers the account.
    ///
    /// An empty alias becomes `"default"`. Adding an existing alias logs in
    /// again and replaces its token, email and scopes, keeping its creation
    /// time and default flag. Requested scopes are expanded and the identity
    /// scopes are always included.
    ///
    /// # Errors
    ///
    /// `AuthorizationFailed` if the consent flow fails; nothing is stored.
    /// `StorageFailed` if the token or registry cannot be written after a
    /// successful authorization.
    pub async fn add(&self, alias: &str, requested_scopes: &[String]) -> AuthResult<Account> {
        let alias = alias_or_default(alias).to_string();
        validate_alias(&alias).map_err(|e| AuthError::from(e).with_alias(&alias))?;

        // Fail before opening a browser if the registry is unreadable.
        self.file.load().map_err(|e| e.with_alias(&alias))?;

        let requested = scopes::normalize(requested_scopes);
        info!(alias = %alias, scopes = requested.len(), "starting authorization");

        let authorization = self.flow.authorize(&requested).await.map_err(|e| {
            if e.code() == AuthErrorCode::AuthorizationFailed {
                e.with_alias(&alias)
            } else {
                AuthError::authorization(format!("login failed: {}", e.message()))
                    .with_alias(&alias)
                    .with_source(e)
            }
        })?;

        // No awaits past this point: once consent is granted the token and
        // the registry row are written together or the error says why not.
        let mut token = authorization.token;
        if token.scopes.is_empty() {
            token.scopes = requested.clone();
        }
        let granted = token.scopes.clone();

        // The flow can take minutes; start from the current file.
        let _lock = self.file.lock().map_err(|e| e.with_alias(&alias))?;
        let mut accounts = self.file.load().map_err(|e| e.with_alias(&alias))?;
        let was_empty = accounts.is_empty();
        let existing = accounts.iter().position(|a| a.alias == alias);

        self.tokens.save_token(&alias, &token).map_err(|e| {
            AuthError::storage(format!(
                "authorization succeeded but the token could not be saved ({}); \
                 no credentials were kept, run 'gaccount auth add {}' again",
                e.message(),
                alias
            ))
            .with_alias(&alias)
            .with_source(e)
        })?;

        match existing {
            Some(index) => {
                let account = &mut accounts[index];
                account.email = authorization.email;
                account.scopes = granted;
            }
            None => accounts.push(Account::new(&alias, authorization.email, granted)),
        }

        if was_empty {
            for account in accounts.iter_mut() {
                account.is_default = true;
            }
        }
        normalize_defaults(&mut accounts);

        if let Err(e) = self.file.save(&accounts) {
            if existing.is_none()
                && let Err(cleanup) = self.credentials.delete(&alias)
            {
                warn!(alias = %alias, error = %cleanup, "failed to remove token after registry write failed");
            }
            return Err(e.with_alias(&alias));
        }

        let account = accounts
            .into_iter()
            .find(|a| a.alias == alias)
            .ok_or_else(|| AuthError::internal("added account missing from registry"))?;

        info!(
            alias = %account.alias,
            email = %account.email,
            is_default = account.is_default,
            "account added"
        );
        Ok(account)
    }

    /// Removes an account and its stored credentials.
    ///
    /// If the removed account was the default, the earliest-added remaining
    /// account becomes the default.
    pub fn remove(&self, alias: &str) -> AuthResult<()> {
        let _lock = self.file.lock()?;
        let mut accounts = self.file.load()?;
        let index = position(&accounts, alias)?;
        let removed = accounts.remove(index);

        if removed.is_default {
            if let Some(promoted) = accounts
                .iter_mut()
                .min_by(|a, b| a.added.cmp(&b.added).then_with(|| a.alias.cmp(&b.alias)))
            {
                promoted.is_default = true;
                info!(alias = %promoted.alias, "promoted account to default");
            }
        }
        normalize_defaults(&mut accounts);

        self.file.save(&accounts).map_err(|e| e.with_alias(alias))?;

        self.credentials.delete(alias).map_err(|e| {
            AuthError::storage(format!(
                "account removed but its stored credentials could not be deleted from the {} store: {}",
                self.credentials.name(),
                e.message()
            ))
            .with_alias(alias)
            .with_source(e)
        })?;

        info!(alias = %alias, "account removed");
        Ok(())
    }

    /// Makes `alias` the default account.
    pub fn switch(&self, alias: &str) -> AuthResult<()> {
        let _lock = self.file.lock()?;
        let mut accounts = self.file.load()?;
        position(&accounts, alias)?;

        for account in accounts.iter_mut() {
            account.is_default = account.alias == alias;
        }

        self.file.save(&accounts).map_err(|e| e.with_alias(alias))?;
        info!(alias = %alias, "switched default account");
        Ok(())
    }

    /// Renames an account, moving its stored credentials to the new alias.
    ///
    /// The secret is written under the new alias before the old entry is
    /// deleted, so a failure part-way never loses it.
    pub fn rename(&self, old_alias: &str, new_alias: &str) -> AuthResult<()> {
        let new_alias = new_alias.trim();
        validate_alias(new_alias).map_err(|e| AuthError::from(e).with_alias(new_alias))?;

        let _lock = self.file.lock()?;
        let mut accounts = self.file.load()?;
        let index = position(&accounts, old_alias)?;
        if old_alias == new_alias {
            return Ok(());
        }
        if accounts.iter().any(|a| a.alias == new_alias) {
            return Err(AuthError::already_exists(new_alias));
        }

        let secret = match self.credentials.get(old_alias) {
            Ok(secret) => Some(secret),
            Err(e) if e.code() == AuthErrorCode::NotFound => {
                warn!(alias = %old_alias, "renaming account without stored credentials");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(ref secret) = secret {
            self.credentials.set(new_alias, secret)?;
        }

        accounts[index].alias = new_alias.to_string();
        normalize_defaults(&mut accounts);
        if let Err(e) = self.file.save(&accounts) {
            if secret.is_some()
                && let Err(cleanup) = self.credentials.delete(new_alias)
            {
                warn!(alias = %new_alias, error = %cleanup, "failed to undo credential copy");
            }
            return Err(e.with_alias(old_alias));
        }

        if secret.is_some() {
            self.credentials.delete(old_alias).map_err(|e| {
                AuthError::storage(format!(
                    "account renamed to '{}' but the old credentials could not be deleted: {}",
                    new_alias,
                    e.message()
                ))
                .with_alias(old_alias)
                .with_source(e)
            })?;
        }

        info!(from = %old_alias, to = %new_alias, "account renamed");
        Ok(())
    }

    /// Picks the account for this invocation. See [`resolve_account`].
    pub fn resolve_account(&self, override_alias: Option<&str>) -> AuthResult<Account> {
        let accounts = self.file.load()?;
        resolve_account(&accounts, override_alias, self.default_hint.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;
    use crate::testing::{FailingStore, MockFlow, MockRefresher, RefreshBehavior};
    use crate::tokens::CredentialTokenManager;
    use chrono::Duration;
    use gaccount_core::scopes::{OPENID, USERINFO_EMAIL};

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: AccountRegistry,
        store: Arc<MemoryCredentialStore>,
        flow: Arc<MockFlow>,
    }

    fn fixture_with_flow(flow: MockFlow) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryCredentialStore::new());
        let flow = Arc::new(flow);
        let tokens = Arc::new(CredentialTokenManager::new(
            store.clone(),
            Arc::new(MockRefresher::new(RefreshBehavior::Succeed)),
        ));
        let registry = AccountRegistry::new(
            AccountFile::new(dir.path().join("accounts.json")),
            store.clone(),
            flow.clone(),
            tokens,
        );
        Fixture {
            _dir: dir,
            registry,
            store,
            flow,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_flow(MockFlow::new("user@example.com"))
    }

    fn default_count(accounts: &[Account]) -> usize {
        accounts.iter().filter(|a| a.is_default).count()
    }

    fn assert_default_invariant(registry: &AccountRegistry) {
        let accounts = registry.list().unwrap();
        assert_eq!(
            default_count(&accounts),
            accounts.len().min(1),
            "accounts: {accounts:?}"
        );
    }

    fn failing_fixture() -> (tempfile::TempDir, AccountRegistry, Arc<FailingStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FailingStore::new());
        let tokens = Arc::new(CredentialTokenManager::new(
            store.clone(),
            Arc::new(MockRefresher::new(RefreshBehavior::Succeed)),
        ));
        let registry = AccountRegistry::new(
            AccountFile::new(dir.path().join("accounts.json")),
            store.clone(),
            Arc::new(MockFlow::new("user@example.com")),
            tokens,
        );
        (dir, registry, store)
    }

    /// Occupies this process's temp path with a directory so saves fail while
    /// loads and locking still work.
    fn block_saves(file: &AccountFile) {
        let temp = file
            .path()
            .with_extension(format!("json.tmp.{}", std::process::id()));
        std::fs::create_dir_all(temp).unwrap();
    }

    async fn add(registry: &AccountRegistry, alias: &str) -> Account {
        registry.add(alias, &["gmail".to_string()]).await.unwrap()
    }

    #[tokio::test]
    async fn first_add_defaults_alias_and_flag() {
        let f = fixture();
        let account = f.registry.add("", &["gmail".to_string()]).await.unwrap();

        assert_eq!(account.alias, "default");
        assert!(account.is_default);
        assert_eq!(account.email, "user@example.com");
        assert!(account
            .scopes
            .contains(&"https://www.googleapis.com/auth/gmail.readonly".to_string()));
        assert!(account.scopes.contains(&USERINFO_EMAIL.to_string()));
        assert!(account.scopes.contains(&OPENID.to_string()));

        // The flow saw the expanded, identity-augmented scope set.
        assert_eq!(f.flow.last_scopes(), account.scopes);
        assert_default_invariant(&f.registry);
    }

    #[tokio::test]
    async fn add_then_resolve_and_token_source() {
        let f = fixture();
        add(&f.registry, "work").await;

        let account = f.registry.resolve_account(Some("work")).unwrap();
        assert_eq!(account.alias, "work");

        let source = f.registry.token_manager().token_source("work").unwrap();
        assert!(!source.access_token().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_add_is_not_default() {
        let f = fixture();
        add(&f.registry, "A").await;
        let b = add(&f.registry, "B").await;

        assert!(!b.is_default);
        assert_eq!(f.registry.resolve_account(None).unwrap().alias, "A");
        assert_default_invariant(&f.registry);
    }

    #[tokio::test]
    async fn re_adding_overwrites_token_and_scopes() {
        let f = fixture();
        let first = add(&f.registry, "work").await;
        add(&f.registry, "home").await;
        let before = f.registry.token_manager().token_info("work").unwrap();

        let again = f
            .registry
            .add("work", &["calendar".to_string()])
            .await
            .unwrap();

        assert_eq!(again.added, first.added);
        assert!(again.is_default);
        assert!(again
            .scopes
            .contains(&"https://www.googleapis.com/auth/calendar".to_string()));
        assert!(!again
            .scopes
            .contains(&"https://www.googleapis.com/auth/gmail.readonly".to_string()));
        assert_eq!(f.registry.list().unwrap().len(), 2);

        let after = f.registry.token_manager().token_info("work").unwrap();
        assert_ne!(before.scopes, after.scopes);
        assert_eq!(after.scopes, again.scopes);
    }

    #[tokio::test]
    async fn add_repairs_stale_default_state() {
        let f = fixture();
        // A hand-edited file with no default flag at all.
        let stale = vec![
            Account::new("A", "a@example.com", vec![]),
            Account::new("B", "b@example.com", vec![]).with_added(chrono::Utc::now() - Duration::days(1)),
        ];
        f.registry.file().save(&stale).unwrap();

        add(&f.registry, "C").await;
        let accounts = f.registry.list().unwrap();
        assert_eq!(default_count(&accounts), 1);
        assert!(accounts.iter().find(|a| a.alias == "B").unwrap().is_default);
    }

    #[tokio::test]
    async fn failed_authorization_stores_nothing() {
        let f = fixture_with_flow(MockFlow::failing());
        let err = f
            .registry
            .add("work", &["gmail".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::AuthorizationFailed);
        assert_eq!(err.alias(), Some("work"));
        assert!(f.registry.list().unwrap().is_empty());
        assert!(f.store.aliases().is_empty());
    }

    #[tokio::test]
    async fn invalid_alias_is_rejected_before_authorizing() {
        let f = fixture();
        let err = f.registry.add("my work", &[]).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);
        assert_eq!(f.flow.calls(), 0);
    }

    #[tokio::test]
    async fn token_write_failure_is_storage_failed() {
        let (_dir, registry, store) = failing_fixture();
        store.fail_writes(true);

        let err = registry.add("work", &[]).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StorageFailed);
        assert!(err.message().contains("authorization succeeded"));
        assert!(registry.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn registry_write_failure_removes_new_token() {
        let f = fixture();
        block_saves(f.registry.file());

        let err = f.registry.add("work", &[]).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StorageFailed);
        assert_eq!(err.alias(), Some("work"));
        // The token was written, then withdrawn when the row could not be.
        assert_eq!(f.flow.calls(), 1);
        assert!(f.store.aliases().is_empty());
        assert!(f.registry.list().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_keep_every_row_and_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let store = Arc::new(MemoryCredentialStore::new());

        // Separate registries over one file, as separate CLI processes would be.
        let aliases: Vec<String> = (0..8).map(|i| format!("acct{i}")).collect();
        let tasks: Vec<_> = aliases
            .iter()
            .cloned()
            .map(|alias| {
                let registry = AccountRegistry::new(
                    AccountFile::new(&path),
                    store.clone(),
                    Arc::new(MockFlow::new(&format!("{alias}@example.com"))),
                    Arc::new(CredentialTokenManager::new(
                        store.clone(),
                        Arc::new(MockRefresher::new(RefreshBehavior::Succeed)),
                    )),
                );
                tokio::spawn(async move { registry.add(&alias, &[]).await.map(|a| a.alias) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut rows: Vec<String> = AccountFile::new(&path)
            .load()
            .unwrap()
            .into_iter()
            .map(|a| a.alias)
            .collect();
        rows.sort();
        let mut secrets = store.aliases();
        secrets.sort();
        assert_eq!(rows, aliases);
        assert_eq!(secrets, aliases);

        let accounts = AccountFile::new(&path).load().unwrap();
        assert_eq!(default_count(&accounts), 1);
    }

    #[tokio::test]
    async fn remove_deletes_row_and_secret() {
        let f = fixture();
        add(&f.registry, "work").await;
        assert!(f.store.contains("work").unwrap());

        f.registry.remove("work").unwrap();
        assert!(f.registry.list().unwrap().is_empty());
        assert!(!f.store.contains("work").unwrap());
        assert!(!f.registry.token_manager().token_info("work").unwrap().has_token);
    }

    #[tokio::test]
    async fn remove_twice_is_not_found() {
        let f = fixture();
        add(&f.registry, "A").await;
        add(&f.registry, "B").await;

        f.registry.remove("B").unwrap();
        let err = f.registry.remove("B").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::NotFound);

        let aliases: Vec<String> = f.registry.list().unwrap().into_iter().map(|a| a.alias).collect();
        assert_eq!(aliases, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn removing_default_promotes_remaining_account() {
        let f = fixture();
        add(&f.registry, "A").await;
        add(&f.registry, "B").await;

        f.registry.remove("A").unwrap();
        let accounts = f.registry.list().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].alias, "B");
        assert!(accounts[0].is_default);
    }

    #[tokio::test]
    async fn promotion_picks_earliest_added() {
        let f = fixture();
        let now = chrono::Utc::now();
        f.registry
            .file()
            .save(&[
                Account::new("A", "a@example.com", vec![]).with_default(true).with_added(now),
                Account::new("C", "c@example.com", vec![]).with_added(now + Duration::minutes(2)),
                Account::new("B", "b@example.com", vec![]).with_added(now + Duration::minutes(1)),
            ])
            .unwrap();

        f.registry.remove("A").unwrap();
        let default = f.registry.resolve_account(None).unwrap();
        assert_eq!(default.alias, "B");
        assert_default_invariant(&f.registry);
    }

    #[tokio::test]
    async fn removing_last_account_leaves_empty_registry() {
        let f = fixture();
        add(&f.registry, "A").await;
        f.registry.remove("A").unwrap();

        assert!(f.registry.list().unwrap().is_empty());
        assert_default_invariant(&f.registry);
        assert_eq!(
            f.registry.resolve_account(None).unwrap_err().code(),
            AuthErrorCode::NoAccountFound
        );
    }

    #[tokio::test]
    async fn switch_moves_default_flag() {
        let f = fixture();
        add(&f.registry, "A").await;
        add(&f.registry, "B").await;

        f.registry.switch("B").unwrap();
        let accounts = f.registry.list().unwrap();
        let a = accounts.iter().find(|a| a.alias == "A").unwrap();
        let b = accounts.iter().find(|a| a.alias == "B").unwrap();
        assert!(!a.is_default);
        assert!(b.is_default);
        assert_default_invariant(&f.registry);
    }

    #[tokio::test]
    async fn switch_unknown_alias_is_not_found() {
        let f = fixture();
        add(&f.registry, "A").await;

        let err = f.registry.switch("ghost").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::NotFound);
        assert!(f.registry.get("A").unwrap().is_default);
    }

    #[tokio::test]
    async fn rename_moves_secret_without_duplication() {
        let f = fixture();
        let original = add(&f.registry, "old").await;
        let secret_before = f.store.get("old").unwrap();

        f.registry.rename("old", "new").unwrap();

        let tokens = f.registry.token_manager();
        assert!(tokens.token_info("new").unwrap().has_token);
        assert!(!tokens.token_info("old").unwrap().has_token);
        assert_eq!(f.store.get("new").unwrap(), secret_before);
        assert_eq!(f.store.aliases(), vec!["new".to_string()]);

        let renamed = f.registry.get("new").unwrap();
        assert_eq!(renamed.added, original.added);
        assert_eq!(renamed.scopes, original.scopes);
        assert_eq!(renamed.is_default, original.is_default);
        assert_eq!(
            f.registry.get("old").unwrap_err().code(),
            AuthErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn rename_errors() {
        let f = fixture();
        add(&f.registry, "A").await;
        add(&f.registry, "B").await;

        let err = f.registry.rename("ghost", "C").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::NotFound);

        let err = f.registry.rename("A", "B").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::AlreadyExists);
        assert_eq!(err.alias(), Some("B"));

        // Nothing moved.
        assert_eq!(f.store.aliases(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn rename_keeps_old_secret_when_copy_fails() {
        let (_dir, registry, store) = failing_fixture();
        add(&registry, "old").await;

        store.fail_writes(true);
        let err = registry.rename("old", "new").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StorageFailed);
        assert!(store.contains("old").unwrap());
        assert_eq!(registry.get("old").unwrap().alias, "old");
    }

    #[tokio::test]
    async fn remove_reports_undeletable_secret_after_dropping_row() {
        let (_dir, registry, store) = failing_fixture();
        add(&registry, "A").await;
        add(&registry, "B").await;

        store.fail_deletes(true);
        let err = registry.remove("A").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StorageFailed);
        assert_eq!(err.alias(), Some("A"));
        assert!(err.message().contains("failing store"));

        // The row is gone and B took over the default; the secret remains.
        let accounts = registry.list().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].alias, "B");
        assert!(accounts[0].is_default);
        assert!(store.contains("A").unwrap());
    }

    #[tokio::test]
    async fn rename_withdraws_copy_when_registry_write_fails() {
        let f = fixture();
        add(&f.registry, "old").await;
        let secret = f.store.get("old").unwrap();

        block_saves(f.registry.file());
        let err = f.registry.rename("old", "new").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StorageFailed);
        assert_eq!(err.alias(), Some("old"));

        assert_eq!(f.store.aliases(), vec!["old".to_string()]);
        assert_eq!(f.store.get("old").unwrap(), secret);
        assert_eq!(f.registry.get("old").unwrap().alias, "old");
        assert_eq!(
            f.registry.get("new").unwrap_err().code(),
            AuthErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn resolution_precedence() {
        let f = fixture();
        add(&f.registry, "A").await;
        add(&f.registry, "B").await;

        assert_eq!(f.registry.resolve_account(Some("B")).unwrap().alias, "B");
        assert_eq!(f.registry.resolve_account(None).unwrap().alias, "A");
        assert_eq!(f.registry.resolve_account(Some("")).unwrap().alias, "A");

        let err = f.registry.resolve_account(Some("ghost")).unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::NotFound);
    }

    #[tokio::test]
    async fn default_hint_applies_only_without_default_flag() {
        let f = fixture();
        f.registry
            .file()
            .save(&[
                Account::new("A", "a@example.com", vec![]),
                Account::new("B", "b@example.com", vec![]),
            ])
            .unwrap();

        let registry = AccountRegistry::new(
            f.registry.file().clone(),
            f.store.clone(),
            f.flow.clone(),
            Arc::new(CredentialTokenManager::new(
                f.store.clone(),
                Arc::new(MockRefresher::new(RefreshBehavior::Succeed)),
            )),
        )
        .with_default_hint(Some("B".to_string()));

        assert_eq!(registry.resolve_account(None).unwrap().alias, "B");
        registry.switch("A").unwrap();
        assert_eq!(registry.resolve_account(None).unwrap().alias, "A");
    }

    #[tokio::test]
    async fn invariant_holds_across_operation_sequence() {
        let f = fixture();
        assert_default_invariant(&f.registry);

        for alias in ["A", "B", "C"] {
            add(&f.registry, alias).await;
            assert_default_invariant(&f.registry);
        }
        f.registry.switch("C").unwrap();
        assert_default_invariant(&f.registry);
        f.registry.rename("C", "D").unwrap();
        assert_default_invariant(&f.registry);
        assert!(f.registry.get("D").unwrap().is_default);
        f.registry.remove("D").unwrap();
        assert_default_invariant(&f.registry);
        f.registry.remove("A").unwrap();
        assert_default_invariant(&f.registry);
        f.registry.remove("B").unwrap();
        assert_default_invariant(&f.registry);
    }

    #[test]
    fn normalize_defaults_keeps_single_flag() {
        let mut accounts = vec![
            Account::new("A", "", vec![]).with_default(true),
            Account::new("B", "", vec![]),
        ];
        assert!(!normalize_defaults(&mut accounts));
        assert!(!normalize_defaults(&mut []));
    }
}
