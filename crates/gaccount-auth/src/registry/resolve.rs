//! Picking the account for an invocation.

use gaccount_core::Account;

use crate::error::{AuthError, AuthResult};

/// Picks the account to act on from a registry snapshot.
///
/// Precedence, first match wins:
///
/// 1. a non-empty `override_alias` (an unknown alias is `NotFound`, never a
///    fallback)
/// 2. the account flagged as default
/// 3. the configured `default_hint`, if it names a registered account
/// 4. the only account, when exactly one exists
///
/// Anything else is `NoAccountFound`. The snapshot is not modified.
pub fn resolve_account(
    accounts: &[Account],
    override_alias: Option<&str>,
    default_hint: Option<&str>,
) -> AuthResult<Account> {
    if let Some(alias) = override_alias.map(str::trim).filter(|a| !a.is_empty()) {
        return accounts
            .iter()
            .find(|a| a.alias == alias)
            .cloned()
            .ok_or_else(|| AuthError::not_found(alias));
    }

    // Several flags only happen with a hand-edited file; earliest wins.
    if let Some(account) = accounts
        .iter()
        .filter(|a| a.is_default)
        .min_by_key(|a| a.added)
    {
        return Ok(account.clone());
    }

    if let Some(hint) = default_hint.map(str::trim).filter(|h| !h.is_empty())
        && let Some(account) = accounts.iter().find(|a| a.alias == hint)
    {
        return Ok(account.clone());
    }

    match accounts {
        [only] => Ok(only.clone()),
        [] => Err(AuthError::no_account("no accounts registered")),
        _ => Err(AuthError::no_account(format!(
            "{} accounts registered and none is the default",
            accounts.len()
        ))),
    }
}
