//! Account and token commands.
//!
//! Every command builds one [`AccountRegistry`] from the configuration and
//! drives it. Commands that never talk to Google (list, switch, status...)
//! open it with [`Session::open_local`] and never resolve OAuth credentials.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::Serialize;
use tracing::{debug, info, warn};

use gaccount_auth::google::{OAuthClient, OAuthCredentials};
use gaccount_auth::{
    Account, AccountFile, AccountRegistry, AuthError, AuthResult, Authorization,
    AuthorizationFlow, BoxFuture, CredentialStore, CredentialTokenManager, FileCredentialStore,
    StoredToken, TokenInfo, TokenRefresher,
};
use gaccount_core::{alias_or_default, scopes};

use crate::cli::OAuthArgs;
use crate::config::{ClientConfig, CredentialBackend, OAuthSettings};
use crate::error::{ClientError, ClientResult};

/// Where the OAuth client credentials were resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Flags or `GOOGLE_*` variables; persisted after a successful add.
    Cli,
    Config,
}

/// Stand-in for the OAuth client when no usable credentials are configured.
///
/// Only reached when a command actually needs Google, which then fails
/// with the reason the credentials could not be resolved.
struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    fn error(&self) -> AuthError {
        AuthError::configuration(self.reason.clone())
    }
}

impl AuthorizationFlow for Unconfigured {
    fn authorize<'a>(&'a self, _scopes: &'a [String]) -> BoxFuture<'a, AuthResult<Authorization>> {
        Box::pin(async move { Err(self.error()) })
    }
}

impl TokenRefresher for Unconfigured {
    fn refresh<'a>(&'a self, _token: &'a StoredToken) -> BoxFuture<'a, AuthResult<StoredToken>> {
        Box::pin(async move { Err(self.error()) })
    }
}

/// A registry wired to the configured store and OAuth client.
pub struct Session {
    registry: AccountRegistry,
    credentials: Result<(OAuthCredentials, CredentialSource), String>,
}

impl Session {
    /// Opens the registry and resolves the OAuth client credentials.
    ///
    /// Resolving may run `pass show`, so only commands that talk to Google
    /// open their session this way.
    pub fn open(config: &ClientConfig, oauth: &OAuthArgs) -> ClientResult<Self> {
        let credentials = resolve_oauth_credentials(oauth, &config.oauth)
            .and_then(|(creds, source)| {
                creds
                    .validate()
                    .map_err(|e| format!("invalid Google credentials: {}", e.message()))?;
                Ok((creds, source))
            });
        Self::build(config, credentials)
    }

    /// Opens the registry without touching the OAuth client credentials.
    pub fn open_local(config: &ClientConfig) -> ClientResult<Self> {
        Self::build(
            config,
            Err("OAuth client credentials were not loaded for this command".to_string()),
        )
    }

    fn build(
        config: &ClientConfig,
        credentials: Result<(OAuthCredentials, CredentialSource), String>,
    ) -> ClientResult<Self> {
        let store = open_store(config)?;

        let (flow, refresher): (Arc<dyn AuthorizationFlow>, Arc<dyn TokenRefresher>) =
            match &credentials {
                Ok((creds, _)) => {
                    let client = Arc::new(OAuthClient::new(
                        config.oauth.to_oauth_config(creds.clone()),
                    )?);
                    (client.clone(), client)
                }
                Err(reason) => {
                    debug!(reason = %reason, "OAuth client not configured");
                    let stub = Arc::new(Unconfigured {
                        reason: reason.clone(),
                    });
                    (stub.clone(), stub)
                }
            };

        let tokens = Arc::new(CredentialTokenManager::new(store.clone(), refresher));
        let registry = AccountRegistry::new(
            AccountFile::new(config.accounts_path()),
            store,
            flow,
            tokens,
        )
        .with_default_hint(config.default_account.clone());

        Ok(Self {
            registry,
            credentials,
        })
    }

    /// Returns the registry.
    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }
}

fn open_store(config: &ClientConfig) -> ClientResult<Arc<dyn CredentialStore>> {
    match config.credential_backend {
        #[cfg(feature = "keyring")]
        CredentialBackend::Keyring => Ok(Arc::new(gaccount_auth::KeyringCredentialStore::new())),
        #[cfg(not(feature = "keyring"))]
        CredentialBackend::Keyring => Err(ClientError::Config(
            "built without keyring support; set credential_backend = \"file\"".to_string(),
        )),
        CredentialBackend::File => Ok(Arc::new(FileCredentialStore::new(
            config.credentials_path(),
        ))),
    }
}

/// Picks the OAuth client credentials: an explicit id and secret pair wins over
/// `--credentials-file`, and either wins over the `[oauth]` table. A lone
/// `--client-id` or `--client-secret` is an error rather than a fallback.
pub fn resolve_oauth_credentials(
    args: &OAuthArgs,
    settings: &OAuthSettings,
) -> Result<(OAuthCredentials, CredentialSource), String> {
    if let (Some(id), Some(secret)) = (&args.client_id, &args.client_secret) {
        return Ok((OAuthCredentials::new(id, secret), CredentialSource::Cli));
    }

    if let Some(ref path) = args.credentials_file {
        return OAuthCredentials::from_file(path)
            .map(|creds| (creds, CredentialSource::Cli))
            .map_err(|e| format!("{}: {}", path.display(), e.message()));
    }

    if args.client_id.is_some() || args.client_secret.is_some() {
        return Err("--client-id and --client-secret must be given together".to_string());
    }

    settings
        .resolve_credentials()
        .map(|creds| (creds, CredentialSource::Config))
}

/// Log in and register an account.
pub async fn add(
    session: &Session,
    alias: Option<String>,
    scope_list: Option<String>,
    force: bool,
    config_path: &Path,
) -> ClientResult<()> {
    let alias = alias_or_default(alias.as_deref().unwrap_or_default()).to_string();
    let requested = scope_list.as_deref().map(scopes::parse_list).unwrap_or_default();
    let registry = session.registry();

    if !force && registry.get(&alias).is_ok() {
        let tokens = registry.token_manager();
        if !tokens.needs_reauth(&alias, &requested)? {
            println!("Account '{}' is already authorized for these scopes.", alias);
            println!("Use --force to log in again.");
            return Ok(());
        }
        info!(alias = %alias, "stored token lacks requested scopes, logging in again");
    }

    let (credentials, source) = session
        .credentials
        .as_ref()
        .map_err(|reason| ClientError::Config(reason.clone()))?;

    println!("Adding Google account '{}'...", alias);
    println!();
    println!("Approve access in the browser window that opens.");
    println!("If none opens, copy the URL printed below into a browser.");
    println!();

    let account = tokio::select! {
        result = registry.add(&alias, &requested) => result?,
        _ = tokio::signal::ctrl_c() => return Err(ClientError::Interrupted),
    };

    if *source == CredentialSource::Cli {
        match save_credentials_to_config(config_path, credentials) {
            Ok(()) => println!("Credentials saved to {}", config_path.display()),
            Err(e) => warn!(path = %config_path.display(), error = %e, "could not save OAuth credentials"),
        }
    }

    println!("Authorized '{}' as {}.", account.alias, account.email);
    if account.is_default {
        println!("This is now the default account.");
    }
    println!("Scopes:");
    for scope in &account.scopes {
        println!("  {}", scope);
    }
    Ok(())
}

/// List registered accounts.
pub fn list(session: &Session, json: bool) -> ClientResult<()> {
    let accounts = session.registry().list()?;
    if json {
        println!("{}", to_json(&accounts)?);
    } else if accounts.is_empty() {
        println!("No accounts registered. Run 'gaccount auth add' to add one.");
    } else {
        print!("{}", render_accounts(&accounts));
    }
    Ok(())
}

/// Remove an account and its token.
pub fn remove(session: &Session, alias: &str) -> ClientResult<()> {
    session.registry().remove(alias)?;
    println!("Removed account '{}'.", alias);
    if let Ok(default) = session.registry().resolve_account(None) {
        println!("Default account is now '{}'.", default.alias);
    }
    Ok(())
}

/// Make an account the default.
pub fn switch(session: &Session, alias: &str) -> ClientResult<()> {
    session.registry().switch(alias)?;
    println!("Default account is now '{}'.", alias);
    Ok(())
}

/// Rename an account.
pub fn rename(session: &Session, old: &str, new: &str) -> ClientResult<()> {
    session.registry().rename(old, new)?;
    println!("Renamed account '{}' to '{}'.", old, new.trim());
    Ok(())
}

/// Token status of one account.
#[derive(Debug, Serialize)]
pub struct AccountStatus {
    pub alias: String,
    pub email: String,
    pub is_default: bool,
    #[serde(flatten)]
    pub token: TokenInfo,
}

/// Show token status for the resolved account.
pub fn status(session: &Session, account: Option<&str>, json: bool) -> ClientResult<()> {
    let registry = session.registry();
    let account = registry.resolve_account(account)?;
    let token = registry.token_manager().token_info(&account.alias)?;
    let status = AccountStatus {
        alias: account.alias,
        email: account.email,
        is_default: account.is_default,
        token,
    };

    if json {
        println!("{}", to_json(&status)?);
    } else {
        print!("{}", render_status(&status));
    }
    Ok(())
}

/// Force a refresh for the resolved account.
pub async fn refresh(session: &Session, account: Option<&str>) -> ClientResult<()> {
    let registry = session.registry();
    let account = registry.resolve_account(account)?;
    let token = registry.token_manager().refresh_token(&account.alias).await?;

    match token.expiry {
        Some(expiry) => println!(
            "Refreshed token for '{}', valid until {}.",
            account.alias,
            expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        None => println!("Refreshed token for '{}'.", account.alias),
    }
    Ok(())
}

/// Print a valid access token for the resolved account.
pub async fn token(session: &Session, account: Option<&str>) -> ClientResult<()> {
    let registry = session.registry();
    let account = registry.resolve_account(account)?;
    let source = registry.token_manager().token_source(&account.alias)?;
    println!("{}", source.access_token().await?);
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> ClientResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ClientError::Output(e.to_string()))
}

fn render_accounts(accounts: &[Account]) -> String {
    let width = accounts.iter().map(|a| a.alias.len()).max().unwrap_or(0);
    let mut out = String::new();
    for account in accounts {
        let marker = if account.is_default { '*' } else { ' ' };
        let email = if account.email.is_empty() {
            "-"
        } else {
            account.email.as_str()
        };
        out.push_str(&format!(
            "{} {:<width$}  {}  added {}  ({} scopes)\n",
            marker,
            account.alias,
            email,
            account.added.format("%Y-%m-%d"),
            account.scopes.len(),
        ));
    }
    out
}

fn render_status(status: &AccountStatus) -> String {
    let mut out = format!(
        "Account: {}{}\nEmail:   {}\n",
        status.alias,
        if status.is_default { " (default)" } else { "" },
        status.email
    );

    if !status.token.has_token {
        out.push_str(&format!(
            "Token:   missing, run 'gaccount auth add {}'\n",
            status.alias
        ));
        return out;
    }

    let state = if status.token.is_expired {
        "expired (refreshed on next use)"
    } else {
        "valid"
    };
    out.push_str(&format!("Token:   {}\n", state));
    if !status.token.expiry_time.is_empty() {
        out.push_str(&format!("Expires: {}\n", status.token.expiry_time));
    }
    out.push_str("Scopes:\n");
    for scope in &status.token.scopes {
        out.push_str(&format!("  {}\n", scope));
    }
    out
}

/// Saves client credentials to `config.toml` under `[oauth]`, keeping the
/// rest of the file (comments included) untouched.
fn save_credentials_to_config(path: &Path, credentials: &OAuthCredentials) -> Result<(), String> {
    let content = if path.exists() {
        std::fs::read_to_string(path).map_err(|e| e.to_string())?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| format!("could not parse {}: {}", path.display(), e))?;

    if !doc.contains_key("oauth") {
        doc["oauth"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let oauth = doc["oauth"]
        .as_table_mut()
        .ok_or_else(|| format!("'oauth' in {} is not a table", path.display()))?;
    oauth["client_id"] = toml_edit::value(credentials.client_id.as_str());
    oauth["client_secret"] = toml_edit::value(credentials.client_secret.as_str());

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("could not create {}: {}", parent.display(), e))?;
    }

    write_config_atomically(path, doc.to_string().as_bytes())
        .map_err(|e| format!("could not write {}: {}", path.display(), e))?;
    info!(path = %path.display(), "saved OAuth credentials");
    Ok(())
}

/// Replaces `path` through a temporary sibling so readers never see half a
/// file. The result is owner-only.
fn write_config_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(format!(".tmp.{}", std::process::id()));
    let temp_path = PathBuf::from(temp_name);

    let written = (|| {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&temp_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(contents)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();

    if written.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    written
}

/// Returns the config path commands should write to.
pub fn effective_config_path(cli_path: Option<&PathBuf>) -> PathBuf {
    cli_path.cloned().unwrap_or_else(ClientConfig::default_path)
}
