//! Configuration commands.

use std::path::Path;

use crate::cli::OAuthArgs;
use crate::commands::auth::resolve_oauth_credentials;
use crate::config::{ClientConfig, CredentialBackend};
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
///
/// Secret references are printed as written, never resolved.
pub fn dump(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Output(e.to_string()))?;
    println!("# config.toml ({})", config_path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig, oauth: &OAuthArgs) -> ClientResult<()> {
    config.validate().map_err(ClientError::Config)?;

    if config.oauth.has_credentials() || oauth.client_id.is_some() || oauth.credentials_file.is_some() {
        let (credentials, _) = resolve_oauth_credentials(oauth, &config.oauth)
            .map_err(|e| ClientError::Config(format!("invalid Google credentials: {}", e)))?;
        credentials.validate().map_err(|e| {
            ClientError::Config(format!("invalid Google credentials: {}", e.message()))
        })?;
        println!("Google credentials are valid.");
    } else {
        println!("No Google credentials configured; 'gaccount auth add' will need them.");
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration and data file paths.
pub fn path(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    println!("config: {}", config_path.display());
    println!("accounts: {}", config.accounts_path().display());
    match config.credential_backend {
        CredentialBackend::Keyring => println!("credentials: OS keyring"),
        CredentialBackend::File => {
            println!("credentials: {}", config.credentials_path().display())
        }
    }
    Ok(())
}
