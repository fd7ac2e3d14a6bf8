//! gaccount CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use gaccount_cli::cli::{AuthAction, Cli, Command, ConfigAction};
use gaccount_cli::commands::{self, auth::Session};
use gaccount_cli::config::ClientConfig;
use gaccount_cli::error::{ClientError, ClientResult};
use gaccount_core::{LOG_FORMAT_ENV, LogFormat, LogSettings, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_settings = LogSettings::for_cli(cli.debug);
    if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
        match format.parse::<LogFormat>() {
            Ok(format) => log_settings = log_settings.with_format(format),
            Err(e) => eprintln!("warning: {}", e),
        }
    }
    if let Err(e) = init_logging(&log_settings) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = commands::auth::effective_config_path(cli.config.as_ref());
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path).map_err(ClientError::Config)?
    } else {
        ClientConfig::load().map_err(ClientError::Config)?
    };

    let account = cli.account.as_deref().filter(|a| !a.trim().is_empty());

    match cli.command {
        Command::Auth { action } => {
            let session = if action.contacts_google() {
                Session::open(&config, &cli.oauth)?
            } else {
                Session::open_local(&config)?
            };
            match action {
                AuthAction::Add {
                    alias,
                    scopes,
                    force,
                } => {
                    // `-a` names the account to add when no alias is given.
                    let alias = alias.or_else(|| account.map(str::to_string));
                    commands::auth::add(&session, alias, scopes, force, &config_path).await
                }
                AuthAction::List { json } => commands::auth::list(&session, json),
                AuthAction::Remove { alias } => commands::auth::remove(&session, &alias),
                AuthAction::Switch { alias } => commands::auth::switch(&session, &alias),
                AuthAction::Rename { old, new } => commands::auth::rename(&session, &old, &new),
                AuthAction::Status { json } => commands::auth::status(&session, account, json),
                AuthAction::Refresh => commands::auth::refresh(&session, account).await,
                AuthAction::Token => commands::auth::token(&session, account).await,
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config, &cli.oauth),
            ConfigAction::Path => commands::config::path(&config, &config_path),
        },
    }
}
