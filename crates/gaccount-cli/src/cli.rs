//! Argument parsing for the `gaccount` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// gaccount - Keep several Google accounts authorized side by side
#[derive(Debug, Parser)]
#[command(name = "gaccount")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "GACCOUNT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Account alias to act on instead of the default
    #[arg(long, short, env = "GACCOUNT_ACCOUNT", global = true)]
    pub account: Option<String>,

    #[command(flatten)]
    pub oauth: OAuthArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// OAuth client credentials given on the command line.
#[derive(Debug, Clone, Default, Args)]
pub struct OAuthArgs {
    /// Desktop OAuth client id of your Cloud project
    #[arg(long, env = "GOOGLE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Secret paired with --client-id
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// client_secret_*.json downloaded for the OAuth client
    ///
    /// Used instead of --client-id/--client-secret. Credentials given on the
    /// command line are copied into config.toml after a successful login.
    #[arg(long, env = "GOOGLE_CREDENTIALS_FILE", global = true)]
    pub credentials_file: Option<PathBuf>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Account and token commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Account and token actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Log in to a Google account and register it under an alias
    Add {
        /// Alias for the account (defaults to "default")
        alias: Option<String>,

        /// Scopes to request, comma separated (shorthands like gmail,
        /// drive, calendar or full scope URLs)
        #[arg(long, short)]
        scopes: Option<String>,

        /// Log in again even if the stored token already covers the scopes
        #[arg(long, short)]
        force: bool,
    },

    /// List registered accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove an account and its stored token
    Remove {
        /// Alias of the account to remove
        alias: String,
    },

    /// Make an account the default
    Switch {
        /// Alias of the new default account
        alias: String,
    },

    /// Rename an account
    Rename {
        /// Current alias
        old: String,
        /// New alias
        new: String,
    },

    /// Show token status for the selected account
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Force a token refresh for the selected account
    Refresh,

    /// Print a valid access token for the selected account
    Token,
}

impl AuthAction {
    /// Whether the action may need the OAuth client: a login, a token refresh
    /// or a token read that might refresh.
    pub fn contacts_google(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Refresh | Self::Token)
    }
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration and data file paths
    Path,
}
