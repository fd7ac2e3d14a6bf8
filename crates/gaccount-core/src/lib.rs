//! Core types: accounts, OAuth scopes, logging setup

pub mod account;
pub mod logging;
pub mod scopes;

pub use account::{Account, AliasError, DEFAULT_ALIAS, alias_or_default, validate_alias};
pub use logging::{LOG_FORMAT_ENV, LogFormat, LogSettings, LoggingError, init_logging};
