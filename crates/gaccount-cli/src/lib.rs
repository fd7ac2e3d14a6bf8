//! CLI, configuration and output rendering
//!
//! This crate provides the `gaccount` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
