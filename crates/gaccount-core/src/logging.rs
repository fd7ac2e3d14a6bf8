//! Logging setup for the gaccount binaries.
//!
//! Everything is written to stderr: `gaccount auth token` prints a bearer
//! token on stdout and scripts capture it.

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable selecting the log format (`text` or `json`).
pub const LOG_FORMAT_ENV: &str = "GACCOUNT_LOG_FORMAT";

/// Crates whose events pass the default filter.
const CRATES: &[&str] = &["gaccount", "gaccount_cli", "gaccount_auth", "gaccount_core"];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("logging is already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log format '{0}' (expected text or json)")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact single-line text without timestamps.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "compact" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    /// Include targets and source locations.
    pub verbose: bool,
    /// Explicit filter directive. Takes precedence over `RUST_LOG`.
    pub filter: Option<String>,
}

impl LogSettings {
    /// Warnings only, or everything down to DEBUG with `--debug`.
    #[must_use]
    pub fn for_cli(debug: bool) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::WARN },
            format: LogFormat::Text,
            verbose: debug,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    /// Directive used when neither `filter` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        CRATES
            .iter()
            .map(|krate| format!("{krate}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Some(directive) = &self.filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive())))
    }
}

/// Install the global subscriber. Call once, before any command runs.
///
/// # Errors
///
/// Fails when a subscriber is already installed or the filter does not parse.
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let filter = settings.env_filter()?;

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(settings.verbose)
        .with_file(settings.verbose)
        .with_line_number(settings.verbose);
    let layer = match settings.format {
        LogFormat::Text => layer.compact().without_time().boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(())
}
