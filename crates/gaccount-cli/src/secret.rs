//! Secret references in `config.toml`.
//!
//! `client_id` and `client_secret` may name where the value lives instead of
//! holding it: `pass::<entry>` reads the first line of `pass show <entry>`,
//! `env::<VAR>` reads an environment variable. Any other value is literal.

use std::fmt;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    Literal(&'a str),
    Pass(&'a str),
    Env(&'a str),
}

impl<'a> SecretRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        if let Some(entry) = value.strip_prefix("pass::") {
            Self::Pass(entry)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Literal(value)
        }
    }

    pub fn resolve(&self) -> Result<String, String> {
        match *self {
            Self::Literal(value) => Ok(value.to_string()),
            Self::Pass(entry) => read_pass_entry(entry),
            Self::Env(var) => {
                std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
            }
        }
    }
}

/// Where the value comes from, without the value itself.
impl fmt::Display for SecretRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("inline value"),
            Self::Pass(entry) => write!(f, "pass entry `{}`", entry),
            Self::Env(var) => write!(f, "environment variable `{}`", var),
        }
    }
}

/// Parse and resolve in one step.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}

fn read_pass_entry(entry: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .args(["show", entry])
        .output()
        .map_err(|e| format!("cannot run `pass show {}`: {}", entry, e))?;

    if !output.status.success() {
        return Err(format!(
            "`pass show {}` exited with {}: {}",
            entry,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.lines().next().map(str::trim) {
        Some(line) if !line.is_empty() => Ok(line.to_string()),
        _ => Err(format!("`pass show {}` printed an empty first line", entry)),
    }
}
