use std::fmt;

use gaccount_auth::{AuthError, AuthErrorCode};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug)]
pub enum ClientError {
    /// Bad or missing configuration, including OAuth client credentials.
    Config(String),
    Auth(AuthError),
    /// JSON or TOML output could not be produced.
    Output(String),
    /// Ctrl-C during an interactive login.
    Interrupted,
}

impl ClientError {
    /// Process exit status for this error.
    ///
    /// 2 for configuration problems, 3 when the named or implied account does
    /// not exist, 130 after Ctrl-C, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Auth(err) => match err.code() {
                AuthErrorCode::Configuration => 2,
                AuthErrorCode::NotFound | AuthErrorCode::NoAccountFound => 3,
                _ => 1,
            },
            Self::Output(_) => 1,
            Self::Interrupted => 130,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Auth(err) => fmt::Display::fmt(err, f),
            Self::Output(msg) => write!(f, "cannot render output: {}", msg),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AuthError> for ClientError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}
