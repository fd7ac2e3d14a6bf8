//! Installed-app OAuth against Google: PKCE (RFC 7636) with a loopback
//! redirect, the code exchange, refresh, and the userinfo lookup.
//!
//! The listener binds 127.0.0.1 only and answers one `/callback` request whose
//! `state` matches. Anything else gets a 404 and the wait continues.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::flow::{Authorization, AuthorizationFlow, BoxFuture, TokenRefresher};
use crate::tokens::StoredToken;

use super::config::OAuthConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Random bytes behind the verifier; 43 characters once encoded.
const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

const CALLBACK_PATH: &str = "/callback";

/// How long an accepted connection may take to send its request line.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on bytes read from one connection.
const MAX_REQUEST_LINE: u64 = 8 * 1024;

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h2>gaccount: account authorized</h2>\
    <p>Return to the terminal; this tab can be closed.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h2>gaccount: authorization was not completed</h2>\
    <p>See the terminal for details.</p></body></html>";

const NOT_FOUND_PAGE: &str = "HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n";

/// OAuth client for Google APIs.
///
/// Runs the interactive PKCE flow and refreshes tokens. Implements both
/// [`AuthorizationFlow`] and [`TokenRefresher`].
#[derive(Debug)]
pub struct OAuthClient {
    config: OAuthConfig,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    pub fn new(config: OAuthConfig) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                AuthError::internal(format!("failed to create HTTP client: {}", e)).with_source(e)
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Runs the PKCE flow for `scopes` and returns the issued token and the
    /// consenting account's email.
    ///
    /// The whole flow is bounded by the configured authorize timeout.
    /// Dropping the returned future closes the loopback listener.
    ///
    /// # Errors
    ///
    /// `AuthorizationFailed` on denial, timeout, state mismatch or a failed
    /// code exchange. `Configuration` if no loopback port is free.
    pub async fn authorize(&self, scopes: &[String]) -> AuthResult<Authorization> {
        let deadline = self.config.authorize_timeout;
        match tokio::time::timeout(deadline, self.run_flow(scopes)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::authorization(format!(
                "timed out after {}s waiting for the browser callback",
                deadline.as_secs()
            ))),
        }
    }

    async fn run_flow(&self, scopes: &[String]) -> AuthResult<Authorization> {
        let pkce = PkceSession::generate();

        let (listener, port) = bind_loopback_server(self.config.loopback_port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);

        let auth_url = pkce.consent_url(&self.config.credentials.client_id, &redirect_uri, scopes)?;

        info!(port, "starting OAuth flow, opening browser");
        debug!(url = %auth_url, "authorization URL");

        if let Err(e) = open::that(auth_url.as_str()) {
            warn!(error = %e, "could not launch a browser");
            eprintln!("\nOpen this URL to continue:\n\n{}\n", auth_url);
        }

        let code = wait_for_callback(listener, &pkce.state).await?;

        info!("received authorization code, exchanging for tokens");
        let token = self
            .exchange_code(&code, &pkce.verifier, &redirect_uri, scopes)
            .await?;
        let email = self.fetch_email(&token.access_token).await?;

        info!(email = %email, "authorization complete");
        Ok(Authorization { token, email })
    }

    /// Trades the refresh token in `token` for a new access token.
    ///
    /// The returned token keeps the old refresh token unless Google rotated
    /// it, and keeps the old scopes unless the response lists them.
    pub async fn refresh_token(&self, token: &StoredToken) -> AuthResult<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::new(AuthErrorCode::RefreshFailed, "no refresh token"))?;

        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let (status, body) = self.post_token(&params, "token refresh").await?;
        if !status.is_success() {
            return Err(token_endpoint_error(
                status,
                &body,
                AuthErrorCode::RefreshFailed,
            ));
        }

        let response = parse_token_response(&body)?;
        let scopes = response.granted_scopes().unwrap_or_else(|| token.scopes.clone());
        let refresh = response
            .refresh_token
            .clone()
            .or_else(|| token.refresh_token.clone());

        debug!(rotated = response.refresh_token.is_some(), "refreshed access token");
        Ok(response.into_token(refresh, scopes))
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> AuthResult<StoredToken> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let (status, body) = self.post_token(&params, "token exchange").await?;
        if !status.is_success() {
            return Err(token_endpoint_error(
                status,
                &body,
                AuthErrorCode::AuthorizationFailed,
            ));
        }

        let response = parse_token_response(&body)?;
        if response.refresh_token.is_none() {
            warn!("token response carried no refresh token");
        }
        let granted = response.granted_scopes().unwrap_or_else(|| scopes.to_vec());
        let refresh = response.refresh_token.clone();
        Ok(response.into_token(refresh, granted))
    }

    async fn post_token(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> AuthResult<(StatusCode, String)> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                AuthError::network(format!("{} request failed: {}", what, e)).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network(format!("failed to read {} response: {}", what, e)).with_source(e)
        })?;
        Ok((status, body))
    }

    async fn fetch_email(&self, access_token: &str) -> AuthResult<String> {
        let response = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                AuthError::network(format!("userinfo request failed: {}", e)).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network(format!("failed to read userinfo response: {}", e)).with_source(e)
        })?;

        if !status.is_success() {
            return Err(AuthError::invalid_response(format!(
                "userinfo request failed ({})",
                status
            )));
        }

        parse_userinfo_email(&body)
    }
}

impl AuthorizationFlow for OAuthClient {
    fn authorize<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, AuthResult<Authorization>> {
        Box::pin(OAuthClient::authorize(self, scopes))
    }
}

impl TokenRefresher for OAuthClient {
    fn refresh<'a>(&'a self, token: &'a StoredToken) -> BoxFuture<'a, AuthResult<StoredToken>> {
        Box::pin(self.refresh_token(token))
    }
}

/// Binds a listener on the first free port in the inclusive range.
async fn bind_loopback_server(port_range: (u16, u16)) -> AuthResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                debug!(port, "bound loopback server");
                return Ok((listener, port));
            }
            Err(e) => debug!(port, error = %e, "loopback port unavailable"),
        }
    }
    Err(AuthError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Accepts connections until one carries the OAuth redirect, then returns
/// its authorization code.
///
/// Each connection is served on its own task, so a browser's idle
/// preconnect cannot hold up the redirect behind it. Dropping the future
/// aborts the tasks still running.
async fn wait_for_callback(listener: TcpListener, expected_state: &str) -> AuthResult<String> {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| {
                    AuthError::internal(format!("failed to accept connection: {}", e))
                        .with_source(e)
                })?;
                debug!(peer = %peer, "callback connection");
                connections.spawn(handle_connection(stream));
            }
            Some(handled) = connections.join_next(), if !connections.is_empty() => {
                if let Ok(Some(params)) = handled {
                    return params.into_code(expected_state);
                }
            }
        }
    }
}

/// Reads one request line, answers it, and returns the callback parameters
/// if it was the redirect. Silent or oversized requests are dropped.
async fn handle_connection<S>(stream: S) -> Option<CallbackParams>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream.take(MAX_REQUEST_LINE));
    let mut request_line = String::new();
    match tokio::time::timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut request_line)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            debug!(error = %e, "failed to read callback request");
            return None;
        }
        Err(_) => {
            debug!("callback connection sent no request line");
            return None;
        }
    }

    let params = if request_line.ends_with('\n') {
        parse_callback_request(&request_line)
    } else {
        debug!(bytes = request_line.len(), "callback request line truncated");
        None
    };
    let page = match &params {
        None => NOT_FOUND_PAGE,
        Some(p) if p.code.is_some() && p.error.is_none() => SUCCESS_PAGE,
        Some(_) => FAILURE_PAGE,
    };

    let stream = reader.get_mut().get_mut();
    if let Err(e) = stream.write_all(page.as_bytes()).await {
        debug!(error = %e, "failed to answer callback request");
    }
    let _ = stream.shutdown().await;

    params
}

/// Query parameters of the OAuth redirect.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    fn into_code(self, expected_state: &str) -> AuthResult<String> {
        if let Some(error) = self.error {
            return Err(AuthError::authorization(format!(
                "authorization denied: {}",
                error
            )));
        }

        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::authorization(
                "OAuth state mismatch, the callback did not come from this login attempt",
            ));
        }

        self.code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::authorization("missing authorization code in callback"))
    }
}

/// Parses an HTTP request line such as
/// `GET /callback?code=...&state=... HTTP/1.1`.
///
/// Returns `None` for anything that is not a GET on the callback path.
pub(crate) fn parse_callback_request(request_line: &str) -> Option<CallbackParams> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }

    let target = Url::parse(&format!("http://127.0.0.1{}", parts.next()?)).ok()?;
    if target.path() != CALLBACK_PATH {
        return None;
    }

    let mut params = CallbackParams::default();
    for (key, value) in target.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(params)
}

/// Maps a non-success token endpoint response to an error.
///
/// Server errors are transient (`Network`); client errors carry `code`.
fn token_endpoint_error(status: StatusCode, body: &str, code: AuthErrorCode) -> AuthError {
    let detail = serde_json::from_str::<TokenErrorResponse>(body)
        .map(|e| match e.error_description {
            Some(description) => format!("{}: {}", e.error, description),
            None => e.error,
        })
        .unwrap_or_else(|_| format!("HTTP {}", status));

    if status.is_server_error() {
        return AuthError::network(format!("token endpoint unavailable ({}): {}", status, detail));
    }
    AuthError::new(code, detail)
}

fn parse_token_response(body: &str) -> AuthResult<TokenResponse> {
    serde_json::from_str(body).map_err(|e| {
        AuthError::invalid_response(format!("invalid token response: {}", e)).with_source(e)
    })
}

fn parse_userinfo_email(body: &str) -> AuthResult<String> {
    let info: UserInfo = serde_json::from_str(body).map_err(|e| {
        AuthError::invalid_response(format!("invalid userinfo response: {}", e)).with_source(e)
    })?;
    info.email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AuthError::invalid_response("userinfo response has no email"))
}

/// One authorization attempt's PKCE verifier, its S256 challenge, and the
/// `state` echoed back on the redirect.
#[derive(Debug)]
pub struct PkceSession {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceSession {
    pub fn generate() -> Self {
        let verifier = random_token::<VERIFIER_BYTES>();
        Self {
            challenge: s256_challenge(&verifier),
            verifier,
            state: random_token::<STATE_BYTES>(),
        }
    }

    /// Google consent page URL for this session.
    ///
    /// `access_type=offline` with `prompt=consent` makes Google issue a refresh
    /// token even when the account already granted these scopes.
    pub fn consent_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> AuthResult<Url> {
        let scope = scopes.join(" ");
        Url::parse_with_params(
            GOOGLE_AUTH_URL,
            [
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("code_challenge", self.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", self.state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AuthError::internal("cannot build consent URL").with_source(e))
    }
}

fn random_token<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn granted_scopes(&self) -> Option<Vec<String>> {
        let scopes: Vec<String> = self
            .scope
            .as_deref()?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        (!scopes.is_empty()).then_some(scopes)
    }

    fn into_token(self, refresh_token: Option<String>, scopes: Vec<String>) -> StoredToken {
        let token = StoredToken::new(self.access_token, refresh_token, self.expires_in, scopes);
        match self.token_type {
            Some(token_type) => token.with_token_type(token_type),
            None => token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
}
