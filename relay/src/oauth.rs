//! OAuth 2.0 management for YouTube API authentication.
//!
//! This module encapsulates the two OAuth operations the relay needs: the interactive
//! authorization-code flow that yields a brand new token, and the refresh-token exchange that
//! extends an existing one. Client identity comes from the Google "client secret" JSON file
//! downloaded from the Cloud console.

use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenUrl,
};
use oauth2::{TokenResponse, reqwest};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The only scope the relay ever asks for.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

const OAUTH_DONE_HTML: &str = "<!DOCTYPE html>\
<html><head><title>reel-relay</title></head>\
<body><p>YouTube access granted. You can close this tab.</p></body></html>";

/// The subset of Google's client secret file that identifies the application.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretEntry>,
    web: Option<ClientSecretEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretEntry {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Manages OAuth 2.0 authentication flows for YouTube API access.
///
/// Holds the OAuth client configuration and the fixed local port on which the authorization
/// callback is received. A fresh OAuth client is assembled for every operation, since each
/// flow needs a different subset of endpoints.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    redirect_port: u16,
}

impl OAuthManager {
    /// Loads client credentials from a Google client secret file.
    ///
    /// Both the `installed` (desktop) and `web` application shapes are accepted.
    pub async fn from_client_secret_file(path: &Path, redirect_port: u16) -> eyre::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read OAuth client secret file {}", path.display()))?;
        Self::from_client_secret_json(&raw, redirect_port)
    }

    fn from_client_secret_json(raw: &str, redirect_port: u16) -> eyre::Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(raw).context("parse OAuth client secret file")?;
        let Some(entry) = file.installed.or(file.web) else {
            eyre::bail!("client secret file has neither an 'installed' nor a 'web' section");
        };
        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
            auth_uri: entry.auth_uri,
            token_uri: entry.token_uri,
            redirect_port,
        })
    }

    /// Performs a complete OAuth 2.0 authorization flow to obtain a new access token.
    ///
    /// This method initiates the full OAuth flow, including:
    /// 1. Logging the authorization URL and trying to open it in the user's browser
    /// 2. Listening on the fixed redirect port for the authorization callback
    /// 3. Exchanging the authorization code for an access token
    ///
    /// Offline access is requested so that Google issues a refresh token.
    pub async fn authenticate(&self) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = self
            .setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let auth_url = AuthUrl::new(self.auth_uri.clone()).context("parse authorization URI")?;
        let token_url = TokenUrl::new(self.token_uri.clone()).context("parse token URI")?;
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scope(Scope::new(UPLOAD_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            tracing::warn!(error = %e, "could not open a browser, follow the logged URL manually");
        }
        let authorization_code = eventually_authorization_code
            .await
            .context("await user authorization code")?;

        let token_result = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client()?)
            .await
            .context("exchange authorization code with access token")?;

        Ok(token_result)
    }

    /// Attempts to refresh an existing OAuth token using its refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new_token))` - Refresh succeeded, new token is available
    /// * `Ok(None)` - No refresh token, or the grant was rejected as invalid
    /// * `Err(_)` - Network or other error occurred during refresh attempt
    ///
    /// The returned token may lack a refresh token; callers keep the old one in that case.
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        // No redirect URL needed for a refresh.
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_token_uri(TokenUrl::new(self.token_uri.clone()).context("parse token URI")?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&http_client()?)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Sets up a local HTTP server to receive the OAuth authorization callback.
    ///
    /// The server listens on the configured fixed port, accepts a single connection, validates
    /// the CSRF state, and extracts the authorization code from the callback query.
    ///
    /// # Returns
    ///
    /// A tuple containing:
    /// - The redirect URL to use in the OAuth flow
    /// - A future that resolves to the authorization code when the callback is received
    async fn setup_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<AuthorizationCode>>,
    )> {
        let socket = tokio::net::TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .with_context(|| format!("bind OAuth callback port {}", self.redirect_port))?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let csrf = csrf.clone();
                    let got = got.clone();
                    async move {
                        let mut presented_state = None;
                        let mut presented_code = None;
                        for (k, v) in
                            form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                        {
                            match &*k {
                                "state" => presented_state = Some(v),
                                "code" => presented_code = Some(v),
                                _ => {}
                            }
                        }
                        if presented_state.as_deref() != Some(csrf.secret().as_str()) {
                            return Err("invalid csrf token");
                        }
                        let Some(code) = presented_code else {
                            return Err("no authorization code found");
                        };
                        let code = AuthorizationCode::new(code.into_owned());
                        got.send(code)
                            .await
                            .map_err(|_| "authorization code receiver went away")?;
                        Ok(Response::new(Full::<Bytes>::from(OAUTH_DONE_HTML)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    code = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        // let the success page reach the browser
                        if let Err(e) = serve.await {
                            tracing::debug!(error = %e, "OAuth callback connection ended badly");
                        }
                        code.ok_or_else(|| eyre::eyre!("callback handler dropped without a code"))
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}

/// HTTP client for token endpoints.
fn http_client() -> eyre::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        // SSRF no thank you.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("build OAuth HTTP client")
}
