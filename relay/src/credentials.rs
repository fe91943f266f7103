//! Lifecycle of the YouTube OAuth credentials stored on disk.
//!
//! Every call to [`CredentialManager::obtain_credentials`] re-reads the token file, classifies it
//! into a [`CredentialState`], performs whatever transition that state calls for (nothing,
//! refresh, or interactive login), and writes the result back.

use crate::error::Error;
use crate::oauth::OAuthManager;
use eyre::Context;
use jiff::{SignedDuration, Timestamp};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

/// Subtracted from the reported token lifetime so a token is never used right at its edge.
const EXPIRY_BUFFER: SignedDuration = SignedDuration::from_secs(300);

/// Assumed lifetime when the token endpoint does not report `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// An OAuth2 token together with the instant it stops being usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    token: BasicTokenResponse,
    /// When the access token expires, safety buffer already applied.
    expires_at: Timestamp,
}

impl Credentials {
    /// Wraps a token freshly returned by the token endpoint.
    pub fn issued_at(token: BasicTokenResponse, now: Timestamp) -> Self {
        let lifetime = token.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let lifetime = SignedDuration::try_from(lifetime)
            .unwrap_or(SignedDuration::MAX)
            .checked_sub(EXPIRY_BUFFER)
            .unwrap_or(SignedDuration::ZERO);
        // An unrepresentable expiry is treated as already expired.
        let expires_at = now.checked_add(lifetime).unwrap_or(now);
        Self { token, expires_at }
    }

    pub fn access_token(&self) -> &str {
        self.token.access_token().secret()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.token.refresh_token().is_some()
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn raw_token(&self) -> &BasicTokenResponse {
        &self.token
    }

    /// Folds a refreshed token into these credentials.
    ///
    /// Google usually omits the refresh token from refresh responses, in which case the
    /// original one is kept.
    fn refreshed(self, mut new_token: BasicTokenResponse, now: Timestamp) -> Self {
        if new_token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            new_token.set_refresh_token(self.token.refresh_token().cloned());
        } else {
            tracing::debug!("new token includes refresh token");
        }
        Self::issued_at(new_token, now)
    }
}

/// What the stored credentials allow us to do without user interaction.
#[derive(Debug)]
pub enum CredentialState {
    /// Nothing usable is stored.
    Absent,
    /// Stored and not yet expired.
    Valid(Credentials),
    /// Expired, but a refresh token is available.
    ExpiredRefreshable(Credentials),
    /// Expired with no way to refresh.
    ExpiredUnrefreshable,
}

impl CredentialState {
    pub fn classify(stored: Option<Credentials>, now: Timestamp) -> Self {
        match stored {
            None => CredentialState::Absent,
            Some(c) if !c.is_expired(now) => CredentialState::Valid(c),
            Some(c) if c.has_refresh_token() => CredentialState::ExpiredRefreshable(c),
            Some(_) => CredentialState::ExpiredUnrefreshable,
        }
    }
}

/// Loads, refreshes, and persists the relay's YouTube credentials.
///
/// Callers only ever see [`Self::obtain_credentials`]. Concurrent calls within the process are
/// serialized so that two uploads never race to refresh the same token.
#[derive(Debug)]
pub struct CredentialManager {
    token_path: PathBuf,
    client_secret_path: PathBuf,
    redirect_port: u16,
    lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(token_path: PathBuf, client_secret_path: PathBuf, redirect_port: u16) -> Self {
        Self {
            token_path,
            client_secret_path,
            redirect_port,
            lock: Mutex::new(()),
        }
    }

    /// Returns credentials that are valid right now.
    ///
    /// Falls back to the interactive OAuth flow when nothing is stored, when the stored token
    /// cannot be refreshed, or when refreshing it fails. The result is always written back to
    /// the token file.
    #[instrument(skip(self), fields(token_path = %self.token_path.display()))]
    pub async fn obtain_credentials(&self) -> Result<Credentials, Error> {
        let _guard = self.lock.lock().await;
        let stored = self.load().await;

        let credentials = match CredentialState::classify(stored, Timestamp::now()) {
            CredentialState::Valid(credentials) => credentials,
            CredentialState::ExpiredRefreshable(credentials) => {
                match self.refresh(&credentials).await {
                    Ok(Some(new_token)) => {
                        tracing::info!("token refreshed successfully");
                        credentials.refreshed(new_token, Timestamp::now())
                    }
                    Ok(None) => {
                        tracing::warn!("stored token can no longer be refreshed");
                        self.login().await?
                    }
                    Err(e) => {
                        tracing::warn!(error = %format!("{e:#}"), "token refresh failed");
                        self.login().await?
                    }
                }
            }
            CredentialState::Absent | CredentialState::ExpiredUnrefreshable => {
                self.login().await?
            }
        };

        self.persist(&credentials).await.map_err(Error::Auth)?;
        tracing::debug!(expires_at = %credentials.expires_at(), "credentials ready");
        Ok(credentials)
    }

    /// Reads the token file; anything unreadable counts as absent.
    async fn load(&self) -> Option<Credentials> {
        let raw = match tokio::fs::read_to_string(&self.token_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no stored credentials");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored credentials");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed stored credentials");
                None
            }
        }
    }

    async fn persist(&self, credentials: &Credentials) -> eyre::Result<()> {
        let json = serde_json::to_string(credentials).context("serialize credentials")?;
        tokio::fs::write(&self.token_path, json)
            .await
            .with_context(|| format!("write token file {}", self.token_path.display()))
    }

    async fn oauth_manager(&self) -> eyre::Result<OAuthManager> {
        OAuthManager::from_client_secret_file(&self.client_secret_path, self.redirect_port).await
    }

    async fn refresh(&self, credentials: &Credentials) -> eyre::Result<Option<BasicTokenResponse>> {
        self.oauth_manager()
            .await?
            .refresh_token(credentials.raw_token())
            .await
    }

    async fn login(&self) -> Result<Credentials, Error> {
        tracing::info!("no usable YouTube credentials, starting interactive login");
        let token = async { self.oauth_manager().await?.authenticate().await }
            .await
            .context("authorize relay to YouTube")
            .map_err(Error::Auth)?;
        Ok(Credentials::issued_at(token, Timestamp::now()))
    }
}
