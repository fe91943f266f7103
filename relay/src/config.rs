//! Process-wide configuration, read once from the environment at startup.

use crate::youtube_api::videos::PrivacyStatus;
use eyre::Context;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// YouTube requires every chunk except the last to be a multiple of this many bytes.
pub const UPLOAD_CHUNK_GRANULARITY: usize = 256 * 1024;

const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 32 * UPLOAD_CHUNK_GRANULARITY;

/// A bearer token that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Where replies to the Reel sender are posted.
#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub base_url: String,
    pub user_id: String,
    pub access_token: ApiToken,
}

/// How uploads to YouTube are authorized and shaped.
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub upload_url: String,
    pub token_path: PathBuf,
    pub client_secret_path: PathBuf,
    pub oauth_redirect_port: u16,
    pub default_category_id: String,
    pub privacy_status: PrivacyStatus,
    pub upload_chunk_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub instagram: InstagramConfig,
    pub youtube: YouTubeConfig,
    /// Sender ids allowed to trigger a relay.
    pub admins: Vec<String>,
    /// Category ids to pick from at random for each upload.
    pub category_ids: Vec<String>,
    pub download_dir: PathBuf,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// Call [`dotenvy::dotenv`] first if a `.env` file should be honored.
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> eyre::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| eyre::eyre!("{key} must be set"))
        };

        let listen_addr = var("LISTEN_ADDR", "127.0.0.1:8000")
            .parse()
            .context("parse LISTEN_ADDR")?;
        let oauth_redirect_port = var("OAUTH_REDIRECT_PORT", "5000")
            .parse()
            .context("parse OAUTH_REDIRECT_PORT")?;
        let privacy_status = var("PRIVACY_STATUS", "public")
            .parse()
            .context("parse PRIVACY_STATUS")?;
        let upload_chunk_size = var("UPLOAD_CHUNK_SIZE", &DEFAULT_UPLOAD_CHUNK_SIZE.to_string())
            .parse::<usize>()
            .context("parse UPLOAD_CHUNK_SIZE")?;
        if upload_chunk_size == 0 || upload_chunk_size % UPLOAD_CHUNK_GRANULARITY != 0 {
            eyre::bail!(
                "UPLOAD_CHUNK_SIZE must be a positive multiple of {} bytes, got {}",
                UPLOAD_CHUNK_GRANULARITY,
                upload_chunk_size
            );
        }

        Ok(Self {
            listen_addr,
            instagram: InstagramConfig {
                base_url: var("INSTAGRAM_BASE_URL", "https://graph.instagram.com"),
                user_id: required("INSTAGRAM_USER_ID")?,
                access_token: ApiToken::new(required("INSTAGRAM_ACCESS_TOKEN")?),
            },
            youtube: YouTubeConfig {
                upload_url: var(
                    "YOUTUBE_UPLOAD_URL",
                    "https://www.googleapis.com/upload/youtube/v3/videos",
                ),
                token_path: var("TOKEN_PATH", "token.json").into(),
                client_secret_path: var("CLIENT_SECRET_PATH", "client.json").into(),
                oauth_redirect_port,
                default_category_id: var("DEFAULT_CATEGORY_ID", "22"),
                privacy_status,
                upload_chunk_size,
            },
            admins: split_list(&var("ADMINS", "")),
            category_ids: split_list(&var("DEFAULT_CATEGORY_IDS", "")),
            download_dir: var("DOWNLOAD_DIR", ".").into(),
        })
    }
}

/// Splits a comma-separated list, dropping blank entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
