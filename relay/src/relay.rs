//! Per-delivery orchestration: fetch → publish → cleanup → notify.

use crate::config::Config;
use crate::credentials::CredentialManager;
use crate::error::{Error, Rejection};
use crate::fetch::MediaFetcher;
use crate::notify::{DELETING_REEL, DOWNLOAD_FAILED, Messenger, OutgoingMessage};
use crate::webhook::{InboundEvent, Reel, reel_tags};
use crate::youtube_api::{VideoMetadata, YouTubeClient};
use eyre::Context;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Description given to every uploaded Reel.
pub const DESCRIPTION: &str = "nothing...";

/// Body of a successful relay.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Relayed {
    pub status: &'static str,
    pub video_id: String,
}

/// Reel ids currently being relayed; at most one job per id at a time.
#[derive(Debug, Default)]
pub struct InFlight {
    ids: Mutex<HashSet<String>>,
}

impl InFlight {
    /// Claims `id`, or returns `None` if another request holds it.
    pub fn claim(self: &Arc<Self>, id: &str) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !ids.insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(self),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(id)
    }
}

/// Releases its Reel id when dropped, whichever way the request ended.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlight>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

/// Everything needed to turn a webhook delivery into a YouTube upload.
#[derive(Debug)]
pub struct Relay {
    config: Config,
    fetcher: MediaFetcher,
    youtube: YouTubeClient,
    messenger: Messenger,
    in_flight: Arc<InFlight>,
}

impl Relay {
    pub fn new(config: Config) -> eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("build HTTP client")?;
        // YouTube acknowledges partial uploads with 308, which must not be followed.
        let upload_http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build YouTube HTTP client")?;

        let credentials = Arc::new(CredentialManager::new(
            config.youtube.token_path.clone(),
            config.youtube.client_secret_path.clone(),
            config.youtube.oauth_redirect_port,
        ));
        let youtube = YouTubeClient::new(
            credentials,
            upload_http,
            config.youtube.upload_url.clone(),
            config.youtube.default_category_id.clone(),
            config.youtube.upload_chunk_size,
        );

        Ok(Self {
            fetcher: MediaFetcher::new(http.clone()),
            messenger: Messenger::new(http, config.instagram.clone()),
            youtube,
            in_flight: Arc::default(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handles one `POST /webhook` body.
    ///
    /// Only the first messaging item and its first attachment are looked at. Nothing outside
    /// the in-flight set is touched unless the sender is an admin and the attachment is a
    /// complete Reel.
    pub async fn handle_delivery(&self, body: &[u8]) -> Result<Relayed, Error> {
        let event = InboundEvent::parse(body)?;
        let sender = event.authorized_sender(&self.config.admins).map_err(|r| {
            tracing::warn!(sender = ?event.sender_id, "rejecting delivery from unknown sender");
            r
        })?;
        let reel = event.reel()?;

        let Some(_guard) = self.in_flight.claim(&reel.reel_video_id) else {
            tracing::warn!(reel_id = reel.reel_video_id, "reel already in flight");
            return Err(Rejection::Duplicate.into());
        };

        self.relay(sender, &reel).await
    }

    #[instrument(skip(self, reel), fields(reel_id = %reel.reel_video_id))]
    async fn relay(&self, sender: &str, reel: &Reel) -> Result<Relayed, Error> {
        let path = local_path(&self.config.download_dir, reel);

        if let Err(e) = self.fetcher.fetch(&reel.url, &path).await {
            remove_local_copy(&path).await;
            if let Err(notify_error) = self
                .messenger
                .notify(sender, &OutgoingMessage::text(DOWNLOAD_FAILED))
                .await
            {
                tracing::warn!(
                    error = %notify_error,
                    "could not tell sender about failed download"
                );
            }
            return Err(e);
        }

        let metadata = VideoMetadata {
            title: reel.title.clone(),
            description: DESCRIPTION.to_string(),
            tags: reel_tags(&reel.title),
            category_id: self.pick_category(),
            privacy_status: self.config.youtube.privacy_status,
        };
        let published = self.youtube.upload_video(&path, &metadata).await;
        remove_local_copy(&path).await;
        let video_id = published?;

        self.messenger
            .notify(sender, &OutgoingMessage::uploaded(&video_id))
            .await?;
        self.messenger
            .notify(sender, &OutgoingMessage::text(DELETING_REEL))
            .await?;

        Ok(Relayed {
            status: "success",
            video_id,
        })
    }

    /// A category chosen uniformly from the configured candidates.
    fn pick_category(&self) -> Option<String> {
        self.config
            .category_ids
            .choose(&mut rand::thread_rng())
            .cloned()
    }
}

async fn remove_local_copy(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "deleted local copy"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no local copy to delete");
        }
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not delete local copy"),
    }
}

/// Local path a Reel is downloaded to.
pub fn local_path(download_dir: &Path, reel: &Reel) -> PathBuf {
    download_dir.join(reel.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_ids_are_exclusive_until_released() {
        let in_flight = Arc::new(InFlight::default());
        let guard = in_flight.claim("abc123").unwrap();
        assert!(in_flight.contains("abc123"));
        assert!(in_flight.claim("abc123").is_none());
        assert!(in_flight.claim("other").is_some());

        drop(guard);
        assert!(!in_flight.contains("abc123"));
        assert!(in_flight.claim("abc123").is_some());
    }

    #[test]
    fn success_body_shape() {
        let body = serde_json::to_value(Relayed {
            status: "success",
            video_id: "vid42".into(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": "success", "video_id": "vid42"})
        );
    }
}
