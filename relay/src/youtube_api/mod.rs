//! YouTube Data API v3 client, limited to what publishing a video needs.
//!
//! # Resumable uploads
//!
//! Videos are uploaded with the resumable protocol, in two phases:
//!
//! 1. `POST` the [`videos::VideoInsertRequest`] metadata with `uploadType=resumable`. YouTube
//!    answers with a session URI in the `Location` header.
//! 2. `PUT` the file body to that URI in chunks, each labelled with a `Content-Range`. Every
//!    chunk but the last is acknowledged with `308 Resume Incomplete` and a `Range` header
//!    naming the bytes persisted so far; the last one returns the new [`videos::Video`].
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use reel_relay::credentials::CredentialManager;
//! use reel_relay::youtube_api::{VideoMetadata, YouTubeClient};
//! use reel_relay::youtube_api::videos::PrivacyStatus;
//! use std::sync::Arc;
//!
//! # async fn example() -> eyre::Result<()> {
//! let credentials = Arc::new(CredentialManager::new(
//!     "token.json".into(),
//!     "client.json".into(),
//!     5000,
//! ));
//! let http = reqwest::Client::builder()
//!     .redirect(reqwest::redirect::Policy::none())
//!     .build()?;
//! let yt = YouTubeClient::new(
//!     credentials,
//!     http,
//!     "https://www.googleapis.com/upload/youtube/v3/videos",
//!     "22",
//!     8 * 1024 * 1024,
//! );
//! let metadata = VideoMetadata {
//!     title: "fun #party".into(),
//!     description: "nothing...".into(),
//!     tags: vec!["reel".into(), "#party".into()],
//!     category_id: None,
//!     privacy_status: PrivacyStatus::Public,
//! };
//! let id = yt.upload_video("abc123.mp4".as_ref(), &metadata).await?;
//! println!("https://www.youtube.com/watch?v={id}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod videos;

pub use client::{VideoMetadata, YouTubeClient, video_title};
pub use videos::{PrivacyStatus, Video};
