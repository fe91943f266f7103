//! Relays Reels shared with an Instagram account to a YouTube channel.
//!
//! An admin shares a Reel in a direct message; Instagram delivers a webhook; the relay downloads
//! the video, uploads it to YouTube, deletes the local copy, and replies with the watch link.

pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod oauth;
pub mod relay;
pub mod server;
pub mod webhook;
pub mod youtube_api;

pub use config::Config;
pub use error::{Error, Rejection};
pub use relay::Relay;
