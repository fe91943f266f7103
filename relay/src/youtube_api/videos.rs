//! YouTube Videos API types used by `videos.insert`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Request body for the `videos.insert` API call.
///
/// Only the `snippet` and `status` parts are sent, so the upload must be initiated with
/// `part=snippet,status`.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoInsertRequest {
    pub snippet: VideoSnippet,
    pub status: VideoStatus,
}

/// The snippet object contains basic details about the video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#snippet>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSnippet {
    /// The video's title.
    ///
    /// YouTube rejects titles longer than 100 characters.
    pub title: String,
    pub description: String,
    /// Keyword tags associated with the video.
    pub tags: Vec<String>,
    /// The YouTube video category associated with the video.
    #[serde(rename = "categoryId")]
    pub category_id: String,
}

/// The status object contains information about the video's uploading, processing, and privacy
/// statuses.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStatus {
    #[serde(rename = "privacyStatus")]
    pub privacy_status: PrivacyStatus,
    /// Whether the uploader designates the video as made for kids.
    #[serde(rename = "selfDeclaredMadeForKids")]
    pub self_declared_made_for_kids: bool,
}

/// Who may watch an uploaded video.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PrivacyStatus {
    #[default]
    Public,
    Unlisted,
    Private,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown privacy status {0:?}, expected public, unlisted, or private")]
pub struct UnknownPrivacyStatus(String);

impl FromStr for PrivacyStatus {
    type Err = UnknownPrivacyStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(PrivacyStatus::Public),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            "private" => Ok(PrivacyStatus::Private),
            _ => Err(UnknownPrivacyStatus(s.to_string())),
        }
    }
}

/// A `video` resource as returned by a completed upload.
///
/// This is a subset of the full resource, containing only the fields needed here.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct Video {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
}

/// Public watch page for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
