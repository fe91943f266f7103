//! Core YouTube API client functionality: authenticated requests and resumable uploads.

use crate::credentials::CredentialManager;
use crate::error::Error;
use crate::youtube_api::videos::{
    PrivacyStatus, Video, VideoInsertRequest, VideoSnippet, VideoStatus,
};
use eyre::{Context, OptionExt};
use http::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use http::{Method, StatusCode};
use serde::Serialize;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

/// YouTube rejects longer titles outright.
pub const MAX_TITLE_CHARS: usize = 100;

/// Status YouTube uses to acknowledge a chunk of an unfinished resumable upload.
const RESUME_INCOMPLETE: StatusCode = StatusCode::PERMANENT_REDIRECT;

/// Consecutive chunk answers without progress before the upload is abandoned.
const MAX_STALLED_CHUNKS: u32 = 5;

/// Everything about a new video except its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Falls back to the client's default category when `None`.
    pub category_id: Option<String>,
    pub privacy_status: PrivacyStatus,
}

/// Trims a title and cuts it down to what YouTube accepts.
pub fn video_title(title: &str) -> String {
    title.trim().chars().take(MAX_TITLE_CHARS).collect()
}

/// Client for the upload half of the YouTube Data API v3.
///
/// Every request obtains credentials from the shared [`CredentialManager`], which refreshes
/// or re-authorizes as needed, so the client itself holds no token state.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    credentials: Arc<CredentialManager>,
    /// HTTP client for API requests
    client: reqwest::Client,
    upload_url: String,
    default_category_id: String,
    chunk_size: usize,
}

impl YouTubeClient {
    /// Creates a new YouTube API client.
    ///
    /// # Arguments
    ///
    /// * `credentials` - Shared credential manager consulted before each upload
    /// * `client` - HTTP client; it must not follow redirects, since YouTube answers
    ///   unfinished chunk uploads with `308`
    /// * `upload_url` - The `videos.insert` upload endpoint
    /// * `default_category_id` - Category used when a video does not name one
    /// * `chunk_size` - Bytes per resumable chunk
    pub fn new(
        credentials: Arc<CredentialManager>,
        client: reqwest::Client,
        upload_url: impl Into<String>,
        default_category_id: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            credentials,
            client,
            upload_url: upload_url.into(),
            default_category_id: default_category_id.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Uploads a local video file and returns the id YouTube assigned to it.
    ///
    /// Uses the resumable upload protocol: the metadata is sent first to open an upload
    /// session, then the file body follows in chunks of the configured size.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.upload`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/videos/insert>
    /// <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>
    #[instrument(skip(self, metadata), fields(title = %metadata.title))]
    pub async fn upload_video(
        &self,
        file_path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<String, Error> {
        let access_token = self
            .credentials
            .obtain_credentials()
            .await?
            .access_token()
            .to_string();

        let video = self
            .upload_video_with_token(&access_token, file_path, metadata)
            .await
            .map_err(Error::Upload)?;
        if video.id.is_empty() {
            return Err(Error::Upload(eyre::eyre!(
                "YouTube accepted the upload but returned no video id"
            )));
        }

        tracing::info!(video_id = video.id, "upload successful");
        Ok(video.id)
    }

    async fn upload_video_with_token(
        &self,
        access_token: &str,
        file_path: &Path,
        metadata: &VideoMetadata,
    ) -> eyre::Result<Video> {
        let mut file = tokio::fs::File::open(file_path)
            .await
            .with_context(|| format!("open {}", file_path.display()))?;
        let total = file
            .metadata()
            .await
            .with_context(|| format!("stat {}", file_path.display()))?
            .len();
        if total == 0 {
            eyre::bail!("{} is empty", file_path.display());
        }

        let request = VideoInsertRequest {
            snippet: VideoSnippet {
                title: video_title(&metadata.title),
                description: metadata.description.clone(),
                tags: metadata.tags.clone(),
                category_id: metadata
                    .category_id
                    .clone()
                    .unwrap_or_else(|| self.default_category_id.clone()),
            },
            status: VideoStatus {
                privacy_status: metadata.privacy_status,
                self_declared_made_for_kids: false,
            },
        };
        let session_url = self
            .initiate_resumable_upload(access_token, &request, total)
            .await?;

        let mut offset = 0u64;
        let mut stalled = 0;
        loop {
            let remaining = total - offset;
            let len = remaining.min(self.chunk_size as u64);
            let mut chunk = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset))
                .await
                .context("seek to next chunk")?;
            file.read_exact(&mut chunk)
                .await
                .with_context(|| format!("read {} at offset {offset}", file_path.display()))?;

            let last = offset + len - 1;
            tracing::debug!(offset, last, total, "uploading chunk");
            let response = self
                .client
                .put(&session_url)
                .header("Authorization", format!("Bearer {}", access_token))
                .header(CONTENT_TYPE, "video/*")
                .header(CONTENT_RANGE, format!("bytes {offset}-{last}/{total}"))
                .body(chunk)
                .send()
                .await
                .context("send chunk to YouTube upload session")?;

            let status = response.status();
            if status == RESUME_INCOMPLETE {
                // The Range header says how much YouTube actually persisted; without one it
                // has kept nothing.
                let persisted = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(persisted_upto);
                let next = persisted.unwrap_or(0);
                if next >= total {
                    eyre::bail!("YouTube kept the upload open after receiving all {total} bytes");
                }
                if next <= offset {
                    stalled += 1;
                    if stalled >= MAX_STALLED_CHUNKS {
                        eyre::bail!("YouTube upload made no progress past byte {next} of {total}");
                    }
                    tracing::warn!(
                        persisted = next,
                        sent_from = offset,
                        "chunk not persisted, resending"
                    );
                } else {
                    stalled = 0;
                }
                offset = next;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                eyre::bail!("YouTube upload chunk failed with status {status}: {error_text}");
            }

            return response
                .json()
                .await
                .context("parse YouTube upload response as JSON");
        }
    }

    /// Opens a resumable upload session and returns its URI.
    #[instrument(skip(self, access_token, request), level = tracing::Level::DEBUG)]
    async fn initiate_resumable_upload(
        &self,
        access_token: &str,
        request: &VideoInsertRequest,
        total: u64,
    ) -> eyre::Result<String> {
        let query_params = [("uploadType", "resumable"), ("part", "snippet,status")];
        let response = self
            .make_authenticated_request(
                access_token,
                Method::POST,
                &self.upload_url,
                &query_params,
                Some(request),
                &[
                    ("X-Upload-Content-Type", "video/*".to_string()),
                    ("X-Upload-Content-Length", total.to_string()),
                ],
            )
            .await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_eyre("YouTube did not return an upload session URI")
    }

    /// Makes an authenticated HTTP request to the YouTube API with common error handling.
    ///
    /// # Arguments
    ///
    /// * `access_token` - Bearer token to authorize with
    /// * `method` - The HTTP method to use (GET, POST, etc.)
    /// * `url` - The API endpoint URL
    /// * `query_params` - Query parameters
    /// * `json_body` - Optional JSON body
    /// * `headers` - Extra request headers
    ///
    /// # Returns
    ///
    /// The raw [`reqwest::Response`] for method-specific parsing.
    async fn make_authenticated_request(
        &self,
        access_token: &str,
        method: Method,
        url: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&impl Serialize>,
        headers: &[(&str, String)],
    ) -> eyre::Result<reqwest::Response> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header("Authorization", format!("Bearer {}", access_token))
            .query(query_params);

        for (name, value) in headers {
            request = request.header(*name, value);
        }

        if let Some(body) = json_body {
            request = request
                .header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to YouTube API: {}", method, url))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(eyre::eyre!(
                "YouTube API {} request failed with status {}: {}",
                method,
                status_code,
                error_text
            ));
        }

        Ok(response)
    }
}

/// Parses a resumable-upload `Range: bytes=0-N` header into the next offset to send.
fn persisted_upto(range: &str) -> Option<u64> {
    let (_, last) = range.strip_prefix("bytes=")?.split_once('-')?;
    last.trim().parse::<u64>().ok().map(|last| last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_titles_are_truncated() {
        let title = "x".repeat(150);
        assert_eq!(video_title(&title).chars().count(), 100);
    }

    #[test]
    fn titles_are_trimmed_before_truncation() {
        let title = format!("  {}  ", "é".repeat(120));
        let cut = video_title(&title);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(video_title(" fun #party "), "fun #party");
    }

    #[test]
    fn range_header_parsing() {
        assert_eq!(persisted_upto("bytes=0-262143"), Some(262144));
        assert_eq!(persisted_upto("bytes=0-0"), Some(1));
        assert_eq!(persisted_upto("0-10"), None);
        assert_eq!(persisted_upto("bytes=garbage"), None);
    }
}
