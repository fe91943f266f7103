//! Instagram messaging webhook payloads.
//!
//! Only the fields the relay looks at are modelled; everything else in a delivery is ignored.
//! See: <https://developers.facebook.com/docs/instagram-platform/webhooks>

use crate::error::Rejection;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Attachment type Instagram uses for a shared Reel.
pub const REEL_ATTACHMENT: &str = "ig_reel";

const UNTITLED: &str = "Untitled Reel";

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("hashtag pattern is valid"));

/// First attachment of a message, decoded only once the sender is known to be an admin.
#[derive(Debug, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub payload: Option<ReelPayload>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReelPayload {
    pub reel_video_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// A shared Reel that is complete enough to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reel {
    pub reel_video_id: String,
    pub title: String,
    pub url: String,
}

impl Reel {
    /// Local file name the Reel is downloaded to.
    pub fn file_name(&self) -> String {
        format!("{}.mp4", self.reel_video_id)
    }
}

/// The part of a webhook delivery the relay acts on: the first messaging item of the first
/// entry, reduced to its sender and its first attachment.
///
/// Nothing but the sender id is interpreted up front, so a delivery from a stranger is refused
/// as unauthorized however its attachment is shaped.
#[derive(Debug)]
pub struct InboundEvent {
    pub sender_id: Option<String>,
    attachment: Option<serde_json::Value>,
}

impl InboundEvent {
    pub fn parse(body: &[u8]) -> Result<Self, Rejection> {
        let payload: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!(error = %e, "webhook body is not JSON");
            Rejection::InvalidRequest
        })?;
        Ok(Self::from_payload(&payload))
    }

    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let messaging = payload.pointer("/entry/0/messaging/0");
        Self {
            sender_id: messaging
                .and_then(|m| m.pointer("/sender/id"))
                .and_then(|id| id.as_str())
                .map(String::from),
            attachment: messaging
                .and_then(|m| m.pointer("/message/attachments/0"))
                .cloned(),
        }
    }

    /// Returns the sender if they are on the allow-list.
    pub fn authorized_sender(&self, admins: &[String]) -> Result<&str, Rejection> {
        match self.sender_id.as_deref() {
            Some(sender) if !sender.is_empty() && admins.iter().any(|a| a == sender) => Ok(sender),
            _ => Err(Rejection::Unauthorized),
        }
    }

    /// Returns the attached Reel, if the first attachment is one that can be relayed.
    pub fn reel(&self) -> Result<Reel, Rejection> {
        let Some(attachment) = &self.attachment else {
            return Err(Rejection::InvalidRequest);
        };
        let attachment = Attachment::deserialize(attachment).map_err(|e| {
            tracing::debug!(error = %e, "attachment is not a shared reel");
            Rejection::InvalidRequest
        })?;
        if attachment.kind != REEL_ATTACHMENT {
            return Err(Rejection::InvalidRequest);
        }
        let Some(payload) = &attachment.payload else {
            return Err(Rejection::InvalidRequest);
        };
        let (Some(reel_video_id), Some(url)) = (&payload.reel_video_id, &payload.url) else {
            return Err(Rejection::InvalidRequest);
        };
        if url.is_empty() || !is_file_name_token(reel_video_id) {
            return Err(Rejection::InvalidRequest);
        }
        Ok(Reel {
            reel_video_id: reel_video_id.clone(),
            title: payload.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
            url: url.clone(),
        })
    }
}

/// Reel ids become file names, so they must not carry path syntax.
fn is_file_name_token(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Every `#word` token in `text`, in order of appearance.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    HASHTAG
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Upload tags for a Reel title: `"reel"` followed by the title's hashtags.
pub fn reel_tags(title: &str) -> Vec<String> {
    std::iter::once("reel".to_string())
        .chain(extract_hashtags(title))
        .collect()
}
