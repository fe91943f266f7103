//! Replies to the Reel sender through the Instagram messaging API.

use crate::config::InstagramConfig;
use crate::error::Error;
use eyre::Context;
use serde::Serialize;
use tracing::instrument;

/// Graph API version of the send endpoint.
const GRAPH_API_VERSION: &str = "v22.0";

/// Text of the acknowledgement sent once the local copy is gone.
pub const DELETING_REEL: &str = "deleting reel";

/// Text sent when the Reel could not be downloaded.
pub const DOWNLOAD_FAILED: &str = "error downloading reel";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Points the sender at their freshly uploaded video.
    pub fn uploaded(video_id: &str) -> Self {
        Self::text(format!(
            "Uploaded video: {}",
            crate::youtube_api::videos::watch_url(video_id)
        ))
    }
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    recipient: Recipient<'a>,
    message: &'a OutgoingMessage,
}

/// Sends direct messages on behalf of the relay's Instagram account.
#[derive(Debug, Clone)]
pub struct Messenger {
    client: reqwest::Client,
    config: InstagramConfig,
}

impl Messenger {
    pub fn new(client: reqwest::Client, config: InstagramConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{GRAPH_API_VERSION}/{}/messages",
            self.config.base_url.trim_end_matches('/'),
            self.config.user_id
        )
    }

    /// Sends `message` to `recipient_id` and returns the API's JSON answer.
    #[instrument(skip(self), ret, level = tracing::Level::DEBUG)]
    pub async fn notify(
        &self,
        recipient_id: &str,
        message: &OutgoingMessage,
    ) -> Result<serde_json::Value, Error> {
        self.send(recipient_id, message).await.map_err(Error::Notify)
    }

    async fn send(
        &self,
        recipient_id: &str,
        message: &OutgoingMessage,
    ) -> eyre::Result<serde_json::Value> {
        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.access_token.secret()),
            )
            .json(&SendRequest {
                recipient: Recipient { id: recipient_id },
                message,
            })
            .send()
            .await
            .context("send messages request to Instagram")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            eyre::bail!("Instagram send API failed with status {status}: {error_text}");
        }

        response
            .json()
            .await
            .context("parse Instagram send response as JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiToken;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn messenger(server: &MockServer) -> Messenger {
        Messenger::new(
            reqwest::Client::new(),
            InstagramConfig {
                base_url: format!("{}/", server.uri()),
                user_id: "1784".to_string(),
                access_token: ApiToken::new("IGAAtoken"),
            },
        )
    }

    #[test]
    fn upload_message_links_watch_page() {
        assert_eq!(
            OutgoingMessage::uploaded("vid42").text,
            "Uploaded video: https://www.youtube.com/watch?v=vid42"
        );
    }

    #[tokio::test]
    async fn posts_recipient_and_message_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v22.0/1784/messages"))
            .and(header("Authorization", "Bearer IGAAtoken"))
            .and(body_json(json!({
                "recipient": {"id": "admin1"},
                "message": {"text": "deleting reel"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "recipient_id": "admin1",
                "message_id": "m_1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = messenger(&server)
            .notify("admin1", &OutgoingMessage::text(DELETING_REEL))
            .await
            .unwrap();
        assert_eq!(answer["message_id"], "m_1");
    }

    #[tokio::test]
    async fn rejected_send_is_a_notify_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = messenger(&server)
            .notify("admin1", &OutgoingMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Notify(_)), "{err}");
        assert!(err.to_string().contains("invalid token"), "{err}");
    }
}
