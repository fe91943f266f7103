use jiff::Timestamp;
use oauth2::basic::BasicTokenType;
use oauth2::{AccessToken, EmptyExtraTokenFields, StandardTokenResponse};
use pretty_assertions::assert_eq;
use reel_relay::Error;
use reel_relay::credentials::{CredentialManager, Credentials};
use reel_relay::youtube_api::{PrivacyStatus, VideoMetadata, YouTubeClient};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTENT: &[u8] = b"0123456789";

fn write_token(dir: &TempDir) -> PathBuf {
    let mut token = StandardTokenResponse::new(
        AccessToken::new("ya29.upload".to_string()),
        BasicTokenType::Bearer,
        EmptyExtraTokenFields {},
    );
    token.set_expires_in(Some(&Duration::from_secs(3600)));
    let token_path = dir.path().join("token.json");
    std::fs::write(
        &token_path,
        serde_json::to_string(&Credentials::issued_at(token, Timestamp::now())).unwrap(),
    )
    .unwrap();
    token_path
}

fn client(
    dir: &TempDir,
    token_path: PathBuf,
    server: &MockServer,
    chunk_size: usize,
) -> YouTubeClient {
    let credentials = Arc::new(CredentialManager::new(
        token_path,
        dir.path().join("client.json"),
        0,
    ));
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    YouTubeClient::new(
        credentials,
        http,
        format!("{}/upload/youtube/v3/videos", server.uri()),
        "22",
        chunk_size,
    )
}

fn metadata() -> VideoMetadata {
    VideoMetadata {
        title: "fun #party".to_string(),
        description: "nothing...".to_string(),
        tags: vec!["reel".to_string(), "#party".to_string()],
        category_id: None,
        privacy_status: PrivacyStatus::Public,
    }
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .and(header("X-Upload-Content-Length", "10"))
        .and(header("X-Upload-Content-Type", "video/*"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!("{}/session/abc", server.uri()).as_str(),
        ))
        .expect(1)
        .mount(server)
        .await;
}

fn chunk(range: &str, body: &[u8], response: ResponseTemplate) -> Mock {
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("Authorization", "Bearer ya29.upload"))
        .and(header("Content-Range", range))
        .and(body_bytes(body.to_vec()))
        .respond_with(response)
        .expect(1)
}

/// `Content-Range` of every chunk sent to the upload session, in order.
async fn put_ranges(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/session/abc")
        .map(|r| r.headers["content-range"].to_str().unwrap().to_string())
        .collect()
}

fn incomplete(persisted: &str) -> ResponseTemplate {
    ResponseTemplate::new(308).insert_header("Range", persisted)
}

#[tokio::test]
async fn uploads_in_chunks_until_complete() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc123.mp4");
    std::fs::write(&file, CONTENT).unwrap();
    let server = MockServer::start().await;
    mount_session(&server).await;

    chunk("bytes 0-3/10", b"0123", incomplete("bytes=0-3"))
        .mount(&server)
        .await;
    chunk("bytes 4-7/10", b"4567", incomplete("bytes=0-7"))
        .mount(&server)
        .await;
    chunk(
        "bytes 8-9/10",
        b"89",
        ResponseTemplate::new(200).set_body_json(json!({"id": "chunked1"})),
    )
    .mount(&server)
    .await;

    let token_path = write_token(&dir);
    let id = client(&dir, token_path, &server, 4)
        .upload_video(&file, &metadata())
        .await
        .unwrap();
    assert_eq!(id, "chunked1");

    let initiated: serde_json::Value = serde_json::from_slice(
        &server.received_requests().await.unwrap()[0].body,
    )
    .unwrap();
    assert_eq!(initiated["snippet"]["categoryId"], "22");
}

#[tokio::test]
async fn resumes_from_what_youtube_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc123.mp4");
    std::fs::write(&file, CONTENT).unwrap();
    let server = MockServer::start().await;
    mount_session(&server).await;

    // Only half of the first chunk made it.
    chunk("bytes 0-3/10", b"0123", incomplete("bytes=0-1"))
        .mount(&server)
        .await;
    chunk("bytes 2-5/10", b"2345", incomplete("bytes=0-5"))
        .mount(&server)
        .await;
    chunk(
        "bytes 6-9/10",
        b"6789",
        ResponseTemplate::new(201).set_body_json(json!({"id": "resumed1"})),
    )
    .mount(&server)
    .await;

    let token_path = write_token(&dir);
    let id = client(&dir, token_path, &server, 4)
        .upload_video(&file, &metadata())
        .await
        .unwrap();
    assert_eq!(id, "resumed1");
}

#[tokio::test]
async fn incomplete_without_range_restarts_from_the_beginning() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc123.mp4");
    std::fs::write(&file, CONTENT).unwrap();
    let server = MockServer::start().await;
    mount_session(&server).await;

    // The first attempt at each of the first two chunks is lost entirely.
    chunk("bytes 0-3/10", b"0123", ResponseTemplate::new(308))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    chunk("bytes 0-3/10", b"0123", incomplete("bytes=0-3"))
        .expect(2)
        .mount(&server)
        .await;
    chunk("bytes 4-7/10", b"4567", ResponseTemplate::new(308))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    chunk("bytes 4-7/10", b"4567", incomplete("bytes=0-7"))
        .mount(&server)
        .await;
    chunk(
        "bytes 8-9/10",
        b"89",
        ResponseTemplate::new(200).set_body_json(json!({"id": "restarted1"})),
    )
    .mount(&server)
    .await;

    let token_path = write_token(&dir);
    let id = client(&dir, token_path, &server, 4)
        .upload_video(&file, &metadata())
        .await
        .unwrap();
    assert_eq!(id, "restarted1");
    assert_eq!(
        put_ranges(&server).await,
        vec![
            "bytes 0-3/10",
            "bytes 0-3/10",
            "bytes 4-7/10",
            "bytes 0-3/10",
            "bytes 4-7/10",
            "bytes 8-9/10",
        ]
    );
}

#[tokio::test]
async fn upload_without_progress_gives_up() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc123.mp4");
    std::fs::write(&file, CONTENT).unwrap();
    let server = MockServer::start().await;
    mount_session(&server).await;
    chunk("bytes 0-3/10", b"0123", ResponseTemplate::new(308))
        .expect(5)
        .mount(&server)
        .await;

    let token_path = write_token(&dir);
    let err = client(&dir, token_path, &server, 4)
        .upload_video(&file, &metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upload(_)), "{err}");
    assert!(err.to_string().contains("no progress"), "{err}");
}

#[tokio::test]
async fn missing_session_uri_is_an_upload_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc123.mp4");
    std::fs::write(&file, CONTENT).unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let token_path = write_token(&dir);
    let err = client(&dir, token_path, &server, 4)
        .upload_video(&file, &metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upload(_)), "{err}");
    assert!(err.to_string().contains("upload session URI"), "{err}");
}

#[tokio::test]
async fn response_without_id_is_an_upload_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc123.mp4");
    std::fs::write(&file, CONTENT).unwrap();
    let server = MockServer::start().await;
    mount_session(&server).await;
    chunk(
        "bytes 0-9/10",
        CONTENT,
        ResponseTemplate::new(200).set_body_json(json!({"id": ""})),
    )
    .mount(&server)
    .await;

    let token_path = write_token(&dir);
    let err = client(&dir, token_path, &server, 1024)
        .upload_video(&file, &metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upload(_)), "{err}");
}

#[tokio::test]
async fn no_credentials_means_no_upload() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc123.mp4");
    std::fs::write(&file, CONTENT).unwrap();
    let server = MockServer::start().await;

    let err = client(&dir, dir.path().join("token.json"), &server, 4)
        .upload_video(&file, &metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "{err}");
    assert!(server.received_requests().await.unwrap().is_empty());
}
