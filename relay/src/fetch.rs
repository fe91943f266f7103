//! Streaming download of a Reel's media file.

use crate::error::Error;
use eyre::Context;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_stream::StreamExt;
use tracing::instrument;

/// Size of the write buffer between the network stream and the file.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: reqwest::Client,
}

impl MediaFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Streams `url` into `destination` and returns the number of bytes written.
    ///
    /// The file is only created once the server has answered with a success status, and memory
    /// use stays bounded by [`CHUNK_SIZE`] plus one network frame regardless of file size.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, Error> {
        self.fetch_inner(url, destination)
            .await
            .map_err(Error::Download)
    }

    async fn fetch_inner(&self, url: &str, destination: &Path) -> eyre::Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("send GET request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            eyre::bail!("download failed with status code: {status}");
        }

        let file = tokio::fs::File::create(destination)
            .await
            .with_context(|| format!("create {}", destination.display()))?;
        let mut file = BufWriter::with_capacity(CHUNK_SIZE, file);

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("read response body")?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("write {}", destination.display()))?;
            written += chunk.len() as u64;
            tracing::trace!(written, "downloaded chunk");
        }
        file.flush()
            .await
            .with_context(|| format!("flush {}", destination.display()))?;

        tracing::info!(bytes = written, "download completed");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn streams_body_to_disk() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/v.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("abc123.mp4");
        let fetcher = MediaFetcher::new(reqwest::Client::new());
        let written = fetcher
            .fetch(&format!("{}/v.mp4", server.uri()), &destination)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&destination).unwrap(), body);
    }

    #[tokio::test]
    async fn non_success_status_is_a_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("gone.mp4");
        let err = MediaFetcher::new(reqwest::Client::new())
            .fetch(&format!("{}/gone.mp4", server.uri()), &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Download(_)), "{err}");
        assert!(err.to_string().contains("404"), "{err}");
        assert!(!destination.exists());
    }
}
