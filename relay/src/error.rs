//! Error taxonomy shared by every stage of the relay.
//!
//! Internals use [`eyre::Result`] with `.context(...)` chains; each component wraps its failures
//! into one variant of [`Error`] at its boundary so the webhook layer can pick an HTTP status
//! without inspecting message text.

use http::StatusCode;

/// Why an inbound webhook was turned away before any side effect happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Sender missing from the payload or not on the admin allow-list.
    #[error("Unauthorized or missing sender")]
    Unauthorized,
    /// Payload is malformed, or its first attachment is not a usable Reel.
    #[error("Invalid request")]
    InvalidRequest,
    /// The same Reel is already being relayed by another request.
    #[error("Reel already being processed")]
    Duplicate,
}

impl Rejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Rejection::Unauthorized => StatusCode::FORBIDDEN,
            Rejection::InvalidRequest => StatusCode::BAD_REQUEST,
            Rejection::Duplicate => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// YouTube credentials could not be loaded, refreshed, or obtained interactively.
    #[error("obtain YouTube credentials: {0:#}")]
    Auth(eyre::Report),
    /// The Reel's media URL could not be streamed to disk.
    #[error("download reel: {0:#}")]
    Download(eyre::Report),
    /// The YouTube upload was rejected, or the local file could not be read.
    #[error("upload video: {0:#}")]
    Upload(eyre::Report),
    /// The Instagram send API did not accept a reply.
    #[error("notify sender: {0:#}")]
    Notify(eyre::Report),
    #[error(transparent)]
    Validation(#[from] Rejection),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(rejection) => rejection.status_code(),
            Error::Auth(_) | Error::Download(_) | Error::Upload(_) | Error::Notify(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
