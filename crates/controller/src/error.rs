//! Error types for the orchestration layer.

use lanty_protocol::ProtocolError;
use lanty_settings::SettingsError;

/// A failed call to the remote service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("error connecting to server: {0}")]
    Connect(String),

    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Whether the server could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RemoteError::Connect(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RemoteError::Cancelled)
    }
}

impl From<ProtocolError> for RemoteError {
    fn from(e: ProtocolError) -> Self {
        RemoteError::Decode(e.to_string())
    }
}

/// Why a download did not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("error connecting to server")]
    Connection,

    #[error("error starting download: {0}")]
    Start(String),

    #[error("error downloading: {0}")]
    Transfer(String),

    #[error("error extracting: {0}")]
    Extraction(String),

    #[error("giving up after {0} failed attempts")]
    RetriesExhausted(u32),

    #[error("download already started")]
    AlreadyStarted,
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

impl From<RemoteError> for DownloadError {
    fn from(e: RemoteError) -> Self {
        if e.is_connectivity() {
            DownloadError::Connection
        } else if e.is_cancelled() {
            DownloadError::Cancelled
        } else {
            DownloadError::Start(e.to_string())
        }
    }
}

/// Errors surfaced by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("message does not carry a file")]
    NotAFileMessage,
}
