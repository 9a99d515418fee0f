//! Client settings and the status message queue.

mod settings;
mod status;

pub use settings::{
    JsonFileStore, MemoryStore, Settings, SettingsStore, check_directory, parse_server_url,
};
pub use status::{DEFAULT_TTL, DOWNLOAD_ERROR_TTL, Severity, Status, StatusQueue};

/// Errors produced while loading, saving or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("path does not exist: {}", .0.display())]
    NotFound(std::path::PathBuf),

    #[error("not a folder: {}", .0.display())]
    NotADirectory(std::path::PathBuf),

    #[error("username must not be empty")]
    EmptyUsername,
}
