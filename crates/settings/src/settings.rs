use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::SettingsError;

/// Persisted client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the game server.
    #[serde(rename = "serverurl")]
    pub server_url: String,

    /// Where games are installed.
    #[serde(rename = "gamedirectory")]
    pub game_directory: PathBuf,

    /// Where chat attachments are saved.
    #[serde(rename = "downloaddirectory")]
    pub download_directory: PathBuf,

    /// Display name announced to other players.
    pub username: String,
}

fn default_username() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "Player".into())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".into(),
            game_directory: PathBuf::from("games"),
            download_directory: PathBuf::from("downloads"),
            username: default_username(),
        }
    }
}

impl Settings {
    /// Parses and checks [`server_url`](Self::server_url).
    pub fn endpoint(&self) -> Result<Url, SettingsError> {
        parse_server_url(&self.server_url)
    }
}

/// Accepts absolute `http`/`https` URLs with a host.
pub fn parse_server_url(raw: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(raw.trim()).map_err(|e| SettingsError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SettingsError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(SettingsError::InvalidUrl("missing host".into()));
    }
    Ok(url)
}

/// Checks that `path` exists and is a directory.
pub fn check_directory(path: &Path) -> Result<(), SettingsError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SettingsError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SettingsError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(SettingsError::Io(e)),
    }
}

/// Loads and saves [`Settings`].
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// Stores settings as pretty-printed JSON.
///
/// A missing file loads as [`Settings::default`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/lanty/settings.json`, if a config dir is known.
    pub fn default_path() -> Option<PathBuf> {
        config_base_dir().map(|d| d.join("lanty").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let settings = serde_json::from_str(&content)?;
        debug!(path = %self.path.display(), "settings loaded");
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        set_permissions_0600(&self.path);
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// Keeps settings in memory. Useful for headless runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: Mutex<Settings>,
}

impl MemoryStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            warn!(path = %path.display(), error = %e, "failed to restrict settings permissions");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

fn config_base_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    }
}
