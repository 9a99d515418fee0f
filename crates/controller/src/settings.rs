use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use lanty_pubsub::Publisher;
use lanty_settings::{
    DEFAULT_TTL, Settings, SettingsError, SettingsStore, check_directory, parse_server_url,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::remote::RemoteClient;
use crate::status::StatusController;

/// Owns the live settings record.
///
/// Every accepted change is announced to subscribers and persisted. Invalid
/// input is reported on the status bar and leaves the settings untouched.
pub struct SettingsController {
    settings: RwLock<Settings>,
    store: Arc<dyn SettingsStore>,
    remote: Arc<dyn RemoteClient>,
    status: Arc<StatusController>,
    events: Publisher<()>,
}

impl SettingsController {
    pub fn new(
        settings: Settings,
        store: Arc<dyn SettingsStore>,
        remote: Arc<dyn RemoteClient>,
        status: Arc<StatusController>,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            store,
            remote,
            status,
            events: Publisher::new(),
        }
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_server_url(&self, raw: &str) -> Result<(), SettingsError> {
        let url = parse_server_url(raw).map_err(|e| self.reject("Invalid server URL", e))?;
        self.remote
            .set_base_url(&url)
            .map_err(|e| self.reject("Invalid server URL", SettingsError::InvalidUrl(e.to_string())))?;
        debug!(url = %url, "server url changed");
        self.update(|s| s.server_url = raw.trim().to_string())
    }

    pub fn set_game_directory(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        check_directory(path).map_err(|e| self.reject("Invalid game directory", e))?;
        self.update(|s| s.game_directory = path.to_path_buf())
    }

    pub fn set_download_directory(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        check_directory(path).map_err(|e| self.reject("Invalid download directory", e))?;
        self.update(|s| s.download_directory = path.to_path_buf())
    }

    pub fn set_username(&self, name: &str) -> Result<(), SettingsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject("Invalid username", SettingsError::EmptyUsername));
        }
        self.update(|s| s.username = name.to_string())
    }

    /// Persists the current settings.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.store.save(&self.settings()).map_err(|e| {
            warn!(error = %e, "failed to save settings");
            self.status
                .error(format!("Error saving settings: {e}"), DEFAULT_TTL);
            e
        })
    }

    pub fn subscribe(&self, tx: mpsc::Sender<()>) {
        self.events.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<()>) -> bool {
        self.events.unsubscribe(tx)
    }

    fn update(&self, apply: impl FnOnce(&mut Settings)) -> Result<(), SettingsError> {
        {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            apply(&mut *settings);
        }
        self.events.notify(());
        self.save()
    }

    fn reject(&self, what: &str, e: SettingsError) -> SettingsError {
        warn!(error = %e, "{what}");
        self.status.error(format!("{what}: {e}"), DEFAULT_TTL);
        e
    }
}
