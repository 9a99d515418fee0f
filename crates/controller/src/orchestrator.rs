use std::sync::Arc;

use lanty_settings::SettingsStore;
use lanty_transfer::Extractor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::catalog::GameCatalog;
use crate::chat::ChatSession;
use crate::config::ControllerConfig;
use crate::connection::ConnectionMonitor;
use crate::download::DownloadContext;
use crate::error::ControllerError;
use crate::presence::Presence;
use crate::queue::DownloadQueue;
use crate::remote::RemoteClient;
use crate::settings::SettingsController;
use crate::status::StatusController;

/// Owns the session scope and every component running inside it.
///
/// Every background task is spawned on [`tracker`](Self::tracker) and
/// watches [`cancel_token`](Self::cancel_token). Shut down with
/// [`shutdown`](Self::shutdown), which returns only after all of them have
/// exited.
pub struct Controller {
    cancel: CancellationToken,
    tracker: TaskTracker,
    settings: Arc<SettingsController>,
    status: Arc<StatusController>,
    catalog: Arc<GameCatalog>,
    downloads: Arc<DownloadQueue>,
    presence: Arc<Presence>,
    chat: Arc<ChatSession>,
    connection: Arc<ConnectionMonitor>,
}

impl Controller {
    /// Loads settings, wires the components together and starts their
    /// background tasks. Must be called from within a tokio runtime.
    ///
    /// Unreadable settings and a malformed server URL are returned as errors
    /// before anything is spawned.
    pub fn start(
        parent: &CancellationToken,
        config: ControllerConfig,
        store: Arc<dyn SettingsStore>,
        remote: Arc<dyn RemoteClient>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self, ControllerError> {
        let loaded = store.load()?;
        let endpoint = loaded
            .endpoint()
            .map_err(|e| ControllerError::InvalidEndpoint {
                url: loaded.server_url.clone(),
                reason: e.to_string(),
            })?;
        remote
            .set_base_url(&endpoint)
            .map_err(|e| ControllerError::InvalidEndpoint {
                url: loaded.server_url.clone(),
                reason: e.to_string(),
            })?;
        debug!(url = %endpoint, user = %loaded.username, "settings loaded");

        let cancel = parent.child_token();
        let tracker = TaskTracker::new();

        let status = Arc::new(StatusController::new());
        let settings = Arc::new(SettingsController::new(
            loaded,
            store,
            Arc::clone(&remote),
            Arc::clone(&status),
        ));
        let catalog = Arc::new(GameCatalog::new(Arc::clone(&remote)));
        let presence = Arc::new(Presence::new(Arc::clone(&remote), Arc::clone(&settings)));
        let connection = Arc::new(ConnectionMonitor::new(Arc::clone(&remote)));
        let downloads = Arc::new(DownloadQueue::new(
            DownloadContext {
                remote: Arc::clone(&remote),
                extractor,
                settings: Arc::clone(&settings),
                status: Arc::clone(&status),
                tracker: tracker.clone(),
            },
            cancel.clone(),
            config.retry.clone(),
        ));
        let chat = Arc::new(ChatSession::new(
            remote,
            Arc::clone(&presence),
            Arc::clone(&settings),
            Arc::clone(&status),
            tracker.clone(),
            cancel.clone(),
        ));

        catalog.spawn(&tracker, cancel.clone(), config.catalog_interval);
        presence.spawn(&tracker, cancel.clone(), config.presence_interval);
        connection.spawn(&tracker, cancel.clone(), config.connection_interval);
        downloads.spawn(config.queue_interval);
        chat.spawn(config.chat_health_interval);
        info!("controller started");

        Ok(Self {
            cancel,
            tracker,
            settings,
            status,
            catalog,
            downloads,
            presence,
            chat,
            connection,
        })
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn settings(&self) -> &Arc<SettingsController> {
        &self.settings
    }

    pub fn status(&self) -> &Arc<StatusController> {
        &self.status
    }

    pub fn catalog(&self) -> &Arc<GameCatalog> {
        &self.catalog
    }

    pub fn downloads(&self) -> &Arc<DownloadQueue> {
        &self.downloads
    }

    pub fn presence(&self) -> &Arc<Presence> {
        &self.presence
    }

    pub fn chat(&self) -> &Arc<ChatSession> {
        &self.chat
    }

    pub fn connection(&self) -> &Arc<ConnectionMonitor> {
        &self.connection
    }

    /// Cancels the session scope. Tasks wind down on their own.
    pub fn quit(&self) {
        debug!("quit requested");
        self.cancel.cancel();
    }

    /// Cancels the session and waits for every background task to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("controller stopped");
    }

    /// Quits on ctrl-c.
    pub fn spawn_signal_handler(&self) {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("interrupt received, shutting down");
                        cancel.cancel();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
                },
            }
        });
    }
}
