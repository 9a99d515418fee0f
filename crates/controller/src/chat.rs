use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lanty_protocol::Message;
use lanty_pubsub::Publisher;
use lanty_settings::DEFAULT_TTL;
use lanty_transfer::PhaseOutcome;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{ControllerError, RemoteError};
use crate::presence::Presence;
use crate::remote::{ChatConnection, RemoteClient};
use crate::settings::SettingsController;
use crate::status::StatusController;

/// The chat connection plus the tasks that keep it alive and drain it.
pub struct ChatSession {
    connection: Arc<dyn ChatConnection>,
    remote: Arc<dyn RemoteClient>,
    presence: Arc<Presence>,
    settings: Arc<SettingsController>,
    status: Arc<StatusController>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    messages: Publisher<Message>,
}

impl ChatSession {
    pub(crate) fn new(
        remote: Arc<dyn RemoteClient>,
        presence: Arc<Presence>,
        settings: Arc<SettingsController>,
        status: Arc<StatusController>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection: remote.chat(),
            remote,
            presence,
            settings,
            status,
            tracker,
            cancel,
            messages: Publisher::new(),
        }
    }

    /// Registers a recipient for inbound messages.
    ///
    /// Messages are pushed without waiting; a recipient that falls behind by
    /// more than its buffer loses messages.
    pub fn subscribe(&self, tx: mpsc::Sender<Message>) {
        self.messages.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<Message>) -> bool {
        self.messages.unsubscribe(tx)
    }

    pub fn connection_error(&self) -> Option<RemoteError> {
        self.connection.error()
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), RemoteError> {
        let message = Message::text(self.presence.user(), text);
        self.connection.send(&message).await.inspect_err(|e| {
            warn!(error = %e, "failed to send chat message");
        })
    }

    /// Uploads `path` and posts a message referencing it.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<(), RemoteError> {
        let path = path.as_ref();
        self.status
            .info(format!("Uploading file \"{}\" ...", path.display()), DEFAULT_TTL);

        let file = match self.remote.upload_file(path).await {
            Ok(file) => file,
            Err(e) => {
                error!(path = %path.display(), error = %e, "error uploading file");
                self.status
                    .error(format!("Error uploading file \"{}\"", path.display()), DEFAULT_TTL);
                return Err(e);
            }
        };
        debug!(name = %file.name, url = %file.url, "file uploaded");

        let message = Message::file(self.presence.user(), file);
        self.connection.send(&message).await.inspect_err(|e| {
            warn!(error = %e, "failed to send file message");
        })
    }

    /// Fetches the file a message refers to into the download directory.
    ///
    /// Returns once the fetch is under way; the outcome is reported as a
    /// status message.
    pub async fn download_attachment(&self, message: &Message) -> Result<(), ControllerError> {
        let Message::File(attachment) = message else {
            warn!("tried to download a message without an attachment");
            return Err(ControllerError::NotAFileMessage);
        };
        let file = attachment.file.clone();
        Url::parse(&file.url)
            .map_err(|e| RemoteError::Decode(format!("invalid file url {}: {e}", file.url)))?;

        let directory = self.settings.settings().download_directory;
        let handle = self
            .remote
            .fetch_file(&file, &directory, self.cancel.child_token())
            .await
            .inspect_err(|e| {
                error!(name = %file.name, error = %e, "error downloading file");
                self.status
                    .error(format!("Failed downloading {}", file.name), DEFAULT_TTL);
            })?;

        let status = Arc::clone(&self.status);
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let outcome = tokio::select! {
                outcome = handle.wait() => outcome,
                _ = cancel.cancelled() => PhaseOutcome::Cancelled,
            };
            match outcome {
                PhaseOutcome::Completed => {
                    debug!(name = %file.name, "file downloaded");
                    status.info(
                        format!("Downloaded \"{}\" to \"{}\"", file.name, directory.display()),
                        DEFAULT_TTL,
                    );
                }
                PhaseOutcome::Cancelled => trace!(name = %file.name, "file download cancelled"),
                PhaseOutcome::Failed(reason) => {
                    error!(name = %file.name, error = %reason, "error downloading file");
                    status.error(format!("Failed downloading {}", file.name), DEFAULT_TTL);
                }
            }
        });
        Ok(())
    }

    /// Starts the connection watchdog and the inbound reader.
    pub(crate) fn spawn(self: &Arc<Self>, period: Duration) {
        let session = Arc::clone(self);
        self.tracker.spawn(async move { session.watchdog(period).await });
        let session = Arc::clone(self);
        self.tracker.spawn(async move { session.read_inbound().await });
    }

    async fn watchdog(&self, period: Duration) {
        let (settings_tx, mut settings_rx) = lanty_pubsub::channel();
        self.settings.subscribe(settings_tx.clone());

        if let Err(e) = self.connection.connect().await {
            warn!(error = %e, "chat connection failed");
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(()) = settings_rx.recv() => self.reconnect("settings changed").await,
                _ = ticker.tick() => {
                    if let Some(e) = self.connection.error() {
                        warn!(error = %e, "chat connection broken");
                        self.reconnect("connection error").await;
                    }
                }
            }
        }

        self.settings.unsubscribe(&settings_tx);
        self.connection.disconnect().await;
        trace!("chat watchdog stopped");
    }

    async fn reconnect(&self, reason: &str) {
        debug!(reason, "reconnecting chat");
        if let Err(e) = self.connection.reconnect().await {
            warn!(error = %e, "chat reconnect failed");
        }
    }

    async fn read_inbound(&self) {
        let Some(mut inbound) = self.connection.take_inbound() else {
            warn!("chat inbound channel already taken");
            return;
        };
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => {
                        trace!(user = %message.user().name, "chat message received");
                        self.messages.notify(message);
                    }
                    None => break,
                },
            }
        }
        trace!("chat reader stopped");
    }
}
