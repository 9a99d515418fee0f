use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use lanty_protocol::Game;
use lanty_pubsub::Publisher;
use lanty_settings::DOWNLOAD_ERROR_TTL;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::config::RetryPolicy;
use crate::download::{Download, DownloadContext};
use crate::error::DownloadError;

/// Append-only list of downloads plus the scanner that starts them.
///
/// At most one active download exists per game. Finished and stopped
/// downloads stay in the list so the presentation layer can show history.
pub struct DownloadQueue {
    downloads: RwLock<Vec<Arc<Download>>>,
    ctx: DownloadContext,
    cancel: CancellationToken,
    retry: RetryPolicy,
    events: Publisher<()>,
}

impl DownloadQueue {
    pub(crate) fn new(ctx: DownloadContext, cancel: CancellationToken, retry: RetryPolicy) -> Self {
        Self {
            downloads: RwLock::new(Vec::new()),
            ctx,
            cancel,
            retry,
            events: Publisher::new(),
        }
    }

    /// Queues `game` unless a download for it is still active.
    ///
    /// Returns the new download, or `None` if one was already active.
    pub fn enqueue(&self, game: Game) -> Option<Arc<Download>> {
        let download = {
            let mut downloads = self
                .downloads
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let active = downloads
                .iter()
                .rev()
                .find(|d| d.game().same_game(&game))
                .is_some_and(|d| d.is_active());
            if active {
                debug!(slug = %game.slug, "game already downloading");
                return None;
            }
            let download = Arc::new(Download::new(game));
            downloads.push(Arc::clone(&download));
            download
        };
        debug!(slug = %download.game().slug, id = %download.id(), "added game to download queue");
        self.events.notify(());
        Some(download)
    }

    /// Snapshot in queue order.
    pub fn downloads(&self) -> Vec<Arc<Download>> {
        self.read().clone()
    }

    /// The most recent download of `slug`.
    pub fn latest(&self, slug: &str) -> Option<Arc<Download>> {
        self.read()
            .iter()
            .rev()
            .find(|d| d.game().slug == slug)
            .cloned()
    }

    pub fn last_queued(&self) -> Option<Arc<Download>> {
        self.read().last().cloned()
    }

    pub fn is_downloading(&self, slug: &str) -> bool {
        self.latest(slug).is_some_and(|d| d.is_active())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self, tx: mpsc::Sender<()>) {
        self.events.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<()>) -> bool {
        self.events.unsubscribe(tx)
    }

    /// Tries to start every queued download that is due.
    pub(crate) async fn scan(&self) {
        let now = Instant::now();
        let due: Vec<_> = self
            .read()
            .iter()
            .filter(|d| d.is_due(now))
            .cloned()
            .collect();

        for download in due {
            let slug = &download.game().slug;
            match download.start(&self.ctx, &self.cancel).await {
                Ok(()) => {}
                Err(DownloadError::AlreadyStarted) => {}
                Err(DownloadError::Cancelled) => {
                    trace!(slug = %slug, "download start cancelled");
                }
                Err(e) => {
                    let retries = download.retries();
                    if matches!(e, DownloadError::Connection) {
                        warn!(slug = %slug, retries, "server unreachable, download will be retried");
                    } else {
                        error!(slug = %slug, retries, error = %e, "failed to start download of game");
                    }
                    if self.retry.exhausted(retries) {
                        if download.stop_with(Some(DownloadError::RetriesExhausted(retries))) {
                            self.ctx.status.error(
                                format!("Error starting download of game: {}", download.game().name),
                                DOWNLOAD_ERROR_TTL,
                            );
                        }
                    } else if let Some(delay) = self.retry.backoff.delay_for_attempt(retries) {
                        download.defer_until(Instant::now() + delay);
                    }
                }
            }
        }
    }

    pub(crate) fn spawn(self: &Arc<Self>, period: Duration) {
        let queue = Arc::clone(self);
        self.ctx.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = queue.cancel.cancelled() => break,
                    _ = ticker.tick() => queue.scan().await,
                }
            }
            trace!("download queue stopped");
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Download>>> {
        self.downloads.read().unwrap_or_else(PoisonError::into_inner)
    }
}
