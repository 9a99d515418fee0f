//! One acquisition attempt for one game: transfer, then extraction.
//!
//! ```text
//! Queued ──start──▶ Transferring ──▶ Extracting ──▶ Completed
//!    │                   │                │
//!    └──────stop─────────┴────────────────┴──▶ Stopped
//!                        └──error/cancel──┴──▶ Failed
//! ```
//!
//! Phases only move forward. After `Completed`, `Stopped` or `Failed`
//! nothing changes any more, so a cancellation that races a `stop()` still
//! reads as `Stopped`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use lanty_protocol::Game;
use lanty_pubsub::Publisher;
use lanty_settings::DOWNLOAD_ERROR_TTL;
use lanty_transfer::{
    Extractor, INSTALL_SEARCH_DEPTH, PhaseHandle, PhaseOutcome, PhaseProgress, find_install_dir,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::error::DownloadError;
use crate::remote::RemoteClient;
use crate::settings::SettingsController;
use crate::status::StatusController;

/// Where a download stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Queued,
    Transferring,
    Extracting,
    Completed,
    Stopped,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Stopped | Phase::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Phase::Queued => 0,
            Phase::Transferring => 1,
            Phase::Extracting => 2,
            Phase::Completed | Phase::Stopped | Phase::Failed => 3,
        }
    }
}

/// What a download needs from the rest of the controller.
#[derive(Clone)]
pub(crate) struct DownloadContext {
    pub remote: Arc<dyn RemoteClient>,
    pub extractor: Arc<dyn Extractor>,
    pub settings: Arc<SettingsController>,
    pub status: Arc<StatusController>,
    pub tracker: TaskTracker,
}

#[derive(Default)]
struct DownloadState {
    phase: Phase,
    error: Option<DownloadError>,
    retries: u32,
    transfer: Option<Arc<PhaseProgress>>,
    extraction: Option<Arc<PhaseProgress>>,
    cancel: Option<CancellationToken>,
    not_before: Option<Instant>,
    progress_subscribers: Vec<mpsc::Sender<()>>,
}

impl DownloadState {
    fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves to `next` if that is a forward step. Returns whether it did.
    fn advance(&mut self, next: Phase) -> bool {
        if self.phase.is_terminal() || next.rank() <= self.phase.rank() {
            return false;
        }
        self.phase = next;
        true
    }

    /// Registers every progress subscriber on `progress`.
    fn attach(&self, progress: &PhaseProgress) {
        for tx in &self.progress_subscribers {
            progress.events().subscribe(tx.clone());
        }
    }

    fn detach(&self, progress: &PhaseProgress) {
        for tx in &self.progress_subscribers {
            progress.events().unsubscribe(tx);
        }
    }

    /// The phase whose numbers the download currently reports.
    fn active_progress(&self) -> Option<&Arc<PhaseProgress>> {
        self.extraction.as_ref().or(self.transfer.as_ref())
    }
}

/// A single download of a game.
///
/// Two notification streams: [`subscribe`](Self::subscribe) fires on phase
/// changes, [`subscribe_progress`](Self::subscribe_progress) on every
/// progress tick of the running phase.
pub struct Download {
    id: Uuid,
    game: Game,
    state: RwLock<DownloadState>,
    events: Publisher<()>,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("id", &self.id)
            .field("slug", &self.game.slug)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Download {
    pub(crate) fn new(game: Game) -> Self {
        Self {
            id: Uuid::new_v4(),
            game,
            state: RwLock::new(DownloadState::default()),
            events: Publisher::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn phase(&self) -> Phase {
        self.read().phase()
    }

    pub fn is_queued(&self) -> bool {
        self.phase() == Phase::Queued
    }

    pub fn is_transferring(&self) -> bool {
        self.phase() == Phase::Transferring
    }

    pub fn is_extracting(&self) -> bool {
        self.phase() == Phase::Extracting
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Phase::Completed
    }

    pub fn is_stopped(&self) -> bool {
        self.phase() == Phase::Stopped
    }

    pub fn is_failed(&self) -> bool {
        self.phase() == Phase::Failed
    }

    /// Transferring or extracting.
    pub fn is_running(&self) -> bool {
        matches!(self.phase(), Phase::Transferring | Phase::Extracting)
    }

    /// Not yet in a terminal phase.
    pub fn is_active(&self) -> bool {
        !self.phase().is_terminal()
    }

    /// Size of the transferred archive in bytes, 0 before the transfer starts.
    pub fn filesize(&self) -> u64 {
        self.read().transfer.as_ref().map_or(0, |p| p.total())
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.read().transfer.as_ref().map(|p| p.started_at())
    }

    /// When the last phase that ran finished.
    pub fn end_time(&self) -> Option<Instant> {
        let state = self.read();
        match (&state.extraction, &state.transfer) {
            (Some(extraction), _) => extraction.ended_at(),
            (None, Some(transfer)) => transfer.ended_at(),
            (None, None) => None,
        }
    }

    /// Time since the transfer started; fixed once the download ended.
    pub fn duration(&self) -> Duration {
        let state = self.read();
        let Some(transfer) = &state.transfer else {
            return Duration::ZERO;
        };
        match &state.extraction {
            Some(extraction) => match extraction.ended_at() {
                Some(end) => end.duration_since(transfer.started_at()),
                None => transfer.started_at().elapsed(),
            },
            None => transfer.duration(),
        }
    }

    /// Completed fraction of the current phase.
    pub fn progress(&self) -> f64 {
        self.read().active_progress().map_or(0.0, |p| p.fraction())
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.read()
            .active_progress()
            .map_or(0.0, |p| p.bytes_per_second())
    }

    pub fn error(&self) -> Option<DownloadError> {
        self.read().error.clone()
    }

    /// Failed attempts to start the transfer.
    pub fn retries(&self) -> u32 {
        self.read().retries
    }

    pub fn subscribe(&self, tx: mpsc::Sender<()>) {
        self.events.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<()>) -> bool {
        self.events.unsubscribe(tx)
    }

    pub fn subscribe_progress(&self, tx: mpsc::Sender<()>) {
        let mut state = self.write();
        if let Some(progress) = state.active_progress()
            && !progress.is_finished()
        {
            progress.events().subscribe(tx.clone());
        }
        state.progress_subscribers.push(tx);
    }

    pub fn unsubscribe_progress(&self, tx: &mpsc::Sender<()>) -> bool {
        let mut state = self.write();
        if let Some(progress) = state.active_progress() {
            progress.events().unsubscribe(tx);
        }
        match state
            .progress_subscribers
            .iter()
            .position(|s| s.same_channel(tx))
        {
            Some(index) => {
                state.progress_subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Cancels whichever phase is running and marks the download stopped.
    ///
    /// Calling it again, or on a finished download, does nothing.
    pub fn stop(&self) {
        if self.stop_with(None) {
            debug!(slug = %self.game.slug, "download stopped");
        }
    }

    /// Stops and records `error`. Returns whether this call stopped it.
    pub(crate) fn stop_with(&self, error: Option<DownloadError>) -> bool {
        {
            let mut state = self.write();
            if !state.advance(Phase::Stopped) {
                return false;
            }
            if let Some(cancel) = &state.cancel {
                cancel.cancel();
            }
            if error.is_some() {
                state.error = error;
            }
        }
        self.events.notify(());
        true
    }

    /// Whether the queue may try to start this download at `now`.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        let state = self.read();
        state.phase() == Phase::Queued && state.not_before.is_none_or(|t| t <= now)
    }

    pub(crate) fn defer_until(&self, when: Instant) {
        self.write().not_before = Some(when);
    }

    /// Requests the transfer and hands the rest to a watcher task.
    ///
    /// A failed request leaves the download queued with one more retry on
    /// the counter. A cancelled request does not count as a failure.
    pub(crate) async fn start(
        self: &Arc<Self>,
        ctx: &DownloadContext,
        parent: &CancellationToken,
    ) -> Result<(), DownloadError> {
        if self.phase() != Phase::Queued {
            debug!(slug = %self.game.slug, "download already started");
            return Err(DownloadError::AlreadyStarted);
        }

        let cancel = parent.child_token();
        let directory = ctx.settings.settings().game_directory;
        let transfer = match ctx
            .remote
            .start_transfer(&self.game, &directory, cancel.clone())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                let err = DownloadError::from(e);
                if !err.is_cancelled() {
                    let mut state = self.write();
                    state.retries += 1;
                    state.error = Some(err.clone());
                }
                return Err(err);
            }
        };

        let started = {
            let mut state = self.write();
            state.attach(transfer.progress());
            state.transfer = Some(Arc::clone(transfer.progress()));
            state.cancel = Some(cancel.clone());
            state.error = None;
            state.advance(Phase::Transferring)
        };
        if !started {
            // Stopped while the request was in flight.
            cancel.cancel();
        }

        let download = Arc::clone(self);
        let watcher_ctx = ctx.clone();
        ctx.tracker
            .spawn(async move { download.watch(watcher_ctx, transfer, cancel).await });
        debug!(slug = %self.game.slug, "game download started");
        Ok(())
    }

    async fn watch(
        self: Arc<Self>,
        ctx: DownloadContext,
        transfer: PhaseHandle,
        cancel: CancellationToken,
    ) {
        self.events.notify(());
        let archive = transfer.artifact().to_path_buf();
        let progress = Arc::clone(transfer.progress());

        let outcome = wait_phase(transfer, &cancel).await;
        self.read().detach(&progress);

        match outcome {
            PhaseOutcome::Completed => {
                debug!(slug = %self.game.slug, "transfer finished");
            }
            PhaseOutcome::Cancelled => {
                debug!(slug = %self.game.slug, "transfer cancelled");
                self.fail(DownloadError::Cancelled);
                remove_artifact(&archive).await;
                trace!(slug = %self.game.slug, "download watcher exiting");
                return;
            }
            PhaseOutcome::Failed(reason) => {
                error!(slug = %self.game.slug, error = %reason, "error downloading game");
                self.fail(DownloadError::Transfer(reason));
                ctx.status.error(
                    format!("Error downloading game: {}", self.game.name),
                    DOWNLOAD_ERROR_TTL,
                );
                remove_artifact(&archive).await;
                trace!(slug = %self.game.slug, "download watcher exiting");
                return;
            }
        }

        let game_directory = ctx.settings.settings().game_directory;
        let destination = resolve_destination(&game_directory, &self.game).await;
        debug!(slug = %self.game.slug, dest = %destination.display(), "extracting");

        let extraction = ctx
            .extractor
            .extract(&archive, &destination, cancel.clone());
        let progress = Arc::clone(extraction.progress());
        {
            let mut state = self.write();
            state.attach(&progress);
            state.extraction = Some(Arc::clone(&progress));
            state.advance(Phase::Extracting);
        }
        self.events.notify(());

        let outcome = wait_phase(extraction, &cancel).await;
        self.read().detach(&progress);

        match outcome {
            PhaseOutcome::Completed => {
                let completed = self.write().advance(Phase::Completed);
                if completed {
                    self.events.notify(());
                }
                debug!(slug = %self.game.slug, "game installed");
            }
            PhaseOutcome::Cancelled => {
                debug!(slug = %self.game.slug, "extraction cancelled");
                self.fail(DownloadError::Cancelled);
            }
            PhaseOutcome::Failed(reason) => {
                error!(slug = %self.game.slug, error = %reason, "error extracting game");
                self.fail(DownloadError::Extraction(reason));
                ctx.status.error(
                    format!("Error extracting game: {}", self.game.name),
                    DOWNLOAD_ERROR_TTL,
                );
            }
        }
        remove_artifact(&archive).await;
        trace!(slug = %self.game.slug, "download watcher exiting");
    }

    fn fail(&self, error: DownloadError) {
        let failed = {
            let mut state = self.write();
            let failed = state.advance(Phase::Failed);
            if failed {
                state.error = Some(error);
            }
            failed
        };
        if failed {
            self.events.notify(());
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DownloadState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DownloadState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Waits for a phase, treating a fired token as cancellation even if the
/// phase never reports. The phase clock is stopped either way.
async fn wait_phase(handle: PhaseHandle, cancel: &CancellationToken) -> PhaseOutcome {
    let progress = Arc::clone(handle.progress());
    let outcome = tokio::select! {
        biased;
        outcome = handle.wait() => outcome,
        _ = cancel.cancelled() => PhaseOutcome::Cancelled,
    };
    progress.finish();
    outcome
}

/// An existing installation of `game` under `game_directory`, or a fresh
/// `<game_directory>/<slug>`.
async fn resolve_destination(game_directory: &Path, game: &Game) -> PathBuf {
    let fallback = game_directory.join(&game.slug);
    if game.client.executable.is_empty() {
        return fallback;
    }
    let root = game_directory.to_path_buf();
    let executable = game.client.executable.clone();
    let found = tokio::task::spawn_blocking(move || {
        find_install_dir(&root, &executable, INSTALL_SEARCH_DEPTH)
    })
    .await
    .ok()
    .flatten();
    found.unwrap_or(fallback)
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => trace!(path = %path.display(), "removed download artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "error removing download artifact"),
    }
}

#[cfg(test)]
mod tests {
    use lanty_settings::{MemoryStore, Settings};
    use lanty_transfer::ZipExtractor;

    use super::*;
    use crate::error::RemoteError;
    use crate::testing::{MB, MockRemote, TransferBehavior, game, wait_until};

    /// Never finishes on its own; reports cancellation once asked to.
    struct HangingExtractor;

    impl Extractor for HangingExtractor {
        fn extract(
            &self,
            archive: &Path,
            _destination: &Path,
            cancel: CancellationToken,
        ) -> PhaseHandle {
            let (handle, reporter) = PhaseHandle::channel(Arc::new(PhaseProgress::new(1)), archive);
            tokio::spawn(async move {
                cancel.cancelled().await;
                reporter.report(PhaseOutcome::Cancelled);
            });
            handle
        }
    }

    struct Fixture {
        ctx: DownloadContext,
        remote: Arc<MockRemote>,
        status: Arc<StatusController>,
        dir: tempfile::TempDir,
        cancel: CancellationToken,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        let status = Arc::new(StatusController::new());
        let settings = Settings {
            game_directory: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let settings = Arc::new(SettingsController::new(
            settings,
            Arc::new(MemoryStore::default()),
            remote.clone(),
            status.clone(),
        ));
        let ctx = DownloadContext {
            remote: remote.clone(),
            extractor: Arc::new(ZipExtractor),
            settings,
            status: status.clone(),
            tracker: TaskTracker::new(),
        };
        Fixture {
            ctx,
            remote,
            status,
            dir,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn phases_only_move_forward() {
        let mut state = DownloadState::default();
        assert_eq!(state.phase(), Phase::Queued);
        assert!(state.advance(Phase::Transferring));
        assert!(!state.advance(Phase::Queued));
        assert!(state.advance(Phase::Stopped));
        assert!(!state.advance(Phase::Failed));
        assert!(!state.advance(Phase::Completed));
        assert_eq!(state.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn completes_extracts_and_removes_archive() {
        let f = fixture();
        let download = Arc::new(Download::new(game("demo", "Demo")));
        let (tx, mut rx) = lanty_pubsub::channel();
        download.subscribe(tx);

        download.start(&f.ctx, &f.cancel).await.unwrap();
        wait_until(|| download.is_complete()).await;

        assert_eq!(download.filesize(), 100 * MB);
        assert!(!f.dir.path().join("demo.zip").exists());
        assert!(f.dir.path().join("demo/demo.exe").exists());
        assert!(download.error().is_none());
        assert!(!download.is_stopped());
        assert!(!download.is_running());
        assert_eq!(download.progress(), 1.0);

        let start = download.start_time().unwrap();
        let end = download.end_time().unwrap();
        assert_eq!(download.duration(), end.duration_since(start));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn extracts_into_existing_installation() {
        let f = fixture();
        let existing = f.dir.path().join("shooters/Demo Game");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("demo.exe"), b"old").unwrap();

        let download = Arc::new(Download::new(game("demo", "Demo")));
        download.start(&f.ctx, &f.cancel).await.unwrap();
        wait_until(|| download.is_complete()).await;

        assert_eq!(std::fs::read(existing.join("demo.exe")).unwrap(), b"MZ");
        assert!(!f.dir.path().join("demo").exists());
    }

    #[tokio::test]
    async fn failed_start_counts_a_retry_and_stays_queued() {
        let f = fixture();
        f.remote
            .set_transfer(TransferBehavior::Refuse(RemoteError::Connect("refused".into())));
        let download = Arc::new(Download::new(game("demo", "Demo")));

        let err = download.start(&f.ctx, &f.cancel).await.unwrap_err();
        assert_eq!(err, DownloadError::Connection);
        assert_eq!(download.retries(), 1);
        assert!(download.is_queued());
        assert_eq!(download.error(), Some(DownloadError::Connection));
    }

    #[tokio::test]
    async fn cancelled_start_keeps_retry_counter() {
        let f = fixture();
        f.remote
            .set_transfer(TransferBehavior::Refuse(RemoteError::Cancelled));
        let download = Arc::new(Download::new(game("demo", "Demo")));

        let err = download.start(&f.ctx, &f.cancel).await.unwrap_err();
        assert_eq!(err, DownloadError::Cancelled);
        assert_eq!(download.retries(), 0);
        assert!(download.is_queued());
        assert!(download.error().is_none());
    }

    #[tokio::test]
    async fn corrupt_archive_fails_extraction() {
        let f = fixture();
        f.remote.set_transfer(TransferBehavior::Corrupt);
        let download = Arc::new(Download::new(game("demo", "Demo")));

        download.start(&f.ctx, &f.cancel).await.unwrap();
        f.ctx.tracker.close();
        f.ctx.tracker.wait().await;

        assert!(download.is_failed());
        assert!(matches!(download.error(), Some(DownloadError::Extraction(_))));
        assert!(!f.dir.path().join("demo.zip").exists());
        assert!(!f.dir.path().join("demo/demo.exe").exists());
        assert_eq!(f.status.pending(), 1);
        assert_eq!(
            f.status.next().unwrap().text,
            "Error extracting game: Demo"
        );
    }

    #[tokio::test]
    async fn stop_during_extraction_stays_stopped() {
        let mut f = fixture();
        f.ctx.extractor = Arc::new(HangingExtractor);
        let download = Arc::new(Download::new(game("demo", "Demo")));

        download.start(&f.ctx, &f.cancel).await.unwrap();
        wait_until(|| download.is_extracting()).await;
        assert!(f.dir.path().join("demo.zip").exists());

        download.stop();
        f.ctx.tracker.close();
        f.ctx.tracker.wait().await;

        assert!(download.is_stopped());
        assert!(download.error().is_none());
        assert!(!f.dir.path().join("demo.zip").exists());
        assert_eq!(f.status.pending(), 0);
    }

    #[tokio::test]
    async fn transfer_failure_reports_status_and_removes_partial_file() {
        let f = fixture();
        f.remote
            .set_transfer(TransferBehavior::Fail("connection reset".into()));
        let download = Arc::new(Download::new(game("demo", "Demo")));

        download.start(&f.ctx, &f.cancel).await.unwrap();
        wait_until(|| download.is_failed()).await;
        f.ctx.tracker.close();
        f.ctx.tracker.wait().await;

        assert!(matches!(download.error(), Some(DownloadError::Transfer(_))));
        assert!(!f.dir.path().join("demo.zip").exists());
        assert_eq!(
            f.status.next().unwrap().text,
            "Error downloading game: Demo"
        );
    }

    #[tokio::test]
    async fn stop_cancels_transfer_and_stays_stopped() {
        let f = fixture();
        f.remote.set_transfer(TransferBehavior::Hang);
        let download = Arc::new(Download::new(game("demo", "Demo")));

        download.start(&f.ctx, &f.cancel).await.unwrap();
        assert!(download.is_transferring());
        assert!(f.dir.path().join("demo.zip").exists());

        download.stop();
        download.stop();
        f.ctx.tracker.close();
        f.ctx.tracker.wait().await;

        assert!(download.is_stopped());
        assert!(!download.is_complete());
        assert!(!f.dir.path().join("demo.zip").exists());
        assert_eq!(f.status.pending(), 0);
        let fixed = download.duration();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(download.duration(), fixed);
    }

    #[tokio::test]
    async fn session_cancellation_fails_download_as_cancelled() {
        let f = fixture();
        f.remote.set_transfer(TransferBehavior::Hang);
        let download = Arc::new(Download::new(game("demo", "Demo")));

        download.start(&f.ctx, &f.cancel).await.unwrap();
        f.cancel.cancel();
        f.ctx.tracker.close();
        f.ctx.tracker.wait().await;

        assert!(download.is_failed());
        assert_eq!(download.error(), Some(DownloadError::Cancelled));
        assert_eq!(f.status.pending(), 0);
    }

    #[tokio::test]
    async fn stop_before_start_prevents_start() {
        let f = fixture();
        let download = Arc::new(Download::new(game("demo", "Demo")));
        download.stop();

        assert_eq!(
            download.start(&f.ctx, &f.cancel).await,
            Err(DownloadError::AlreadyStarted)
        );
        assert_eq!(f.remote.transfer_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_subscribers_follow_the_running_phase() {
        let f = fixture();
        f.remote.set_transfer(TransferBehavior::Hang);
        let download = Arc::new(Download::new(game("demo", "Demo")));
        let (tx, mut rx) = lanty_pubsub::channel();
        download.subscribe_progress(tx.clone());

        download.start(&f.ctx, &f.cancel).await.unwrap();
        let transfer = download.read().transfer.clone().unwrap();
        assert_eq!(transfer.events().len(), 1);
        transfer.advance(MB);
        assert_eq!(rx.recv().await, Some(()));

        assert!(download.unsubscribe_progress(&tx));
        assert!(transfer.events().is_empty());
        download.stop();
    }
}
