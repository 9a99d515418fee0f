use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::progress::PhaseProgress;

/// How a phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    /// The phase's cancellation token fired. Not an error.
    Cancelled,
    Failed(String),
}

impl PhaseOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PhaseOutcome::Cancelled)
    }
}

/// Consumer side of a running phase: progress plus a completion signal.
#[derive(Debug)]
pub struct PhaseHandle {
    progress: Arc<PhaseProgress>,
    artifact: PathBuf,
    done: oneshot::Receiver<PhaseOutcome>,
}

/// Producer side of a running phase. Dropping it without reporting counts
/// as a failure.
#[derive(Debug)]
pub struct PhaseReporter {
    progress: Arc<PhaseProgress>,
    done: oneshot::Sender<PhaseOutcome>,
}

impl PhaseHandle {
    /// Creates a connected handle/reporter pair.
    ///
    /// `artifact` is the file the phase produces or consumes; for a transfer
    /// it is the downloaded archive.
    pub fn channel(
        progress: Arc<PhaseProgress>,
        artifact: impl Into<PathBuf>,
    ) -> (PhaseHandle, PhaseReporter) {
        let (tx, rx) = oneshot::channel();
        let handle = PhaseHandle {
            progress: Arc::clone(&progress),
            artifact: artifact.into(),
            done: rx,
        };
        (handle, PhaseReporter { progress, done: tx })
    }

    pub fn progress(&self) -> &Arc<PhaseProgress> {
        &self.progress
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Waits for the phase to end.
    pub async fn wait(self) -> PhaseOutcome {
        self.done
            .await
            .unwrap_or_else(|_| PhaseOutcome::Failed("phase ended without reporting".into()))
    }
}

impl PhaseReporter {
    pub fn progress(&self) -> &Arc<PhaseProgress> {
        &self.progress
    }

    /// Stops the phase clock and delivers the outcome.
    pub fn report(self, outcome: PhaseOutcome) {
        self.progress.finish();
        let _ = self.done.send(outcome);
    }
}
