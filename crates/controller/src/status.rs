use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lanty_pubsub::Publisher;
use lanty_settings::{Severity, Status, StatusQueue};
use tokio::sync::mpsc;
use tracing::debug;

/// Transient user-facing messages, drained error-first.
#[derive(Debug, Default)]
pub struct StatusController {
    queue: Mutex<StatusQueue>,
    events: Publisher<()>,
}

impl StatusController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, text: impl Into<String>, ttl: Duration) -> u64 {
        self.push(Severity::Info, text.into(), ttl)
    }

    pub fn warning(&self, text: impl Into<String>, ttl: Duration) -> u64 {
        self.push(Severity::Warning, text.into(), ttl)
    }

    pub fn error(&self, text: impl Into<String>, ttl: Duration) -> u64 {
        self.push(Severity::Error, text.into(), ttl)
    }

    /// Takes the most urgent pending status.
    pub fn next(&self) -> Option<Status> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn subscribe(&self, tx: mpsc::Sender<()>) {
        self.events.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<()>) -> bool {
        self.events.unsubscribe(tx)
    }

    fn push(&self, severity: Severity, text: String, ttl: Duration) -> u64 {
        debug!(?severity, %text, "status");
        let id = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(severity, text, ttl);
        self.events.notify(());
        id
    }
}

#[cfg(test)]
mod tests {
    use lanty_settings::DEFAULT_TTL;

    use super::*;

    #[tokio::test]
    async fn push_notifies_and_next_drains_error_first() {
        let status = StatusController::new();
        let (tx, mut rx) = lanty_pubsub::channel();
        status.subscribe(tx);

        status.info("Uploading file", DEFAULT_TTL);
        status.error("Error downloading game: Quake", DEFAULT_TTL);
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, Some(()));

        assert_eq!(status.pending(), 2);
        assert_eq!(status.next().unwrap().severity, Severity::Error);
        assert_eq!(status.next().unwrap().text, "Uploading file");
        assert!(status.next().is_none());
    }
}
