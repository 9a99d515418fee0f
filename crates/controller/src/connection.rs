use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use lanty_pubsub::Publisher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

use crate::remote::RemoteClient;

/// Reachability of the server as seen by the last health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
}

/// Polls the server health endpoint and announces status flips.
pub struct ConnectionMonitor {
    remote: Arc<dyn RemoteClient>,
    status: RwLock<ConnectionStatus>,
    events: Publisher<()>,
}

impl ConnectionMonitor {
    pub fn new(remote: Arc<dyn RemoteClient>) -> Self {
        Self {
            remote,
            status: RwLock::new(ConnectionStatus::Disconnected),
            events: Publisher::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn subscribe(&self, tx: mpsc::Sender<()>) {
        self.events.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<()>) -> bool {
        self.events.unsubscribe(tx)
    }

    /// Runs one health check. Subscribers hear about it only on a flip.
    pub async fn check(&self) -> ConnectionStatus {
        let next = match self.remote.health().await {
            Ok(()) => ConnectionStatus::Connected,
            Err(e) => {
                trace!(error = %e, "health check failed");
                ConnectionStatus::Disconnected
            }
        };
        let previous = std::mem::replace(
            &mut *self.status.write().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        if previous != next {
            debug!(?previous, ?next, "server connection changed");
            self.events.notify(());
        }
        next
    }

    pub(crate) fn spawn(self: &Arc<Self>, tracker: &TaskTracker, cancel: CancellationToken, period: Duration) {
        let monitor = Arc::clone(self);
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.check().await;
                    }
                }
            }
            trace!("connection monitor stopped");
        });
    }
}
