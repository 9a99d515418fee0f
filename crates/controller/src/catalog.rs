use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use lanty_protocol::{Games, Icon};
use lanty_pubsub::Publisher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::error::RemoteError;
use crate::remote::RemoteClient;

#[derive(Default)]
struct CatalogState {
    games: Arc<Games>,
    icons: HashMap<String, Arc<Icon>>,
    error: Option<RemoteError>,
}

/// Cached copy of the server's game catalog and icons.
///
/// The catalog is swapped as a whole when a poll finds a difference, so a
/// reader holding the `Arc` from [`games`](Self::games) never sees a partial
/// update. Catalog changes and icon arrivals are published separately.
pub struct GameCatalog {
    remote: Arc<dyn RemoteClient>,
    state: RwLock<CatalogState>,
    events: Publisher<()>,
    icon_events: Publisher<()>,
}

impl GameCatalog {
    pub fn new(remote: Arc<dyn RemoteClient>) -> Self {
        Self {
            remote,
            state: RwLock::new(CatalogState::default()),
            events: Publisher::new(),
            icon_events: Publisher::new(),
        }
    }

    pub fn games(&self) -> Arc<Games> {
        Arc::clone(&self.read().games)
    }

    pub fn icon(&self, slug: &str) -> Option<Arc<Icon>> {
        self.read().icons.get(slug).cloned()
    }

    /// Last failure of a catalog or icon fetch. Cleared by a good poll.
    pub fn error(&self) -> Option<RemoteError> {
        self.read().error.clone()
    }

    pub fn subscribe(&self, tx: mpsc::Sender<()>) {
        self.events.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<()>) -> bool {
        self.events.unsubscribe(tx)
    }

    /// Notified when a poll caches icons that were missing.
    pub fn subscribe_icons(&self, tx: mpsc::Sender<()>) {
        self.icon_events.subscribe(tx);
    }

    pub fn unsubscribe_icons(&self, tx: &mpsc::Sender<()>) -> bool {
        self.icon_events.unsubscribe(tx)
    }

    /// Polls the catalog once, then fills in missing icons.
    ///
    /// Catalog subscribers hear only about a changed game set. Icon
    /// subscribers hear about newly cached icons.
    pub async fn refresh(&self) {
        let candidate = match self.fetch_games().await {
            Ok(games) => games,
            Err(e) => {
                warn!(error = %e, "failed to fetch games");
                self.write().error = Some(e);
                return;
            }
        };

        let changed = {
            let mut state = self.write();
            state.error = None;
            if *state.games == candidate {
                false
            } else {
                debug!(games = candidate.len(), "game catalog changed");
                state.games = Arc::new(candidate);
                let games = Arc::clone(&state.games);
                state.icons.retain(|slug, _| games.contains(slug));
                true
            }
        };

        if changed {
            self.events.notify(());
        }
        if self.refresh_icons().await > 0 {
            self.icon_events.notify(());
        }
    }

    async fn fetch_games(&self) -> Result<Games, RemoteError> {
        let mut games = Games::new();
        for slug in self.remote.game_slugs().await? {
            let game = self.remote.game(&slug).await?;
            games.add(game)?;
        }
        Ok(games)
    }

    /// Fetches icons not cached yet, stopping at the first failure.
    async fn refresh_icons(&self) -> usize {
        let missing: Vec<String> = {
            let state = self.read();
            state
                .games
                .slugs()
                .filter(|slug| !state.icons.contains_key(*slug))
                .map(str::to_string)
                .collect()
        };

        let mut fetched = 0;
        for slug in missing {
            match self.remote.game_icon(&slug).await {
                Ok(icon) => {
                    let mut state = self.write();
                    if state.games.contains(&slug) {
                        state.icons.insert(slug, Arc::new(icon));
                        fetched += 1;
                    }
                }
                Err(e) => {
                    warn!(slug = %slug, error = %e, "failed to fetch game icon");
                    self.write().error = Some(e);
                    break;
                }
            }
        }
        fetched
    }

    pub(crate) fn spawn(
        self: &Arc<Self>,
        tracker: &TaskTracker,
        cancel: CancellationToken,
        period: Duration,
    ) {
        let catalog = Arc::clone(self);
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => catalog.refresh().await,
                }
            }
            trace!("game catalog poller stopped");
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
