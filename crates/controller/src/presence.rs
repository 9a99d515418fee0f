use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use lanty_protocol::{User, Users};
use lanty_pubsub::Publisher;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::error::RemoteError;
use crate::remote::RemoteClient;
use crate::settings::SettingsController;

/// Whether the local identity is registered with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceState {
    #[default]
    LoggedOut,
    LoggedIn,
}

struct PresenceInner {
    user: User,
    state: PresenceState,
    roster: Arc<Users>,
    error: Option<RemoteError>,
}

/// Keeps the local identity registered and the roster current.
///
/// Each cycle either sends a keep-alive (logged in) or tries to log in
/// (logged out), then refreshes the roster. A failed keep-alive only drops
/// the state; the login attempt waits for the next cycle.
pub struct Presence {
    remote: Arc<dyn RemoteClient>,
    settings: Arc<SettingsController>,
    inner: RwLock<PresenceInner>,
    events: Publisher<()>,
}

impl Presence {
    pub fn new(remote: Arc<dyn RemoteClient>, settings: Arc<SettingsController>) -> Self {
        let user = User::new(settings.settings().username);
        Self {
            remote,
            settings,
            inner: RwLock::new(PresenceInner {
                user,
                state: PresenceState::LoggedOut,
                roster: Arc::new(Users::new()),
                error: None,
            }),
            events: Publisher::new(),
        }
    }

    /// The local identity. Its address is empty until the first login.
    pub fn user(&self) -> User {
        self.read().user.clone()
    }

    pub fn state(&self) -> PresenceState {
        self.read().state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == PresenceState::LoggedIn
    }

    pub fn users(&self) -> Arc<Users> {
        Arc::clone(&self.read().roster)
    }

    pub fn error(&self) -> Option<RemoteError> {
        self.read().error.clone()
    }

    pub fn subscribe(&self, tx: mpsc::Sender<()>) {
        self.events.subscribe(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<()>) -> bool {
        self.events.unsubscribe(tx)
    }

    /// One keep-alive or login attempt, followed by a roster refresh.
    pub async fn cycle(&self) {
        let (user, state) = {
            let inner = self.read();
            (inner.user.clone(), inner.state)
        };
        match state {
            PresenceState::LoggedIn => self.keep_alive(&user).await,
            PresenceState::LoggedOut => self.login(&user).await,
        }
        self.refresh().await;
    }

    async fn login(&self, user: &User) {
        match self.remote.create_user(&User::new(user.name.clone())).await {
            Ok(registered) => {
                {
                    let mut inner = self.write();
                    inner.user.address = registered.address;
                    inner.state = PresenceState::LoggedIn;
                    inner.error = None;
                }
                debug!(name = %user.name, "logged in");
                self.events.notify(());
            }
            Err(e) => {
                warn!(name = %user.name, error = %e, "login failed");
                self.write().error = Some(e);
            }
        }
    }

    async fn keep_alive(&self, user: &User) {
        if let Err(e) = self.remote.update_user(user).await {
            warn!(name = %user.name, error = %e, "keep-alive failed, logging out");
            {
                let mut inner = self.write();
                inner.state = PresenceState::LoggedOut;
                inner.error = Some(e);
            }
            self.events.notify(());
        }
    }

    /// Fetches the roster and swaps it in if it changed.
    pub async fn refresh(&self) {
        let roster = match self.fetch_roster().await {
            Ok(roster) => roster,
            Err(e) => {
                warn!(error = %e, "failed to fetch users");
                self.write().error = Some(e);
                return;
            }
        };
        let changed = {
            let mut inner = self.write();
            if *inner.roster == roster {
                false
            } else {
                debug!(users = roster.len(), "roster changed");
                inner.roster = Arc::new(roster);
                true
            }
        };
        if changed {
            self.events.notify(());
        }
    }

    async fn fetch_roster(&self) -> Result<Users, RemoteError> {
        let mut users = Users::new();
        for address in self.remote.user_addresses().await? {
            users.add(self.remote.user(&address).await?)?;
        }
        Ok(users)
    }

    /// Adopts the configured username. Returns whether it differed.
    fn apply_username(&self) -> bool {
        let name = self.settings.settings().username;
        let mut inner = self.write();
        if inner.user.name == name {
            return false;
        }
        debug!(old = %inner.user.name, new = %name, "username changed");
        inner.user.name = name;
        true
    }

    pub(crate) fn spawn(
        self: &Arc<Self>,
        tracker: &TaskTracker,
        cancel: CancellationToken,
        period: Duration,
    ) {
        let presence = Arc::clone(self);
        tracker.spawn(async move {
            let (settings_tx, mut settings_rx) = lanty_pubsub::channel();
            presence.settings.subscribe(settings_tx.clone());
            // Single slot: bursts of ticks and changes collapse into one cycle.
            let (work_tx, mut work_rx) = mpsc::channel::<()>(1);

            presence.cycle().await;

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    Some(()) = settings_rx.recv() => {
                        if presence.apply_username() {
                            let _ = work_tx.try_send(());
                        }
                    }
                    _ = ticker.tick() => {
                        let _ = work_tx.try_send(());
                    }
                    Some(()) = work_rx.recv() => presence.cycle().await,
                }
            }
            presence.settings.unsubscribe(&settings_tx);
            trace!("presence loop stopped");
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, PresenceInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresenceInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
