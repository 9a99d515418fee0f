//! In-memory server doubles for controller tests.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanty_protocol::{ClientConfig, FileReference, Game, Icon, Message, User};
use lanty_transfer::{PhaseHandle, PhaseOutcome, PhaseProgress};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::RemoteError;
use crate::remote::{BoxFuture, ChatConnection, RemoteClient};

pub(crate) const MB: u64 = 1024 * 1024;

pub(crate) fn game(slug: &str, name: &str) -> Game {
    Game {
        slug: slug.into(),
        name: name.into(),
        version: "1.0".into(),
        client: ClientConfig {
            executable: format!("{slug}.exe"),
            connect_argument: String::new(),
        },
        server: None,
    }
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// What [`MockRemote::start_transfer`] does.
#[derive(Debug, Clone)]
pub(crate) enum TransferBehavior {
    /// The request itself fails.
    Refuse(RemoteError),
    /// The transfer starts and then fails.
    Fail(String),
    /// The transfer writes a partial file and runs until cancelled.
    Hang,
    /// Writes a zip with `<slug>.exe` and reports `reported_size` bytes.
    Archive { reported_size: u64 },
    /// Completes with a file that is not a zip archive.
    Corrupt,
}

pub(crate) struct MockRemote {
    games: Mutex<BTreeMap<String, Game>>,
    failing_icons: Mutex<HashSet<String>>,
    broken_games: Mutex<HashSet<String>>,
    pub icon_calls: AtomicUsize,
    health: Mutex<Result<(), RemoteError>>,
    base_url: Mutex<Option<String>>,
    transfer: Mutex<TransferBehavior>,
    pub transfer_calls: AtomicUsize,
    roster: Mutex<BTreeMap<String, User>>,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub roster_calls: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_fetch: AtomicBool,
    chat: Arc<MockChat>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            games: Mutex::new(BTreeMap::new()),
            failing_icons: Mutex::new(HashSet::new()),
            broken_games: Mutex::new(HashSet::new()),
            icon_calls: AtomicUsize::new(0),
            health: Mutex::new(Ok(())),
            base_url: Mutex::new(None),
            transfer: Mutex::new(TransferBehavior::Archive {
                reported_size: 100 * MB,
            }),
            transfer_calls: AtomicUsize::new(0),
            roster: Mutex::new(BTreeMap::new()),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            roster_calls: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            chat: Arc::new(MockChat::new()),
        }
    }

    pub fn set_games(&self, games: Vec<Game>) {
        *self.games.lock().unwrap() = games.into_iter().map(|g| (g.slug.clone(), g)).collect();
    }

    pub fn fail_icon(&self, slug: &str) {
        self.failing_icons.lock().unwrap().insert(slug.into());
    }

    /// Keeps `slug` in the slug list but fails its record fetch.
    pub fn break_game(&self, slug: &str) {
        self.broken_games.lock().unwrap().insert(slug.into());
    }

    pub fn heal_icons(&self) {
        self.failing_icons.lock().unwrap().clear();
    }

    pub fn set_health(&self, health: Result<(), RemoteError>) {
        *self.health.lock().unwrap() = health;
    }

    pub fn base_url(&self) -> Option<String> {
        self.base_url.lock().unwrap().clone()
    }

    pub fn set_transfer(&self, behavior: TransferBehavior) {
        *self.transfer.lock().unwrap() = behavior;
    }

    pub fn add_present_user(&self, user: User) {
        self.roster
            .lock()
            .unwrap()
            .insert(user.address.clone(), user);
    }

    pub fn mock_chat(&self) -> &Arc<MockChat> {
        &self.chat
    }
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, contents) in entries {
        zip.start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

fn completed(progress: Arc<PhaseProgress>, artifact: &Path) -> PhaseHandle {
    let (handle, reporter) = PhaseHandle::channel(progress, artifact);
    reporter.report(PhaseOutcome::Completed);
    handle
}

impl RemoteClient for MockRemote {
    fn game_slugs(&self) -> BoxFuture<'_, Result<Vec<String>, RemoteError>> {
        let slugs = self.games.lock().unwrap().keys().cloned().collect();
        Box::pin(async move { Ok(slugs) })
    }

    fn game(&self, slug: &str) -> BoxFuture<'_, Result<Game, RemoteError>> {
        let game = self
            .games
            .lock()
            .unwrap()
            .get(slug)
            .filter(|_| !self.broken_games.lock().unwrap().contains(slug))
            .cloned();
        let slug = slug.to_string();
        Box::pin(async move {
            game.ok_or_else(|| RemoteError::Status {
                status: 404,
                message: format!("unknown game {slug}"),
            })
        })
    }

    fn game_icon(&self, slug: &str) -> BoxFuture<'_, Result<Icon, RemoteError>> {
        self.icon_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_icons.lock().unwrap().contains(slug);
        Box::pin(async move {
            if failing {
                return Err(RemoteError::Other("icon unavailable".into()));
            }
            Ok(Icon {
                content_type: "image/png".into(),
                data: vec![0x89, b'P', b'N', b'G'],
            })
        })
    }

    fn start_transfer(
        &self,
        game: &Game,
        directory: &Path,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<PhaseHandle, RemoteError>> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.transfer.lock().unwrap().clone();
        let artifact = directory.join(format!("{}.zip", game.slug));
        let executable = game.client.executable.clone();
        Box::pin(async move {
            match behavior {
                TransferBehavior::Refuse(e) => Err(e),
                TransferBehavior::Fail(reason) => {
                    std::fs::write(&artifact, b"partial").unwrap();
                    let progress = Arc::new(PhaseProgress::new(10 * MB));
                    let (handle, reporter) = PhaseHandle::channel(progress, &artifact);
                    reporter.report(PhaseOutcome::Failed(reason));
                    Ok(handle)
                }
                TransferBehavior::Hang => {
                    std::fs::write(&artifact, b"partial").unwrap();
                    let progress = Arc::new(PhaseProgress::new(10 * MB));
                    let (handle, reporter) = PhaseHandle::channel(progress, &artifact);
                    tokio::spawn(async move {
                        cancel.cancelled().await;
                        reporter.report(PhaseOutcome::Cancelled);
                    });
                    Ok(handle)
                }
                TransferBehavior::Archive { reported_size } => {
                    write_zip(
                        &artifact,
                        &[(executable.as_str(), &b"MZ"[..]), ("data/readme.txt", &b"have fun"[..])],
                    );
                    let progress = Arc::new(PhaseProgress::new(reported_size));
                    progress.advance(reported_size);
                    Ok(completed(progress, &artifact))
                }
                TransferBehavior::Corrupt => {
                    std::fs::write(&artifact, b"this is not a zip archive").unwrap();
                    let progress = Arc::new(PhaseProgress::new(25));
                    progress.advance(25);
                    Ok(completed(progress, &artifact))
                }
            }
        })
    }

    fn user_addresses(&self) -> BoxFuture<'_, Result<Vec<String>, RemoteError>> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        let addresses = self.roster.lock().unwrap().keys().cloned().collect();
        Box::pin(async move { Ok(addresses) })
    }

    fn user(&self, address: &str) -> BoxFuture<'_, Result<User, RemoteError>> {
        let user = self.roster.lock().unwrap().get(address).cloned();
        Box::pin(async move { user.ok_or_else(|| RemoteError::Other("gone".into())) })
    }

    fn create_user(&self, user: &User) -> BoxFuture<'_, Result<User, RemoteError>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_create.load(Ordering::SeqCst) {
            Err(RemoteError::Connect("refused".into()))
        } else {
            let registered = User {
                name: user.name.clone(),
                address: "10.0.0.5".into(),
            };
            self.add_present_user(registered.clone());
            Ok(registered)
        };
        Box::pin(async move { result })
    }

    fn update_user(&self, user: &User) -> BoxFuture<'_, Result<User, RemoteError>> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_update.load(Ordering::SeqCst) {
            Err(RemoteError::Status {
                status: 404,
                message: "unknown user".into(),
            })
        } else {
            self.add_present_user(user.clone());
            Ok(user.clone())
        };
        Box::pin(async move { result })
    }

    fn upload_file(&self, path: &Path) -> BoxFuture<'_, Result<FileReference, RemoteError>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let fail = self.fail_upload.load(Ordering::SeqCst);
        Box::pin(async move {
            if fail {
                return Err(RemoteError::Connect("refused".into()));
            }
            Ok(FileReference {
                url: format!("http://localhost:8000/files/{name}"),
                name,
                size: 3,
            })
        })
    }

    fn fetch_file(
        &self,
        file: &FileReference,
        directory: &Path,
        _cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<PhaseHandle, RemoteError>> {
        let artifact = directory.join(&file.name);
        let fail = self.fail_fetch.load(Ordering::SeqCst);
        Box::pin(async move {
            let progress = Arc::new(PhaseProgress::new(3));
            let (handle, reporter) = PhaseHandle::channel(progress, &artifact);
            if fail {
                reporter.report(PhaseOutcome::Failed("connection reset".into()));
            } else {
                std::fs::write(&artifact, b"abc").unwrap();
                reporter.progress().advance(3);
                reporter.report(PhaseOutcome::Completed);
            }
            Ok(handle)
        })
    }

    fn health(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
        let health = self.health.lock().unwrap().clone();
        Box::pin(async move { health })
    }

    fn set_base_url(&self, url: &Url) -> Result<(), RemoteError> {
        *self.base_url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    fn chat(&self) -> Arc<dyn ChatConnection> {
        self.chat.clone()
    }
}

pub(crate) struct MockChat {
    pub connects: AtomicUsize,
    pub reconnects: AtomicUsize,
    pub disconnects: AtomicUsize,
    error: Mutex<Option<RemoteError>>,
    sent: Mutex<Vec<Message>>,
    inbound_tx: mpsc::Sender<Message>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
}

impl MockChat {
    fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        Self {
            connects: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            error: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }
    }

    pub fn break_connection(&self) {
        *self.error.lock().unwrap() = Some(RemoteError::Connect("reset by peer".into()));
    }

    pub async fn deliver(&self, message: Message) {
        self.inbound_tx.send(message).await.unwrap();
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChatConnection for MockChat {
    fn connect(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn reconnect(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        *self.error.lock().unwrap() = None;
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }

    fn error(&self) -> Option<RemoteError> {
        self.error.lock().unwrap().clone()
    }

    fn send(&self, message: &Message) -> BoxFuture<'_, Result<(), RemoteError>> {
        self.sent.lock().unwrap().push(message.clone());
        Box::pin(async { Ok(()) })
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbound_rx.lock().unwrap().take()
    }
}
