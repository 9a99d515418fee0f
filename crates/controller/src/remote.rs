//! The narrow surface through which the controller talks to the server.
//!
//! The transport (HTTP, websocket, ...) lives behind these traits. The
//! application implements them on top of its API client; tests use the
//! in-memory mocks.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use lanty_protocol::{FileReference, Game, Icon, Message, User};
use lanty_transfer::PhaseHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::RemoteError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Calls against the Lanty server.
pub trait RemoteClient: Send + Sync {
    /// Slugs of every game in the catalog.
    fn game_slugs(&self) -> BoxFuture<'_, Result<Vec<String>, RemoteError>>;

    fn game(&self, slug: &str) -> BoxFuture<'_, Result<Game, RemoteError>>;

    fn game_icon(&self, slug: &str) -> BoxFuture<'_, Result<Icon, RemoteError>>;

    /// Starts downloading the game archive into `directory`.
    ///
    /// Resolves once the transfer is under way. The handle's artifact is the
    /// archive path; cancelling `cancel` must end the phase with
    /// [`PhaseOutcome::Cancelled`](lanty_transfer::PhaseOutcome::Cancelled).
    fn start_transfer(
        &self,
        game: &Game,
        directory: &Path,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<PhaseHandle, RemoteError>>;

    /// Addresses of every user currently present.
    fn user_addresses(&self) -> BoxFuture<'_, Result<Vec<String>, RemoteError>>;

    fn user(&self, address: &str) -> BoxFuture<'_, Result<User, RemoteError>>;

    /// Registers `user`; the server answers with the assigned address.
    fn create_user(&self, user: &User) -> BoxFuture<'_, Result<User, RemoteError>>;

    /// Keep-alive for a registered user. Also carries name changes.
    fn update_user(&self, user: &User) -> BoxFuture<'_, Result<User, RemoteError>>;

    fn upload_file(&self, path: &Path) -> BoxFuture<'_, Result<FileReference, RemoteError>>;

    /// Starts downloading a chat attachment into `directory`.
    fn fetch_file(
        &self,
        file: &FileReference,
        directory: &Path,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<PhaseHandle, RemoteError>>;

    fn health(&self) -> BoxFuture<'_, Result<(), RemoteError>>;

    /// Points every later call at a new server.
    fn set_base_url(&self, url: &Url) -> Result<(), RemoteError>;

    /// The chat connection. Always the same instance.
    fn chat(&self) -> Arc<dyn ChatConnection>;
}

/// A long-lived chat connection.
///
/// Inbound messages arrive on a single channel that survives reconnects;
/// [`take_inbound`](Self::take_inbound) hands it out once.
pub trait ChatConnection: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<(), RemoteError>>;

    fn reconnect(&self) -> BoxFuture<'_, Result<(), RemoteError>>;

    fn disconnect(&self) -> BoxFuture<'_, ()>;

    /// The error that broke the connection, if it is broken.
    fn error(&self) -> Option<RemoteError>;

    fn send(&self, message: &Message) -> BoxFuture<'_, Result<(), RemoteError>>;

    fn take_inbound(&self) -> Option<mpsc::Receiver<Message>>;
}
