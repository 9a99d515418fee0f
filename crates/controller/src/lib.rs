//! Client-side orchestration for Lanty.
//!
//! [`Controller::start`] builds every component inside one cancellable
//! session and spawns their background loops:
//!
//! - [`GameCatalog`] polls the server catalog and caches icons.
//! - [`DownloadQueue`] starts queued [`Download`]s and bounds retries.
//! - [`Presence`] keeps the local user registered and the roster fresh.
//! - [`ChatSession`] watches the chat connection and fans messages out.
//! - [`ConnectionMonitor`] tracks server reachability.
//!
//! Components never call into the presentation layer. They publish "changed"
//! notifications through [`lanty_pubsub::Publisher`] and expose lock-guarded
//! getters for the current state.

pub mod catalog;
pub mod chat;
pub mod config;
pub mod connection;
pub mod download;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod presence;
pub mod queue;
pub mod remote;
pub mod settings;
pub mod status;

#[cfg(test)]
mod testing;

pub use catalog::GameCatalog;
pub use chat::ChatSession;
pub use config::{Backoff, ControllerConfig, RetryPolicy};
pub use connection::{ConnectionMonitor, ConnectionStatus};
pub use download::{Download, Phase};
pub use error::{ControllerError, DownloadError, RemoteError};
pub use orchestrator::Controller;
pub use presence::{Presence, PresenceState};
pub use queue::DownloadQueue;
pub use remote::{BoxFuture, ChatConnection, RemoteClient};
pub use settings::SettingsController;
pub use status::StatusController;
