//! Value types exchanged with the Lanty server.
//!
//! Everything in here is an immutable record as far as the client is
//! concerned: catalogs and rosters are rebuilt from scratch on every poll
//! and swapped in whole, never patched in place.

pub mod argument;
pub mod chat;
pub mod game;
pub mod user;

pub use argument::{Argument, ArgumentBase, ChoiceItem};
pub use chat::{FileMessage, FileReference, Message, TextMessage};
pub use game::{ClientConfig, Game, Games, Icon, ServerConfig};
pub use user::{User, Users};

/// Errors produced while assembling protocol collections.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("duplicate game slug: {0}")]
    DuplicateSlug(String),

    #[error("duplicate user address: {0}")]
    DuplicateUser(String),

    #[error("unknown game slug: {0}")]
    UnknownSlug(String),

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },
}
