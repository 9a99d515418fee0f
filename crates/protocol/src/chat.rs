//! Chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::User;

/// A file uploaded to the server and referenced from a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub user: User,
    pub text: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMessage {
    pub user: User,
    pub file: FileReference,
    pub time: DateTime<Utc>,
}

/// A chat message, tagged by kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text(TextMessage),
    File(FileMessage),
}

impl Message {
    /// Creates a text message stamped with the current time.
    pub fn text(user: User, text: impl Into<String>) -> Self {
        Message::Text(TextMessage {
            user,
            text: text.into(),
            time: Utc::now(),
        })
    }

    /// Creates a message referencing an uploaded file.
    pub fn file(user: User, file: FileReference) -> Self {
        Message::File(FileMessage {
            user,
            file,
            time: Utc::now(),
        })
    }

    pub fn user(&self) -> &User {
        match self {
            Message::Text(m) => &m.user,
            Message::File(m) => &m.user,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Message::Text(m) => m.time,
            Message::File(m) => m.time,
        }
    }

    /// Display text: the body of a text message, the file name otherwise.
    pub fn body(&self) -> &str {
        match self {
            Message::Text(m) => &m.text,
            Message::File(m) => &m.file.name,
        }
    }
}
