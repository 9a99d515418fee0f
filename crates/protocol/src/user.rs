//! Users and the presence roster.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// A user as registered on the server.
///
/// `address` is assigned by the server on login; it is empty for an
/// identity that has not been registered yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    #[serde(default, rename = "ip", skip_serializing_if = "String::is_empty")]
    pub address: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: String::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.address.is_empty()
    }
}

/// The roster: users currently present, keyed by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Users {
    users: BTreeMap<String, User>,
}

impl Users {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user, rejecting a second entry for the same address.
    pub fn add(&mut self, user: User) -> Result<(), ProtocolError> {
        if self.users.contains_key(&user.address) {
            return Err(ProtocolError::DuplicateUser(user.address));
        }
        self.users.insert(user.address.clone(), user);
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&User> {
        self.users.get(address)
    }

    /// Users ordered by address.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
