//! Game records and the slug-keyed catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::argument::Argument;

/// How the client binary of a game is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub executable: String,
    /// Argument used to join a running server, e.g. `+connect`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connect_argument: String,
}

impl ClientConfig {
    /// Whether the client can be pointed at a server on the command line.
    pub fn can_connect(&self) -> bool {
        !self.connect_argument.is_empty()
    }
}

/// How a dedicated server of a game is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub executable: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Argument>,
}

impl ServerConfig {
    /// Renders every enabled argument into a single command line.
    pub fn command_line(&self) -> String {
        self.arguments
            .iter()
            .filter_map(Argument::render)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A game advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub client: ClientConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

impl Game {
    /// Whether `other` describes the same game (slug identity).
    pub fn same_game(&self, other: &Game) -> bool {
        self.slug == other.slug
    }

    /// Whether the game ships a dedicated server.
    pub fn can_start_server(&self) -> bool {
        self.server
            .as_ref()
            .is_some_and(|server| !server.executable.is_empty())
    }
}

/// Raw icon bytes as served by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// The catalog: a slug-keyed collection of games.
///
/// Two catalogs are equal when they hold the same slugs and every record
/// compares equal, so a version bump on the server counts as a change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Games {
    games: BTreeMap<String, Game>,
}

impl Games {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a game, rejecting a second record with the same slug.
    pub fn add(&mut self, game: Game) -> Result<(), ProtocolError> {
        if self.games.contains_key(&game.slug) {
            return Err(ProtocolError::DuplicateSlug(game.slug));
        }
        self.games.insert(game.slug.clone(), game);
        Ok(())
    }

    /// Looks up a game by slug.
    pub fn get(&self, slug: &str) -> Result<&Game, ProtocolError> {
        self.games
            .get(slug)
            .ok_or_else(|| ProtocolError::UnknownSlug(slug.to_string()))
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.games.contains_key(slug)
    }

    /// Games ordered by slug.
    pub fn games(&self) -> impl Iterator<Item = &Game> {
        self.games.values()
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.games.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl TryFrom<Vec<Game>> for Games {
    type Error = ProtocolError;

    fn try_from(list: Vec<Game>) -> Result<Self, Self::Error> {
        let mut games = Games::new();
        for game in list {
            games.add(game)?;
        }
        Ok(games)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::ArgumentBase;

    fn game(slug: &str, version: &str) -> Game {
        Game {
            slug: slug.into(),
            name: slug.to_uppercase(),
            version: version.into(),
            client: ClientConfig {
                executable: format!("{slug}.exe"),
                connect_argument: String::new(),
            },
            server: None,
        }
    }

    fn flag(name: &str, flag: &str) -> ArgumentBase {
        ArgumentBase {
            name: name.into(),
            flag: flag.into(),
            mandatory: false,
            disabled: false,
        }
    }

    #[test]
    fn command_line_joins_enabled_arguments() {
        let mut server = ServerConfig {
            executable: "srcds".into(),
            arguments: vec![
                Argument::Text {
                    base: flag("map", "+map"),
                    value: "de_dust2".into(),
                    default: "de_dust2".into(),
                },
                Argument::Integer {
                    base: flag("port", "-port"),
                    value: 27015,
                    default: 27015,
                    min: 1024,
                    max: 65535,
                },
                Argument::Boolean {
                    base: flag("insecure", "-insecure"),
                    value: false,
                    default: false,
                },
            ],
        };
        assert_eq!(server.command_line(), "+map de_dust2 -port 27015");

        server.arguments[0].disable();
        assert_eq!(server.command_line(), "-port 27015");
    }

    #[test]
    fn duplicate_slug_is_rejected() {
        let mut games = Games::new();
        games.add(game("quake", "1")).unwrap();
        let err = games.add(game("quake", "2")).unwrap_err();
        assert_eq!(err, ProtocolError::DuplicateSlug("quake".into()));
        assert_eq!(games.len(), 1);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = Games::try_from(vec![game("a", "1"), game("b", "1")]).unwrap();
        let b = Games::try_from(vec![game("b", "1"), game("a", "1")]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn version_bump_is_a_change() {
        let a = Games::try_from(vec![game("a", "1")]).unwrap();
        let b = Games::try_from(vec![game("a", "2")]).unwrap();
        assert_ne!(a, b);
        assert!(a.get("a").unwrap().same_game(b.get("a").unwrap()));
    }

    #[test]
    fn unknown_slug_lookup_fails() {
        let games = Games::new();
        assert!(matches!(
            games.get("nope"),
            Err(ProtocolError::UnknownSlug(s)) if s == "nope"
        ));
    }

    #[test]
    fn game_json_uses_camel_case() {
        let mut g = game("ut", "469");
        g.client.connect_argument = "open".into();
        let json = serde_json::to_string(&g).unwrap();
        assert!(json.contains("connectArgument"));
        assert!(!json.contains("server"));
        let parsed: Game = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, g);
        assert!(parsed.client.can_connect());
        assert!(!parsed.can_start_server());
    }
}
