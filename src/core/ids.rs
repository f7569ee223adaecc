//! Game and Participant Identifiers
//!
//! All identifiers are prefixed strings: `g` for games, `p` for players and
//! `s` for spectators, followed by a simple-form UUIDv4. The prefix is what
//! lets a bare participant id be routed back to its kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! prefixed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix character for this id kind.
            pub const PREFIX: char = $prefix;

            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(format!("{}{}", Self::PREFIX, uuid::Uuid::new_v4().simple()))
            }

            /// Wrap an existing id string without validation.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }
    };
}

prefixed_id!(
    /// Unique game identifier.
    GameId,
    'g'
);

prefixed_id!(
    /// Unique player identifier.
    PlayerId,
    'p'
);

prefixed_id!(
    /// Spectator identifier (read-only access to one game).
    SpectatorId,
    's'
);

/// Anyone recorded as having access to a game.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParticipantId {
    /// A seated player.
    Player(PlayerId),
    /// The game's spectator.
    Spectator(SpectatorId),
}

impl ParticipantId {
    /// Borrow the raw string.
    pub fn as_str(&self) -> &str {
        match self {
            ParticipantId::Player(id) => id.as_str(),
            ParticipantId::Spectator(id) => id.as_str(),
        }
    }
}

/// Participant id that is neither a player nor a spectator id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("id {0} is neither a player id nor spectator id")]
pub struct InvalidParticipantId(pub String);

impl FromStr for ParticipantId {
    type Err = InvalidParticipantId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.chars().next() {
            Some(PlayerId::PREFIX) => Ok(ParticipantId::Player(PlayerId::new(s))),
            Some(SpectatorId::PREFIX) => Ok(ParticipantId::Spectator(SpectatorId::new(s))),
            _ => Err(InvalidParticipantId(s.to_string())),
        }
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = InvalidParticipantId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.as_str().to_string()
    }
}

impl From<PlayerId> for ParticipantId {
    fn from(id: PlayerId) -> Self {
        ParticipantId::Player(id)
    }
}

impl From<SpectatorId> for ParticipantId {
    fn from(id: SpectatorId) -> Self {
        ParticipantId::Spectator(id)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_carry_prefix() {
        assert!(GameId::generate().as_str().starts_with('g'));
        assert!(PlayerId::generate().as_str().starts_with('p'));
        assert!(SpectatorId::generate().as_str().starts_with('s'));
        assert_ne!(PlayerId::generate(), PlayerId::generate());
    }

    #[test]
    fn test_participant_parse_by_prefix() {
        let player: ParticipantId = "p123".parse().unwrap();
        assert_eq!(player, ParticipantId::Player(PlayerId::new("p123")));

        let spectator: ParticipantId = "s456".parse().unwrap();
        assert_eq!(spectator, ParticipantId::Spectator(SpectatorId::new("s456")));

        let err = "x789".parse::<ParticipantId>().unwrap_err();
        assert!(err.to_string().contains("neither a player id nor spectator id"));
        assert!("".parse::<ParticipantId>().is_err());
    }

    #[test]
    fn test_participant_serializes_as_string() {
        let id = ParticipantId::Player(PlayerId::new("pabc"));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pabc\"");
        let back: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
