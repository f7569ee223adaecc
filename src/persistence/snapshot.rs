//! Stored game versions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::hash::{snapshot_digest, SnapshotHash};
use crate::core::ids::{GameId, PlayerId};
use crate::game::state::{Game, GameOptions, GameStatus};

use super::error::Result;

/// Per-game version number. `0` is the permanent seed.
pub type SaveId = u32;

/// The seed version, never removed by undo or compaction.
pub const SEED_SAVE_ID: SaveId = 0;

/// One immutable version of a game, keyed by `(game_id, save_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Game identifier.
    pub game_id: GameId,
    /// Version number.
    pub save_id: SaveId,
    /// Serialized game (opaque to the store).
    pub game: String,
    /// Seated players at save time.
    pub players: u32,
    /// When the row was first inserted.
    pub created_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: GameStatus,
}

impl Snapshot {
    /// Deserialize the stored game.
    pub fn decode(&self) -> Result<Game> {
        Ok(Game::from_json(&self.game)?)
    }

    /// Digest of this version, for audit logs.
    pub fn digest(&self) -> SnapshotHash {
        snapshot_digest(self.game_id.as_str(), self.save_id, &self.game)
    }
}

/// Row handed to [`SnapshotStore::upsert`](super::store::SnapshotStore::upsert).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSnapshot {
    /// Game identifier.
    pub game_id: GameId,
    /// Version number to write.
    pub save_id: SaveId,
    /// Serialized game.
    pub game: String,
    /// Seated players.
    pub players: u32,
    /// Insert time; kept from the first insert when the row already exists.
    pub created_at: DateTime<Utc>,
}

impl NewSnapshot {
    /// Serialize `game` at its current `last_save_id`.
    pub fn from_game(game: &Game) -> Result<Self> {
        Ok(Self {
            game_id: game.id.clone(),
            save_id: game.last_save_id,
            game: game.to_json()?,
            players: game.player_count() as u32,
            created_at: Utc::now(),
        })
    }

    /// Digest of the row about to be written.
    pub fn digest(&self) -> SnapshotHash {
        snapshot_digest(self.game_id.as_str(), self.save_id, &self.game)
    }
}

/// Outcome of an upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// True when this write created the row; false when it overwrote one.
    pub inserted: bool,
}

/// A seed available for cloning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneableGame {
    /// Game identifier.
    pub game_id: GameId,
    /// Seated players in the seed.
    pub player_count: u32,
}

/// Final standing of one player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub player: PlayerId,
    pub name: String,
    /// Resource totals at the end of the game.
    pub resources: BTreeMap<String, i64>,
}

/// Summary written once a game is finalized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResults {
    pub game_id: GameId,
    /// Seed the game was cloned from, if any.
    pub seed_game_id: Option<GameId>,
    pub players: u32,
    pub generations: u32,
    pub options: GameOptions,
    pub scores: Vec<PlayerScore>,
}

impl GameResults {
    pub fn from_game(game: &Game) -> Self {
        Self {
            game_id: game.id.clone(),
            seed_game_id: game.options.cloned_game_id.clone(),
            players: game.player_count() as u32,
            generations: game.generation,
            options: game.options.clone(),
            scores: game
                .players
                .iter()
                .map(|p| PlayerScore {
                    player: p.id.clone(),
                    name: p.name.clone(),
                    resources: p.resources.clone(),
                })
                .collect(),
        }
    }
}
