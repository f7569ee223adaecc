//! Snapshot store contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::ids::{GameId, ParticipantId};

use super::error::Result;
use super::snapshot::{CloneableGame, GameResults, NewSnapshot, SaveId, Snapshot, UpsertOutcome};

/// Append-only, per-game, per-version storage of serialized games.
///
/// Implementations hold no notion of "the next version": callers pick the
/// `save_id` and [`upsert`](Self::upsert) reports whether the row was new.
/// Concurrent writers to the same `(game_id, save_id)` are not serialized
/// beyond what the backend's single-row write provides.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Backend label reported in statistics.
    fn kind(&self) -> &'static str;

    /// Every game with at least one stored version.
    async fn game_ids(&self) -> Result<Vec<GameId>>;

    /// Highest version of a game.
    async fn latest(&self, game_id: &GameId) -> Result<Snapshot>;

    /// Exact version of a game.
    async fn version(&self, game_id: &GameId, save_id: SaveId) -> Result<Snapshot>;

    /// Stored version numbers of a game, ascending. Empty if unknown.
    async fn save_ids(&self, game_id: &GameId) -> Result<Vec<SaveId>>;

    /// Seeds (version 0) with their player counts.
    async fn cloneable_games(&self) -> Result<Vec<CloneableGame>>;

    /// Insert `(game_id, save_id)` or overwrite its payload in place.
    async fn upsert(&self, snapshot: NewSnapshot) -> Result<UpsertOutcome>;

    /// Delete the `count` highest non-seed versions. Returns rows removed.
    async fn delete_recent(&self, game_id: &GameId, count: u32) -> Result<usize>;

    /// Delete versions strictly between `after` and `before`. Returns rows removed.
    async fn delete_between(&self, game_id: &GameId, after: SaveId, before: SaveId) -> Result<usize>;

    /// Flag every version finished and record the completion time.
    async fn mark_finished(&self, game_id: &GameId, completed_at: DateTime<Utc>) -> Result<()>;

    /// Delete all versions of never-finished games created before `cutoff`.
    async fn purge_unfinished_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<GameId>>;

    /// Record who may access a game. Fails if already recorded.
    async fn store_participants(&self, game_id: &GameId, participants: &[ParticipantId]) -> Result<()>;

    /// Every ledger row as `(game_id, participant)`.
    async fn participant_rows(&self) -> Result<Vec<(GameId, ParticipantId)>>;

    /// Game a participant belongs to.
    async fn game_id_for(&self, participant: &ParticipantId) -> Result<GameId>;

    /// Record the outcome of a finished game, replacing any earlier record.
    async fn store_results(&self, results: &GameResults) -> Result<()>;

    /// Recorded outcome of a finished game.
    async fn results(&self, game_id: &GameId) -> Result<GameResults>;

    /// Backend-specific size and utilization metrics.
    async fn storage_stats(&self) -> Result<BTreeMap<String, serde_json::Value>>;
}
