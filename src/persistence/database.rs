//! Database facade.
//!
//! One instance per process, built at startup and shared by reference. Wraps
//! a snapshot store with the save coordinator, retention manager and save
//! statistics.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::core::ids::{GameId, ParticipantId};
use crate::game::state::Game;

use super::coordinator::SaveCoordinator;
use super::error::Result;
use super::retention::{RetentionManager, RetentionPolicy, UndoReport};
use super::snapshot::{CloneableGame, GameResults, SaveId, Snapshot, SEED_SAVE_ID};
use super::stats::SaveStatistics;
use super::store::SnapshotStore;

/// Every persistence operation the game server uses.
pub struct Database {
    store: Arc<dyn SnapshotStore>,
    stats: Arc<SaveStatistics>,
    coordinator: SaveCoordinator,
    retention: RetentionManager,
}

impl Database {
    pub fn new(store: Arc<dyn SnapshotStore>, policy: RetentionPolicy) -> Self {
        let stats = Arc::new(SaveStatistics::new());
        Self {
            coordinator: SaveCoordinator::new(Arc::clone(&store), Arc::clone(&stats)),
            retention: RetentionManager::new(Arc::clone(&store), policy),
            store,
            stats,
        }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn statistics(&self) -> &SaveStatistics {
        &self.stats
    }

    pub async fn get_game_ids(&self) -> Result<Vec<GameId>> {
        self.store.game_ids().await
    }

    /// Latest version of a game.
    pub async fn get_game(&self, game_id: &GameId) -> Result<Snapshot> {
        self.store.latest(game_id).await
    }

    pub async fn get_game_version(&self, game_id: &GameId, save_id: SaveId) -> Result<Snapshot> {
        self.retention.restore(game_id, save_id).await
    }

    /// The seed version, used for cloning.
    pub async fn load_seed(&self, game_id: &GameId) -> Result<Snapshot> {
        self.store.version(game_id, SEED_SAVE_ID).await
    }

    pub async fn get_save_ids(&self, game_id: &GameId) -> Result<Vec<SaveId>> {
        self.store.save_ids(game_id).await
    }

    pub async fn cloneable_games(&self) -> Result<Vec<CloneableGame>> {
        self.store.cloneable_games().await
    }

    /// Seated players recorded in the latest version.
    pub async fn player_count(&self, game_id: &GameId) -> Result<u32> {
        Ok(self.store.latest(game_id).await?.players)
    }

    /// Never fails; see [`SaveCoordinator::save`].
    pub async fn save(&self, game: &mut Game) {
        self.coordinator.save(game).await
    }

    pub async fn delete_recent_saves(&self, game_id: &GameId, count: u32) -> Result<UndoReport> {
        self.retention.undo(game_id, count).await
    }

    pub async fn finalize(&self, game_id: &GameId) -> Result<()> {
        self.retention.finalize(game_id).await
    }

    /// Record the final standings of a game.
    pub async fn save_game_results(&self, game: &Game) -> Result<()> {
        let results = GameResults::from_game(game);
        match self.store.store_results(&results).await {
            Ok(()) => {
                info!(
                    game_id = %game.id,
                    seed_game_id = ?results.seed_game_id,
                    generations = results.generations,
                    "Saved game results"
                );
                Ok(())
            }
            Err(e) => {
                error!(game_id = %game.id, "Failed to save game results: {}", e);
                Err(e)
            }
        }
    }

    pub async fn get_game_results(&self, game_id: &GameId) -> Result<GameResults> {
        self.store.results(game_id).await
    }

    pub async fn purge_stale(&self, max_age_days: u32) -> Result<Vec<GameId>> {
        self.retention.purge_stale(max_age_days).await
    }

    /// Purge per the configured policy. No-op when unconfigured.
    pub async fn purge_configured(&self) -> Result<Vec<GameId>> {
        self.retention.purge_configured().await
    }

    pub async fn store_participants(&self, game_id: &GameId, participants: &[ParticipantId]) -> Result<()> {
        self.store.store_participants(game_id, participants).await
    }

    /// Ledger grouped by game.
    pub async fn get_participants(&self) -> Result<BTreeMap<GameId, BTreeSet<ParticipantId>>> {
        let mut grouped: BTreeMap<GameId, BTreeSet<ParticipantId>> = BTreeMap::new();
        for (game_id, participant) in self.store.participant_rows().await? {
            grouped.entry(game_id).or_default().insert(participant);
        }
        Ok(grouped)
    }

    pub async fn get_game_id_for_participant(&self, participant: &ParticipantId) -> Result<GameId> {
        self.store.game_id_for(participant).await
    }

    /// Save counters merged with backend metrics.
    pub async fn stats(&self) -> Result<BTreeMap<String, Value>> {
        let counts = self.stats.snapshot();
        let mut map = self.store.storage_stats().await?;
        map.insert("type".to_string(), self.store.kind().into());
        map.insert("save-count".to_string(), counts.saves.into());
        map.insert("save-error-count".to_string(), counts.errors.into());
        map.insert("save-conflict-normal-count".to_string(), counts.conflicts_normal.into());
        map.insert("save-conflict-undo-count".to_string(), counts.conflicts_undo.into());
        Ok(map)
    }
}
