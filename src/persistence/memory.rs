//! In-memory snapshot store.
//!
//! Process-local; used by tests and when no database is configured.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::core::ids::{GameId, ParticipantId};
use crate::game::state::GameStatus;

use super::error::{Result, StoreError};
use super::snapshot::{
    CloneableGame, GameResults, NewSnapshot, SaveId, Snapshot, UpsertOutcome, SEED_SAVE_ID,
};
use super::store::SnapshotStore;

#[derive(Default)]
struct Inner {
    games: BTreeMap<GameId, BTreeMap<SaveId, Snapshot>>,
    participants: BTreeMap<GameId, BTreeSet<ParticipantId>>,
    completed: BTreeMap<GameId, DateTime<Utc>>,
    results: BTreeMap<GameId, GameResults>,
}

/// Snapshot store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn game_ids(&self) -> Result<Vec<GameId>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner.games.keys().cloned().collect())
    }

    async fn latest(&self, game_id: &GameId) -> Result<Snapshot> {
        self.check()?;
        let inner = self.inner.read().await;
        inner
            .games
            .get(game_id)
            .and_then(|versions| versions.values().next_back())
            .cloned()
            .ok_or_else(|| StoreError::GameNotFound(game_id.clone()))
    }

    async fn version(&self, game_id: &GameId, save_id: SaveId) -> Result<Snapshot> {
        self.check()?;
        let inner = self.inner.read().await;
        inner
            .games
            .get(game_id)
            .and_then(|versions| versions.get(&save_id))
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound {
                game_id: game_id.clone(),
                save_id,
            })
    }

    async fn save_ids(&self, game_id: &GameId) -> Result<Vec<SaveId>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .games
            .get(game_id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn cloneable_games(&self) -> Result<Vec<CloneableGame>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .games
            .iter()
            .filter_map(|(game_id, versions)| {
                versions.get(&SEED_SAVE_ID).map(|seed| CloneableGame {
                    game_id: game_id.clone(),
                    player_count: seed.players,
                })
            })
            .collect())
    }

    async fn upsert(&self, snapshot: NewSnapshot) -> Result<UpsertOutcome> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let versions = inner.games.entry(snapshot.game_id.clone()).or_default();
        match versions.get_mut(&snapshot.save_id) {
            Some(existing) => {
                existing.game = snapshot.game;
                Ok(UpsertOutcome { inserted: false })
            }
            None => {
                versions.insert(
                    snapshot.save_id,
                    Snapshot {
                        game_id: snapshot.game_id,
                        save_id: snapshot.save_id,
                        game: snapshot.game,
                        players: snapshot.players,
                        created_at: snapshot.created_at,
                        status: GameStatus::Running,
                    },
                );
                Ok(UpsertOutcome { inserted: true })
            }
        }
    }

    async fn delete_recent(&self, game_id: &GameId, count: u32) -> Result<usize> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let Some(versions) = inner.games.get_mut(game_id) else {
            return Ok(0);
        };
        let doomed: Vec<SaveId> = versions
            .keys()
            .rev()
            .filter(|id| **id != SEED_SAVE_ID)
            .take(count as usize)
            .copied()
            .collect();
        for save_id in &doomed {
            versions.remove(save_id);
        }
        Ok(doomed.len())
    }

    async fn delete_between(&self, game_id: &GameId, after: SaveId, before: SaveId) -> Result<usize> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let Some(versions) = inner.games.get_mut(game_id) else {
            return Ok(0);
        };
        let before_len = versions.len();
        versions.retain(|id, _| *id <= after || *id >= before);
        Ok(before_len - versions.len())
    }

    async fn mark_finished(&self, game_id: &GameId, completed_at: DateTime<Utc>) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let versions = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::GameNotFound(game_id.clone()))?;
        for snapshot in versions.values_mut() {
            snapshot.status = GameStatus::Finished;
        }
        inner.completed.entry(game_id.clone()).or_insert(completed_at);
        Ok(())
    }

    async fn purge_unfinished_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<GameId>> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let stale: Vec<GameId> = inner
            .games
            .iter()
            .filter(|(game_id, _)| !inner.completed.contains_key(*game_id))
            .filter(|(_, versions)| {
                versions
                    .values()
                    .next()
                    .is_some_and(|first| first.created_at < cutoff)
            })
            .map(|(game_id, _)| game_id.clone())
            .collect();
        for game_id in &stale {
            inner.games.remove(game_id);
        }
        Ok(stale)
    }

    async fn store_participants(&self, game_id: &GameId, participants: &[ParticipantId]) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if inner.participants.contains_key(game_id) {
            return Err(StoreError::ParticipantsExist(game_id.clone()));
        }
        inner
            .participants
            .insert(game_id.clone(), participants.iter().cloned().collect());
        Ok(())
    }

    async fn participant_rows(&self) -> Result<Vec<(GameId, ParticipantId)>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .participants
            .iter()
            .flat_map(|(game_id, ids)| ids.iter().map(move |id| (game_id.clone(), id.clone())))
            .collect())
    }

    async fn game_id_for(&self, participant: &ParticipantId) -> Result<GameId> {
        self.check()?;
        let inner = self.inner.read().await;
        inner
            .participants
            .iter()
            .find(|(_, ids)| ids.contains(participant))
            .map(|(game_id, _)| game_id.clone())
            .ok_or_else(|| StoreError::ParticipantNotFound(participant.to_string()))
    }

    async fn store_results(&self, results: &GameResults) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        inner.results.insert(results.game_id.clone(), results.clone());
        Ok(())
    }

    async fn results(&self, game_id: &GameId) -> Result<GameResults> {
        self.check()?;
        let inner = self.inner.read().await;
        inner
            .results
            .get(game_id)
            .cloned()
            .ok_or_else(|| StoreError::ResultsNotFound(game_id.clone()))
    }

    async fn storage_stats(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        self.check()?;
        let inner = self.inner.read().await;
        let rows: usize = inner.games.values().map(BTreeMap::len).sum();
        let bytes: usize = inner
            .games
            .values()
            .flat_map(BTreeMap::values)
            .map(|s| s.game.len())
            .sum();
        let mut map = BTreeMap::new();
        map.insert("row-count-games".to_string(), rows.into());
        map.insert("size-bytes-games".to_string(), bytes.into());
        map.insert("row-count-participants".to_string(), inner.participants.values().map(BTreeSet::len).sum::<usize>().into());
        map.insert("row-count-completed".to_string(), inner.completed.len().into());
        map.insert("row-count-results".to_string(), inner.results.len().into());
        Ok(map)
    }
}
