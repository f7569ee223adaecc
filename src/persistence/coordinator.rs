//! Save Coordinator
//!
//! Writes the next version of a game. The version number is read from the
//! game itself with no reservation step: two writers holding the same
//! `last_save_id` both upsert the same row, one inserts and the other
//! overwrites. The overwrite is counted as a conflict and otherwise ignored.
//!
//! Saves never fail from the caller's point of view. Store errors are
//! counted and logged, and `last_save_id` advances regardless.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::core::hash::short_hex;
use crate::game::state::Game;

use super::error::Result;
use super::snapshot::{NewSnapshot, UpsertOutcome, SEED_SAVE_ID};
use super::stats::SaveStatistics;
use super::store::SnapshotStore;

/// Assigns version numbers and writes snapshots.
pub struct SaveCoordinator {
    store: Arc<dyn SnapshotStore>,
    stats: Arc<SaveStatistics>,
}

impl SaveCoordinator {
    pub fn new(store: Arc<dyn SnapshotStore>, stats: Arc<SaveStatistics>) -> Self {
        Self { store, stats }
    }

    /// Persist `game` at its current `last_save_id`, then advance it by one.
    pub async fn save(&self, game: &mut Game) {
        self.stats.record_save();
        let save_id = game.last_save_id;
        if game.options.undo {
            debug!(target: "undo", game_id = %game.id, save_id, "Start save");
        }

        match self.write(game).await {
            Ok(outcome) if !outcome.inserted => {
                self.stats.record_conflict(game.options.undo);
                warn!(
                    game_id = %game.id,
                    save_id,
                    undo = game.options.undo,
                    "Save conflict: version already existed and was overwritten"
                );
            }
            Ok(_) => {}
            Err(e) => {
                self.stats.record_error();
                error!(game_id = %game.id, save_id, "Save failed: {}", e);
            }
        }

        game.last_save_id = save_id.wrapping_add(1);
        if game.options.undo {
            debug!(target: "undo", game_id = %game.id, next = game.last_save_id, "Advanced save id");
        }
    }

    async fn write(&self, game: &Game) -> Result<UpsertOutcome> {
        let snapshot = NewSnapshot::from_game(game)?;
        let digest = snapshot.digest();
        let outcome = self.store.upsert(snapshot).await?;

        if outcome.inserted && game.last_save_id == SEED_SAVE_ID {
            self.store
                .store_participants(&game.id, &game.participant_ids())
                .await?;
        }

        debug!(
            game_id = %game.id,
            save_id = game.last_save_id,
            inserted = outcome.inserted,
            digest = %short_hex(&digest),
            "Saved game"
        );
        Ok(outcome)
    }
}
