//! Rollback and retention.
//!
//! Undo deletes the most recent versions of a game, finalize compacts a
//! finished game down to its seed and last version, and the purge sweeps
//! games abandoned before completion.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::hash::short_hex;
use crate::core::ids::GameId;

use super::error::{Result, StoreError};
use super::snapshot::{SaveId, Snapshot, SEED_SAVE_ID};
use super::store::SnapshotStore;

/// Age-based purge settings. `None` disables purging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_game_days: Option<u32>,
}

/// Versions present before and after an undo.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UndoReport {
    pub before: Vec<SaveId>,
    pub after: Vec<SaveId>,
}

impl UndoReport {
    /// Versions that disappeared.
    pub fn removed(&self) -> Vec<SaveId> {
        self.before
            .iter()
            .filter(|id| !self.after.contains(id))
            .copied()
            .collect()
    }
}

/// Restore, undo, finalize and purge over a snapshot store.
pub struct RetentionManager {
    store: Arc<dyn SnapshotStore>,
    policy: RetentionPolicy,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn SnapshotStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Exact stored version. Read-only.
    pub async fn restore(&self, game_id: &GameId, save_id: SaveId) -> Result<Snapshot> {
        let snapshot = self.store.version(game_id, save_id).await?;
        info!(
            target: "undo",
            game_id = %game_id,
            save_id,
            digest = %short_hex(&snapshot.digest()),
            "Restored version"
        );
        Ok(snapshot)
    }

    /// Delete the `count` most recent non-seed versions.
    ///
    /// A zero count is logged and ignored.
    pub async fn undo(&self, game_id: &GameId, count: u32) -> Result<UndoReport> {
        if count == 0 {
            error!(target: "undo", game_id = %game_id, "Undo requested with count 0, ignoring");
            return Ok(UndoReport::default());
        }

        let before = self.store.save_ids(game_id).await?;
        let deleted = self.store.delete_recent(game_id, count).await?;
        let after = self.store.save_ids(game_id).await?;
        let report = UndoReport { before, after };

        info!(
            target: "undo",
            game_id = %game_id,
            requested = count,
            deleted,
            "Undo {:?} -> {:?} (removed {:?})",
            report.before,
            report.after,
            report.removed()
        );
        Ok(report)
    }

    /// Keep only the seed and the final version, mark the game finished,
    /// then run the configured purge.
    pub async fn finalize(&self, game_id: &GameId) -> Result<()> {
        let save_ids = self.store.save_ids(game_id).await?;
        let max = *save_ids
            .last()
            .ok_or_else(|| StoreError::GameNotFound(game_id.clone()))?;

        let compacted = self.store.delete_between(game_id, SEED_SAVE_ID, max).await?;
        self.store.mark_finished(game_id, Utc::now()).await?;
        info!(game_id = %game_id, final_save_id = max, compacted, "Finalized game");

        self.purge_configured().await?;
        Ok(())
    }

    /// Delete never-finished games older than `max_age_days`.
    pub async fn purge_stale(&self, max_age_days: u32) -> Result<Vec<GameId>> {
        let Some(cutoff) = Duration::try_days(i64::from(max_age_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            debug!(max_age_days, "Purge cutoff predates the calendar, nothing to purge");
            return Ok(Vec::new());
        };
        let purged = self.store.purge_unfinished_before(cutoff).await?;
        if !purged.is_empty() {
            warn!(count = purged.len(), max_age_days, "Purged stale games: {:?}", purged);
        }
        Ok(purged)
    }

    /// Purge per policy; nothing when unconfigured.
    pub async fn purge_configured(&self) -> Result<Vec<GameId>> {
        match self.policy.max_game_days {
            Some(days) => self.purge_stale(days).await,
            None => Ok(Vec::new()),
        }
    }
}
