//! Error types raised by snapshot stores.

use thiserror::Error;

use crate::core::ids::{GameId, InvalidParticipantId};

/// Errors surfaced by snapshot stores and the database facade.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("Game {game_id} not found at save_id {save_id}")]
    VersionNotFound { game_id: GameId, save_id: u32 },

    #[error("No results recorded for game {0}")]
    ResultsNotFound(GameId),

    #[error("Game for participant id {0} not found")]
    ParticipantNotFound(String),

    #[error(transparent)]
    InvalidParticipant(#[from] InvalidParticipantId),

    #[error("participants already recorded for game {0}")]
    ParticipantsExist(GameId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store lock was poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// True for the not-found family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::GameNotFound(_)
                | StoreError::VersionNotFound { .. }
                | StoreError::ParticipantNotFound(_)
                | StoreError::ResultsNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
