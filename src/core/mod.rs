//! Core primitives shared by every layer.

pub mod ids;
pub mod hash;

// Re-export core types
pub use ids::{GameId, InvalidParticipantId, ParticipantId, PlayerId, SpectatorId};
pub use hash::{snapshot_digest, SnapshotHash};
