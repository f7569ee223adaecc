//! Persistence Module
//!
//! Versioned game snapshots with undo, compaction and retention.
//!
//! ## Module Structure
//!
//! - `store`: Snapshot store contract
//! - `memory`: In-process backend
//! - `sqlite`: SQLite backend
//! - `coordinator`: Version assignment and conflict counting
//! - `retention`: Restore, undo, finalize, purge
//! - `database`: Facade over all of the above

pub mod error;
pub mod snapshot;
pub mod store;
pub mod memory;
pub mod sqlite;
pub mod stats;
pub mod coordinator;
pub mod retention;
pub mod database;

// Re-export key types
pub use error::StoreError;
pub use snapshot::{
    CloneableGame, GameResults, NewSnapshot, PlayerScore, SaveId, Snapshot, UpsertOutcome, SEED_SAVE_ID,
};
pub use store::SnapshotStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use stats::{SaveCounts, SaveStatistics};
pub use coordinator::SaveCoordinator;
pub use retention::{RetentionManager, RetentionPolicy, UndoReport};
pub use database::Database;
