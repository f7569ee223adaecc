//! # Turnkeep
//!
//! Turn resolution and versioned persistence for turn-based multiplayer games.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         TURNKEEP                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Identifiers and digests                 │
//! │  ├── ids.rs        - Game, player, spectator ids             │
//! │  └── hash.rs       - Snapshot digests for audit logs         │
//! │                                                              │
//! │  game/             - Turn resolution (synchronous)           │
//! │  ├── input.rs      - Input nodes, trees, responses           │
//! │  ├── resolver.rs   - Validate and commit a response          │
//! │  ├── action.rs     - Tagged leaf effects and executor        │
//! │  ├── interrupt.rs  - Forced decisions ahead of normal input  │
//! │  ├── state.rs      - Game, players, parties                  │
//! │  └── events.rs     - Game log                                │
//! │                                                              │
//! │  persistence/      - Versioned snapshots (async)             │
//! │  ├── store.rs      - Store contract                          │
//! │  ├── memory.rs     - In-process backend                      │
//! │  ├── sqlite.rs     - SQLite backend                          │
//! │  ├── coordinator.rs- Version assignment, conflict counting   │
//! │  ├── retention.rs  - Restore, undo, finalize, purge          │
//! │  └── database.rs   - Facade                                  │
//! │                                                              │
//! │  network/          - WebSocket front end                     │
//! │  ├── server.rs     - Accept loop and message routing         │
//! │  ├── protocol.rs   - Message types                           │
//! │  └── session.rs    - Loaded games and turn flow              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Turn Flow
//!
//! 1. The game offers one decision: the oldest interrupt, else its pending input.
//! 2. A response is validated against that tree without touching it.
//! 3. The addressed leaf's action runs on a copy of the game.
//! 4. On success the copy replaces the game and a new version is saved.
//!
//! Saves never fail the turn. Store errors and version conflicts are counted
//! and visible through [`persistence::Database::stats`].

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod persistence;

// Re-export commonly used types
pub use core::ids::{GameId, ParticipantId, PlayerId, SpectatorId};
pub use game::input::{InputNode, InputResponse, InputTree};
pub use game::state::{Game, GameOptions};
pub use persistence::Database;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
