//! Game Logic Module
//!
//! Turn input resolution. Single-threaded per game: exactly one decision is
//! offered at a time and resolving it mutates in-memory state synchronously.
//!
//! ## Module Structure
//!
//! - `input`: Input nodes, trees and wire responses
//! - `resolver`: Validate and apply a response to a tree
//! - `action`: Tagged leaf effects and their executor
//! - `interrupt`: Forced decisions that preempt normal input
//! - `state`: Game, players, parties
//! - `events`: Game log entries

pub mod input;
pub mod resolver;
pub mod action;
pub mod interrupt;
pub mod state;
pub mod events;

// Re-export key types
pub use input::{Combinator, Input, InputNode, InputResponse, InputTree, NodeSpec, ResolvedValue, ResponseKind};
pub use resolver::{resolve, InputError, Resolution};
pub use action::{execute, Action, ActionError};
pub use interrupt::{select_party, InterruptQueue};
pub use state::{Delegate, Game, GameOptions, GameStatus, Party, PendingInput, Player};
pub use events::{GameEvent, GameEventData};
