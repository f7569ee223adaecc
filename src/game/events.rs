//! Game Events
//!
//! Entries appended to a game's log as input is resolved and actions run.
//! The log travels inside every snapshot, so a restored version carries the
//! history that led to it.

use serde::{Serialize, Deserialize};

use crate::core::ids::PlayerId;
use crate::game::state::Delegate;

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEventData {
    /// A player answered (part of) a prompt.
    InputResolved {
        player: PlayerId,
        title: String,
        path: Vec<usize>,
    },

    /// A forced decision was queued.
    InterruptQueued {
        player: PlayerId,
        title: String,
    },

    /// A resource total changed.
    ResourceChanged {
        player: PlayerId,
        resource: String,
        delta: i64,
        total: i64,
    },

    /// Delegates were sent to a party.
    DelegateSent {
        player: PlayerId,
        party: String,
        count: u32,
    },

    /// A delegate was displaced from a party.
    DelegateRemoved {
        owner: Delegate,
        party: String,
    },

    /// Free-form message from game content.
    Message {
        player: PlayerId,
        message: String,
    },
}

/// A logged event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Generation in which the event happened.
    pub generation: u32,
    /// Event data.
    pub data: GameEventData,
}

impl GameEvent {
    /// Create new event.
    pub fn new(generation: u32, data: GameEventData) -> Self {
        Self { generation, data }
    }

    /// Player the event concerns, if any.
    pub fn player(&self) -> Option<&PlayerId> {
        match &self.data {
            GameEventData::InputResolved { player, .. }
            | GameEventData::InterruptQueued { player, .. }
            | GameEventData::ResourceChanged { player, .. }
            | GameEventData::DelegateSent { player, .. }
            | GameEventData::Message { player, .. } => Some(player),
            GameEventData::DelegateRemoved { owner, .. } => match owner {
                Delegate::Player(player) => Some(player),
                Delegate::Neutral => None,
            },
        }
    }
}
