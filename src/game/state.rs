//! Game State Definitions
//!
//! In-memory game owned by a session. The persistence layer only ever sees
//! serialized copies produced by [`Game::to_json`].
//! Uses BTreeMap for deterministic serialization order.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::ids::{GameId, ParticipantId, PlayerId, SpectatorId};
use crate::game::action::ActionError;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::input::InputTree;
use crate::game::interrupt::InterruptQueue;

// =============================================================================
// STATUS & OPTIONS
// =============================================================================

/// Lifecycle status of a game, mirrored on every stored version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Accepting input.
    #[default]
    Running,
    /// Finalized; intermediate versions compacted.
    Finished,
}

impl GameStatus {
    /// Storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Running => "running",
            GameStatus::Finished => "finished",
        }
    }

    /// Parse a storage label.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "running" => Some(GameStatus::Running),
            "finished" => Some(GameStatus::Finished),
            _ => None,
        }
    }
}

/// Options fixed at game creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOptions {
    /// Players may roll back recent versions.
    #[serde(default)]
    pub undo: bool,
    /// Seed this game was cloned from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloned_game_id: Option<GameId>,
}

// =============================================================================
// PLAYERS & PARTIES
// =============================================================================

/// A seated player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Generic resource ledger (name -> count).
    #[serde(default)]
    pub resources: BTreeMap<String, i64>,
}

impl Player {
    /// Create a player with an empty ledger.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            resources: BTreeMap::new(),
        }
    }

    /// Current count of a resource (0 if never touched).
    pub fn resource(&self, name: &str) -> i64 {
        self.resources.get(name).copied().unwrap_or(0)
    }
}

/// Owner of a delegate in a party.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delegate {
    /// Belongs to no player.
    Neutral,
    /// Belongs to a player.
    Player(PlayerId),
}

/// A political party delegates can be sent to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Unique party name.
    pub name: String,
    /// Short description shown in prompts.
    pub description: String,
    /// Current leader, if any.
    pub leader: Option<Delegate>,
    /// Non-leader delegates, in arrival order.
    pub delegates: Vec<Delegate>,
}

impl Party {
    /// Create an empty party.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            leader: None,
            delegates: Vec::new(),
        }
    }

    /// Total delegates including the leader.
    pub fn size(&self) -> usize {
        self.delegates.len() + usize::from(self.leader.is_some())
    }

    /// Seat a delegate; the first one in an empty party becomes leader.
    pub fn add_delegate(&mut self, delegate: Delegate) {
        if self.leader.is_none() {
            self.leader = Some(delegate);
        } else {
            self.delegates.push(delegate);
        }
    }

    /// Remove one non-leader delegate owned by `owner`.
    pub fn remove_delegate(&mut self, owner: &Delegate) -> bool {
        match self.delegates.iter().position(|d| d == owner) {
            Some(pos) => {
                self.delegates.remove(pos);
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// PENDING INPUT
// =============================================================================

/// An input tree waiting on one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingInput {
    /// Player who must answer.
    pub player: PlayerId,
    /// The prompt.
    pub input: InputTree,
}

impl PendingInput {
    /// Create a pending input.
    pub fn new(player: PlayerId, input: InputTree) -> Self {
        Self { player, input }
    }
}

// =============================================================================
// GAME
// =============================================================================

/// Complete state of one game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Game identifier.
    pub id: GameId,
    /// Seated players, in turn order.
    pub players: Vec<Player>,
    /// Optional spectator.
    pub spectator_id: Option<SpectatorId>,
    /// Creation options.
    pub options: GameOptions,
    /// Next version number to write. Starts at 0.
    pub last_save_id: u32,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Current generation (round) number.
    pub generation: u32,
    /// Political parties.
    #[serde(default)]
    pub parties: Vec<Party>,
    /// Normal turn input; at most one at a time.
    pending: Option<PendingInput>,
    /// Forced decisions that preempt `pending`.
    #[serde(default)]
    interrupts: InterruptQueue,
    /// Event log.
    #[serde(default)]
    log: Vec<GameEvent>,
}

impl Game {
    /// Create a new running game.
    pub fn new(
        id: GameId,
        players: Vec<Player>,
        spectator_id: Option<SpectatorId>,
        options: GameOptions,
    ) -> Self {
        Self {
            id,
            players,
            spectator_id,
            options,
            last_save_id: 0,
            status: GameStatus::Running,
            generation: 1,
            parties: Vec::new(),
            pending: None,
            interrupts: InterruptQueue::new(),
            log: Vec::new(),
        }
    }

    /// Replace the party table.
    pub fn with_parties(mut self, parties: Vec<Party>) -> Self {
        self.parties = parties;
        self
    }

    /// Serialize to the opaque snapshot blob.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Rebuild from a snapshot blob.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Copy of this game under fresh game, player and spectator ids, ready to
    /// be saved as the seed of a new game.
    ///
    /// Every id occurrence is rewritten, including delegates, pending inputs
    /// and the log. Display text is left alone.
    pub fn clone_with_fresh_ids(&self) -> Result<Game, serde_json::Error> {
        let mut renames = BTreeMap::new();
        renames.insert(self.id.as_str().to_string(), GameId::generate().as_str().to_string());
        for player in &self.players {
            renames.insert(player.id.as_str().to_string(), PlayerId::generate().as_str().to_string());
        }
        if let Some(spectator) = &self.spectator_id {
            renames.insert(spectator.as_str().to_string(), SpectatorId::generate().as_str().to_string());
        }

        let mut value = serde_json::to_value(self)?;
        rename_ids(&mut value, &renames);
        let mut game: Game = serde_json::from_value(value)?;
        game.last_save_id = 0;
        game.status = GameStatus::Running;
        game.options.cloned_game_id = Some(self.id.clone());
        Ok(game)
    }

    /// Number of seated players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Find a player.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Find a player mutably.
    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// Players followed by the spectator, if any.
    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self
            .players
            .iter()
            .map(|p| ParticipantId::Player(p.id.clone()))
            .collect();
        if let Some(spectator) = &self.spectator_id {
            ids.push(ParticipantId::Spectator(spectator.clone()));
        }
        ids
    }

    /// True once finalized.
    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }

    /// The decision currently offered: the oldest interrupt, else normal input.
    pub fn waiting_for(&self) -> Option<&PendingInput> {
        self.interrupts.front().or(self.pending.as_ref())
    }

    /// Normal turn input, ignoring interrupts.
    pub fn pending(&self) -> Option<&PendingInput> {
        self.pending.as_ref()
    }

    pub(crate) fn pending_mut(&mut self) -> Option<&mut PendingInput> {
        self.pending.as_mut()
    }

    /// Replace the normal turn input.
    pub fn set_pending(&mut self, pending: Option<PendingInput>) {
        self.pending = pending;
    }

    /// Interrupt queue.
    pub fn interrupts(&self) -> &InterruptQueue {
        &self.interrupts
    }

    pub(crate) fn interrupts_mut(&mut self) -> &mut InterruptQueue {
        &mut self.interrupts
    }

    /// Queue a forced decision behind any existing ones.
    pub fn push_interrupt(&mut self, interrupt: PendingInput) {
        self.log_event(GameEventData::InterruptQueued {
            player: interrupt.player.clone(),
            title: interrupt.input.title.clone(),
        });
        self.interrupts.push(interrupt);
    }

    /// Event log, oldest first.
    pub fn log(&self) -> &[GameEvent] {
        &self.log
    }

    /// Append an event stamped with the current generation.
    pub fn log_event(&mut self, data: GameEventData) {
        self.log.push(GameEvent::new(self.generation, data));
    }

    /// Add `delta` to a player's resource and return the new total.
    pub fn adjust_resource(
        &mut self,
        player: &PlayerId,
        resource: &str,
        delta: i64,
    ) -> Result<i64, ActionError> {
        let entry = self
            .player_mut(player)
            .ok_or_else(|| ActionError::UnknownPlayer(player.clone()))?;
        let total = entry
            .resource(resource)
            .checked_add(delta)
            .ok_or_else(|| ActionError::ResourceOverflow(resource.to_string()))?;
        entry.resources.insert(resource.to_string(), total);
        self.log_event(GameEventData::ResourceChanged {
            player: player.clone(),
            resource: resource.to_string(),
            delta,
            total,
        });
        Ok(total)
    }

    /// Find a party by name.
    pub fn party(&self, name: &str) -> Option<&Party> {
        self.parties.iter().find(|p| p.name == name)
    }

    /// Send `count` delegates of `player` to a party, optionally replacing
    /// delegates owned by `replace` one for one.
    pub fn send_delegates(
        &mut self,
        player: &PlayerId,
        party: &str,
        count: u32,
        replace: Option<&Delegate>,
    ) -> Result<(), ActionError> {
        if self.player(player).is_none() {
            return Err(ActionError::UnknownPlayer(player.clone()));
        }
        let target = self
            .parties
            .iter_mut()
            .find(|p| p.name == party)
            .ok_or_else(|| ActionError::UnknownParty(party.to_string()))?;

        if let Some(owner) = replace {
            let available = target.delegates.iter().filter(|d| *d == owner).count();
            if available < count as usize {
                return Err(ActionError::DelegateNotFound {
                    party: party.to_string(),
                });
            }
        }

        let mut removed = Vec::new();
        for _ in 0..count {
            if let Some(owner) = replace {
                target.remove_delegate(owner);
                removed.push(owner.clone());
            }
            target.add_delegate(Delegate::Player(player.clone()));
        }

        for owner in removed {
            self.log_event(GameEventData::DelegateRemoved {
                owner,
                party: party.to_string(),
            });
        }
        self.log_event(GameEventData::DelegateSent {
            player: player.clone(),
            party: party.to_string(),
            count,
        });
        Ok(())
    }
}

/// Fields holding player-facing text rather than ids.
const DISPLAY_TEXT_KEYS: [&str; 5] = ["name", "label", "title", "message", "description"];

fn rename_ids(value: &mut serde_json::Value, renames: &BTreeMap<String, String>) {
    use serde_json::Value;

    match value {
        Value::String(text) => {
            if let Some(renamed) = renames.get(text.as_str()) {
                *text = renamed.clone();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| rename_ids(item, renames)),
        Value::Object(fields) => fields
            .iter_mut()
            .filter(|(key, _)| !DISPLAY_TEXT_KEYS.contains(&key.as_str()))
            .for_each(|(_, field)| rename_ids(field, renames)),
        _ => {}
    }
}
