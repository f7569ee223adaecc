//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by `type`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::ids::{GameId, ParticipantId, PlayerId, SpectatorId};
use crate::game::input::{Combinator, Input, InputResponse, InputTree, NodeSpec};
use crate::game::state::{Game, GameOptions, GameStatus, Party, PendingInput, Player};
use crate::network::session::SessionError;
use crate::persistence::error::StoreError;
use crate::persistence::snapshot::{CloneableGame, SaveId, Snapshot};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a new game.
    CreateGame(CreateGameRequest),

    /// Start a new game from another game's seed.
    CloneGame { seed_game_id: GameId },

    /// Load a game into memory and describe it.
    LoadGame { game_id: GameId },

    /// Ask what a game is waiting for.
    WaitingFor { game_id: GameId },

    /// Answer the offered input.
    Input {
        game_id: GameId,
        player_id: PlayerId,
        response: InputResponse,
    },

    /// Roll back recent versions.
    Undo {
        game_id: GameId,
        #[serde(default = "default_undo_count")]
        count: u32,
    },

    /// Finish and compact a game.
    Finalize { game_id: GameId },

    /// Stored version numbers of a game.
    History { game_id: GameId },

    /// One stored version of a game.
    Version { game_id: GameId, save_id: SaveId },

    /// Game a player or spectator id belongs to.
    Participant { participant_id: ParticipantId },

    /// List cloneable games.
    Games,

    /// Persistence statistics.
    Stats,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

fn default_undo_count() -> u32 {
    1
}

/// New game parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    /// Player display names, in turn order.
    pub players: Vec<String>,
    /// Create a spectator id.
    #[serde(default)]
    pub spectator: bool,
    /// Allow undo.
    #[serde(default)]
    pub undo: bool,
    /// Initial party table.
    #[serde(default)]
    pub parties: Vec<Party>,
    /// First prompt, offered to the first player.
    #[serde(default)]
    pub input: Option<InputTree>,
}

impl CreateGameRequest {
    /// Build the game with freshly generated ids.
    pub fn into_game(self) -> Game {
        let players = self
            .players
            .iter()
            .map(|name| Player::new(PlayerId::generate(), name.clone()))
            .collect::<Vec<_>>();
        let first = players.first().map(|p| p.id.clone());
        let spectator = self.spectator.then(SpectatorId::generate);

        let mut game = Game::new(
            GameId::generate(),
            players,
            spectator,
            GameOptions {
                undo: self.undo,
                ..Default::default()
            },
        )
        .with_parties(self.parties);
        if let (Some(first), Some(input)) = (first, self.input) {
            game.set_pending(Some(PendingInput::new(first, input)));
        }
        game
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Game created.
    GameCreated(GameView),

    /// Game loaded.
    Game(GameView),

    /// Offered input, if any.
    WaitingFor {
        game_id: GameId,
        input: Option<InputView>,
    },

    /// Response accepted and saved.
    InputAccepted {
        game_id: GameId,
        save_id: u32,
        path: Vec<usize>,
        complete: bool,
        follow_up: bool,
    },

    /// Undo applied.
    UndoApplied { game_id: GameId, removed: Vec<u32> },

    /// Game finalized.
    Finalized { game_id: GameId },

    /// Stored versions, ascending.
    History { game_id: GameId, save_ids: Vec<SaveId> },

    /// A stored version.
    Version(VersionView),

    /// Game a participant belongs to.
    Participant {
        participant_id: ParticipantId,
        game_id: GameId,
    },

    /// Cloneable games.
    Games { games: Vec<CloneableGame> },

    /// Persistence statistics.
    Stats { stats: BTreeMap<String, serde_json::Value> },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Client view of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: GameId,
    pub status: GameStatus,
    pub generation: u32,
    pub last_save_id: u32,
    pub players: Vec<PlayerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectator_id: Option<SpectatorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<InputView>,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            game_id: game.id.clone(),
            status: game.status,
            generation: game.generation,
            last_save_id: game.last_save_id,
            players: game
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    resources: p.resources.clone(),
                })
                .collect(),
            spectator_id: game.spectator_id.clone(),
            waiting_for: game.waiting_for().map(InputView::from),
        }
    }
}

/// Client view of a stored version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionView {
    pub save_id: SaveId,
    pub created_at: DateTime<Utc>,
    pub game: GameView,
}

impl VersionView {
    /// Decode a stored version for display.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, StoreError> {
        let mut game = GameView::from(&snapshot.decode()?);
        game.status = snapshot.status;
        Ok(Self {
            save_id: snapshot.save_id,
            created_at: snapshot.created_at,
            game,
        })
    }
}

/// Client view of a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub resources: BTreeMap<String, i64>,
}

/// A pending input as shown to clients. Actions stay on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputView {
    pub player: PlayerId,
    pub prompt: PromptView,
}

impl From<&PendingInput> for InputView {
    fn from(pending: &PendingInput) -> Self {
        Self {
            player: pending.player.clone(),
            prompt: PromptView::from(&pending.input),
        }
    }
}

/// One prompt in an input view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptView {
    Or {
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        locked: Option<usize>,
        children: Vec<PromptView>,
    },
    And {
        title: String,
        cursor: usize,
        children: Vec<PromptView>,
    },
    Option { label: String },
    Amount { label: String, min: i64, max: i64 },
    Custom { label: String, schema: String },
}

impl From<&InputTree> for PromptView {
    fn from(tree: &InputTree) -> Self {
        let children = tree.children().iter().map(PromptView::from).collect();
        match tree.combinator {
            Combinator::Or => PromptView::Or {
                title: tree.title.clone(),
                locked: tree.locked(),
                children,
            },
            Combinator::And => PromptView::And {
                title: tree.title.clone(),
                cursor: tree.cursor(),
                children,
            },
        }
    }
}

impl From<&Input> for PromptView {
    fn from(input: &Input) -> Self {
        match input {
            Input::Tree(tree) => PromptView::from(tree),
            Input::Node(node) => {
                let label = node.label.clone();
                match &node.spec {
                    NodeSpec::Option => PromptView::Option { label },
                    NodeSpec::Amount { min, max } => PromptView::Amount {
                        label,
                        min: *min,
                        max: *max,
                    },
                    NodeSpec::Custom { schema } => PromptView::Custom {
                        label,
                        schema: schema.clone(),
                    },
                }
            }
        }
    }
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message did not parse.
    InvalidMessage,
    /// Response rejected; correct and resubmit.
    InvalidInput,
    /// Input belongs to another player.
    NotYourInput,
    /// Nothing to answer.
    NoPendingInput,
    /// Unknown game, version or participant.
    NotFound,
    /// Game id taken.
    GameExists,
    /// Game already finished.
    GameFinished,
    /// Game has no undo.
    UndoDisabled,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&SessionError> for ServerError {
    fn from(err: &SessionError) -> Self {
        let code = match err {
            SessionError::Input(_) | SessionError::Action(_) => ErrorCode::InvalidInput,
            SessionError::NotYourInput { .. } => ErrorCode::NotYourInput,
            SessionError::NoPendingInput(_) => ErrorCode::NoPendingInput,
            SessionError::GameExists(_) => ErrorCode::GameExists,
            SessionError::GameFinished(_) => ErrorCode::GameFinished,
            SessionError::UndoDisabled(_) => ErrorCode::UndoDisabled,
            SessionError::Store(e) => return ServerError::from(e),
        };
        ServerError::new(code, err.to_string())
    }
}

impl From<&StoreError> for ServerError {
    fn from(err: &StoreError) -> Self {
        let code = if err.is_not_found() {
            ErrorCode::NotFound
        } else {
            ErrorCode::InternalError
        };
        ServerError::new(code, err.to_string())
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::Action;
    use crate::game::input::InputNode;
    use crate::game::resolver::InputError;

    #[test]
    fn test_input_message_wire_format() {
        let json = r#"{
            "type": "input",
            "game_id": "g1",
            "player_id": "p1",
            "response": {"type": "or", "index": 2, "response": {"type": "amount", "amount": 8}}
        }"#;
        let msg = ClientMessage::from_json(json).unwrap();

        match msg {
            ClientMessage::Input { game_id, player_id, response } => {
                assert_eq!(game_id, GameId::new("g1"));
                assert_eq!(player_id, PlayerId::new("p1"));
                assert_eq!(response, InputResponse::or(2, InputResponse::amount(8)));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_lookup_messages_wire_format() {
        let msg = ClientMessage::from_json(r#"{"type":"version","game_id":"g1","save_id":3}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Version { save_id: 3, .. }));

        let msg = ClientMessage::from_json(r#"{"type":"participant","participant_id":"s1"}"#).unwrap();
        let ClientMessage::Participant { participant_id } = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(participant_id, ParticipantId::Spectator(SpectatorId::new("s1")));

        assert!(ClientMessage::from_json(r#"{"type":"participant","participant_id":"x1"}"#).is_err());

        let msg = ClientMessage::from_json(r#"{"type":"clone_game","seed_game_id":"g1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CloneGame { .. }));
    }

    #[test]
    fn test_undo_count_defaults_to_one() {
        let msg = ClientMessage::from_json(r#"{"type":"undo","game_id":"g1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Undo { count: 1, .. }));
    }

    #[test]
    fn test_create_game_assigns_first_prompt() {
        let mut request: CreateGameRequest = serde_json::from_value(serde_json::json!({
            "players": ["Ada", "Grace"],
            "spectator": true
        }))
        .unwrap();
        request.input = Some(InputTree::or("Start", [InputNode::option("Go", Action::Noop)]));

        let game = request.into_game();
        assert_eq!(game.player_count(), 2);
        assert!(game.spectator_id.is_some());
        assert!(game.id.as_str().starts_with('g'));
        assert_eq!(game.pending().unwrap().player, game.players[0].id);
    }

    #[test]
    fn test_prompt_view_hides_actions() {
        let tree = InputTree::and(
            "Steps",
            [
                Input::Node(InputNode::amount("Spend", 0, 10, Action::AddChosenAmount { resource: "mc".into() })),
                Input::Tree(InputTree::or("Pick", [InputNode::option("A", Action::Noop)])),
            ],
        );
        let view = PromptView::from(&tree);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["type"], "and");
        assert_eq!(json["cursor"], 0);
        assert_eq!(json["children"][0]["type"], "amount");
        assert_eq!(json["children"][0]["max"], 10);
        assert_eq!(json["children"][1]["children"][0]["label"], "A");
        assert!(!json.to_string().contains("add_chosen_amount"));
    }

    #[test]
    fn test_error_codes() {
        let err = SessionError::Input(InputError::InvalidIndex { index: 4, len: 3 });
        let server = ServerError::from(&err);
        assert_eq!(server.code, ErrorCode::InvalidInput);
        assert!(server.message.contains('4'));

        let missing = SessionError::Store(StoreError::GameNotFound(GameId::new("g9")));
        assert_eq!(ServerError::from(&missing).code, ErrorCode::NotFound);

        let msg = ServerMessage::error(ErrorCode::InvalidMessage, "bad json");
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""code":"invalid_message""#));
    }
}
