//! Game Session Management
//!
//! Owns the in-memory games and drives each turn: resolve the offered input,
//! run its action, install the follow-up, then save a new version.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::ids::{GameId, ParticipantId, PlayerId};
use crate::game::action::{execute, ActionError};
use crate::game::events::GameEventData;
use crate::game::input::{InputResponse, InputTree};
use crate::game::resolver::{resolve, InputError, Resolution};
use crate::game::state::{Game, GameStatus, PendingInput};
use crate::persistence::database::Database;
use crate::persistence::error::StoreError;
use crate::persistence::retention::UndoReport;
use crate::persistence::snapshot::Snapshot;

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Response rejected by the resolver.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Action failed against the game.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Storage failure or missing data.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Nothing is waiting for input.
    #[error("Game {0} is not waiting for input")]
    NoPendingInput(GameId),

    /// Input belongs to someone else.
    #[error("Waiting for {expected}, not {received}")]
    NotYourInput { expected: PlayerId, received: PlayerId },

    /// Game id already in use.
    #[error("Game {0} already exists")]
    GameExists(GameId),

    /// Game was finalized.
    #[error("Game {0} is finished")]
    GameFinished(GameId),

    /// Game was created without undo.
    #[error("Undo is not enabled for game {0}")]
    UndoDisabled(GameId),
}

impl SessionError {
    /// True when the request named something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::Store(e) if e.is_not_found())
    }
}

/// What a submitted response did.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// The committed resolution.
    pub resolution: Resolution,
    /// The action produced a new prompt.
    pub follow_up: bool,
    /// Version the turn was saved as.
    pub save_id: u32,
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// One loaded game.
#[derive(Debug)]
pub struct GameSession {
    game: Game,
}

impl GameSession {
    pub fn new(game: Game) -> Self {
        Self { game }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    /// The decision currently offered.
    pub fn waiting_for(&self) -> Option<&PendingInput> {
        self.game.waiting_for()
    }

    /// Resolve `response` from `player` against the offered input.
    ///
    /// Resolution and the action run on a copy of the game; the session
    /// only changes when both succeed. Returns the resolution and whether
    /// the action produced a follow-up.
    pub fn submit(
        &mut self,
        player: &PlayerId,
        response: &InputResponse,
    ) -> Result<(Resolution, bool), SessionError> {
        if self.game.is_finished() {
            return Err(SessionError::GameFinished(self.game.id.clone()));
        }
        let from_interrupt = !self.game.interrupts().is_empty();
        let current = self
            .game
            .waiting_for()
            .ok_or_else(|| SessionError::NoPendingInput(self.game.id.clone()))?;
        if &current.player != player {
            return Err(SessionError::NotYourInput {
                expected: current.player.clone(),
                received: player.clone(),
            });
        }

        let mut working = self.game.clone();
        let (resolution, title) = {
            let slot = (if from_interrupt {
                working.interrupts_mut().front_mut()
            } else {
                working.pending_mut()
            })
            .ok_or_else(|| SessionError::NoPendingInput(self.game.id.clone()))?;
            (resolve(&mut slot.input, response)?, slot.input.title.clone())
        };

        let follow_up = execute(&mut working, player, &resolution.action, &resolution.value)?;
        let has_follow_up = follow_up.is_some();
        install(&mut working, player, from_interrupt, resolution.complete, follow_up);

        working.log_event(GameEventData::InputResolved {
            player: player.clone(),
            title,
            path: resolution.path.clone(),
        });

        self.game = working;
        Ok((resolution, has_follow_up))
    }
}

/// Retire or keep the answered input and place the follow-up.
///
/// A finished input is replaced by its follow-up in the same slot. If the
/// input still has steps left, the follow-up is answered first as an
/// interrupt for the same player.
fn install(
    game: &mut Game,
    player: &PlayerId,
    from_interrupt: bool,
    complete: bool,
    follow_up: Option<InputTree>,
) {
    let follow_up = follow_up.map(|tree| PendingInput::new(player.clone(), tree));

    if !complete {
        if let Some(next) = follow_up {
            game.log_event(GameEventData::InterruptQueued {
                player: player.clone(),
                title: next.input.title.clone(),
            });
            game.interrupts_mut().push_front(next);
        }
        return;
    }

    if from_interrupt {
        game.interrupts_mut().pop();
        if let Some(next) = follow_up {
            game.interrupts_mut().push_front(next);
        }
    } else {
        game.set_pending(follow_up);
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Registry of loaded games, built once at startup.
pub struct SessionManager {
    /// Shared persistence.
    db: Arc<Database>,
    /// Loaded games.
    sessions: RwLock<BTreeMap<GameId, Arc<RwLock<GameSession>>>>,
    /// Participant to game mapping.
    participants: RwLock<BTreeMap<ParticipantId, GameId>>,
}

impl SessionManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            sessions: RwLock::new(BTreeMap::new()),
            participants: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Register a new game and write its seed version.
    pub async fn create_game(&self, mut game: Game) -> Result<GameId, SessionError> {
        let id = game.id.clone();
        if self.sessions.read().await.contains_key(&id) {
            return Err(SessionError::GameExists(id));
        }
        match self.db.get_save_ids(&id).await {
            Ok(ids) if !ids.is_empty() => return Err(SessionError::GameExists(id)),
            _ => {}
        }

        game.last_save_id = 0;
        self.db.save(&mut game).await;
        info!(game_id = %id, players = game.player_count(), "Created game");
        self.register(game).await;
        Ok(id)
    }

    /// Start a new game from the seed version of another.
    pub async fn clone_game(&self, seed_game_id: &GameId) -> Result<GameId, SessionError> {
        let seed = self.db.load_seed(seed_game_id).await?;
        let game = seed
            .decode()?
            .clone_with_fresh_ids()
            .map_err(StoreError::from)?;
        info!(seed_game_id = %seed_game_id, game_id = %game.id, "Cloning game from seed");
        self.create_game(game).await
    }

    /// Loaded session, reading the latest version from storage if needed.
    pub async fn load_game(&self, game_id: &GameId) -> Result<Arc<RwLock<GameSession>>, SessionError> {
        if let Some(session) = self.sessions.read().await.get(game_id) {
            return Ok(Arc::clone(session));
        }
        let snapshot = self.db.get_game(game_id).await?;
        let game = resume(&snapshot)?;
        debug!(game_id = %game_id, save_id = snapshot.save_id, "Loaded game from storage");
        Ok(self.register(game).await)
    }

    /// Already-loaded session.
    pub async fn get_session(&self, game_id: &GameId) -> Option<Arc<RwLock<GameSession>>> {
        self.sessions.read().await.get(game_id).cloned()
    }

    /// Resolve a response, then save the turn.
    pub async fn submit_input(
        &self,
        game_id: &GameId,
        player: &PlayerId,
        response: &InputResponse,
    ) -> Result<SubmitOutcome, SessionError> {
        let session = self.load_game(game_id).await?;
        let mut session = session.write().await;

        let (resolution, follow_up) = session.submit(player, response)?;
        let save_id = session.game().last_save_id;
        self.db.save(session.game_mut()).await;

        debug!(game_id = %game_id, player = %player, save_id, path = ?resolution.path, "Input resolved");
        Ok(SubmitOutcome {
            resolution,
            follow_up,
            save_id,
        })
    }

    /// The decision currently offered in a game.
    pub async fn waiting_for(&self, game_id: &GameId) -> Result<Option<PendingInput>, SessionError> {
        let session = self.load_game(game_id).await?;
        let session = session.read().await;
        Ok(session.waiting_for().cloned())
    }

    /// Roll back `count` versions and reload the latest remaining one.
    pub async fn undo(&self, game_id: &GameId, count: u32) -> Result<UndoReport, SessionError> {
        let session = self.load_game(game_id).await?;
        let mut session = session.write().await;
        if !session.game().options.undo {
            return Err(SessionError::UndoDisabled(game_id.clone()));
        }

        let report = self.db.delete_recent_saves(game_id, count).await?;
        let snapshot = self.db.get_game(game_id).await?;
        *session.game_mut() = resume(&snapshot)?;
        info!(game_id = %game_id, save_id = snapshot.save_id, "Game rolled back");
        Ok(report)
    }

    /// Compact storage, mark the game finished and record its results.
    pub async fn finalize(&self, game_id: &GameId) -> Result<(), SessionError> {
        let session = self.load_game(game_id).await?;
        let mut session = session.write().await;
        self.db.finalize(game_id).await?;
        session.game_mut().status = GameStatus::Finished;
        self.db.save_game_results(session.game()).await?;
        Ok(())
    }

    /// Game a player or spectator belongs to.
    pub async fn game_for_participant(&self, participant: &ParticipantId) -> Result<GameId, SessionError> {
        if let Some(id) = self.participants.read().await.get(participant) {
            return Ok(id.clone());
        }
        Ok(self.db.get_game_id_for_participant(participant).await?)
    }

    /// Drop a game from memory. Storage is untouched.
    pub async fn unload(&self, game_id: &GameId) -> bool {
        let removed = self.sessions.write().await.remove(game_id);
        if removed.is_some() {
            self.participants.write().await.retain(|_, id| id != game_id);
        }
        removed.is_some()
    }

    /// Loaded game count.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn register(&self, game: Game) -> Arc<RwLock<GameSession>> {
        let id = game.id.clone();
        {
            let mut participants = self.participants.write().await;
            for participant in game.participant_ids() {
                participants.insert(participant, id.clone());
            }
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(id)
                .or_insert_with(|| Arc::new(RwLock::new(GameSession::new(game)))),
        )
    }
}

/// Rebuild a game from a stored version, ready to write the next one.
fn resume(snapshot: &Snapshot) -> Result<Game, StoreError> {
    let mut game = snapshot.decode()?;
    game.last_save_id = snapshot.save_id + 1;
    game.status = snapshot.status;
    Ok(game)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::SpectatorId;
    use crate::game::action::Action;
    use crate::game::input::InputNode;
    use crate::game::state::{GameOptions, Party, Player};
    use crate::persistence::memory::MemoryStore;
    use crate::persistence::retention::RetentionPolicy;

    fn p1() -> PlayerId {
        PlayerId::new("p1")
    }

    fn p2() -> PlayerId {
        PlayerId::new("p2")
    }

    fn manager() -> SessionManager {
        let db = Database::new(Arc::new(MemoryStore::new()), RetentionPolicy::default());
        SessionManager::new(Arc::new(db))
    }

    fn spend_tree() -> InputTree {
        let next = InputTree::or("Next action", [InputNode::option("Pass", Action::Noop)]);
        InputTree::or(
            "Choose",
            [
                InputNode::option("Pass", Action::Noop),
                InputNode::option("Draw", Action::AddResource { resource: "cards".into(), amount: 1 }),
                InputNode::amount(
                    "Spend",
                    0,
                    10,
                    Action::Sequence {
                        actions: vec![
                            Action::AddChosenAmount { resource: "mc".into() },
                            Action::prompt(next),
                        ],
                    },
                ),
            ],
        )
    }

    fn game(players: Vec<PlayerId>, undo: bool) -> Game {
        let seated = players.iter().map(|id| Player::new(id.clone(), id.as_str())).collect();
        let options = GameOptions { undo, ..Default::default() };
        let mut game = Game::new(GameId::new("g1"), seated, Some(SpectatorId::new("s1")), options)
            .with_parties(vec![Party::new("Greens", "plants")]);
        game.set_pending(Some(PendingInput::new(p1(), spend_tree())));
        game
    }

    #[tokio::test]
    async fn test_amount_turn_saves_next_version() {
        let manager = manager();
        let id = manager.create_game(game(vec![p1()], false)).await.unwrap();
        assert_eq!(manager.database().get_save_ids(&id).await.unwrap(), vec![0]);

        let response = InputResponse::or(2, InputResponse::amount(8));
        let outcome = manager.submit_input(&id, &p1(), &response).await.unwrap();
        assert_eq!(outcome.save_id, 1);
        assert!(outcome.follow_up);
        assert_eq!(outcome.resolution.value.amount(), Some(8));

        let session = manager.get_session(&id).await.unwrap();
        assert_eq!(session.read().await.game().player(&p1()).unwrap().resource("mc"), 8);
        assert_eq!(session.read().await.game().last_save_id, 2);

        let err = manager.submit_input(&id, &p1(), &response).await.unwrap_err();
        assert!(matches!(err, SessionError::Input(InputError::InvalidIndex { index: 2, len: 1 })));
        assert_eq!(manager.database().get_save_ids(&id).await.unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_rejected_input_leaves_game_untouched() {
        let manager = manager();
        let id = manager.create_game(game(vec![p1(), p2()], false)).await.unwrap();
        let before = manager.waiting_for(&id).await.unwrap();

        let wrong_kind = InputResponse::or(2, InputResponse::Option);
        assert!(matches!(
            manager.submit_input(&id, &p1(), &wrong_kind).await,
            Err(SessionError::Input(InputError::WrongResponse { .. }))
        ));
        assert!(matches!(
            manager.submit_input(&id, &p2(), &InputResponse::or(0, InputResponse::Option)).await,
            Err(SessionError::NotYourInput { .. })
        ));

        assert_eq!(manager.waiting_for(&id).await.unwrap(), before);
        let session = manager.get_session(&id).await.unwrap();
        assert_eq!(session.read().await.game().last_save_id, 1);
    }

    #[tokio::test]
    async fn test_failed_action_does_not_partially_apply() {
        let mut g = game(vec![p1()], false);
        let tree = InputTree::or(
            "Broken",
            [InputNode::option(
                "Pay then send",
                Action::Sequence {
                    actions: vec![
                        Action::AddResource { resource: "mc".into(), amount: -3 },
                        Action::SendDelegate { party: "Blues".into(), count: 1, replace: None },
                    ],
                },
            )],
        );
        g.set_pending(Some(PendingInput::new(p1(), tree)));
        let mut session = GameSession::new(g);

        let err = session.submit(&p1(), &InputResponse::or(0, InputResponse::Option)).unwrap_err();
        assert!(matches!(err, SessionError::Action(ActionError::UnknownParty(_))));
        assert_eq!(session.game().player(&p1()).unwrap().resource("mc"), 0);
        assert!(session.game().log().is_empty());
        assert!(session.waiting_for().is_some());
    }

    #[test]
    fn test_resource_overflow_is_rejected_without_changes() {
        let mut g = game(vec![p1()], false);
        g.player_mut(&p1()).unwrap().resources.insert("mc".into(), i64::MAX);
        let tree = InputTree::or(
            "Gain",
            [InputNode::amount("Gain", 0, i64::MAX, Action::AddChosenAmount { resource: "mc".into() })],
        );
        g.set_pending(Some(PendingInput::new(p1(), tree)));
        let mut session = GameSession::new(g);

        let err = session
            .submit(&p1(), &InputResponse::or(0, InputResponse::amount(1)))
            .unwrap_err();
        assert!(matches!(err, SessionError::Action(ActionError::ResourceOverflow(_))));
        assert_eq!(session.game().player(&p1()).unwrap().resource("mc"), i64::MAX);
        assert!(session.game().log().is_empty());
        assert!(session.waiting_for().is_some());
    }

    #[tokio::test]
    async fn test_interrupt_preempts_pending() {
        let mut g = game(vec![p1(), p2()], false);
        g.push_interrupt(PendingInput::new(
            p2(),
            InputTree::or("Forced", [InputNode::option("Ok", Action::AddResource { resource: "vp".into(), amount: 1 })]),
        ));
        let manager = manager();
        let id = manager.create_game(g).await.unwrap();

        let pass = InputResponse::or(0, InputResponse::Option);
        assert!(matches!(
            manager.submit_input(&id, &p1(), &pass).await,
            Err(SessionError::NotYourInput { .. })
        ));

        manager.submit_input(&id, &p2(), &pass).await.unwrap();
        let waiting = manager.waiting_for(&id).await.unwrap().unwrap();
        assert_eq!(waiting.player, p1());
        assert_eq!(waiting.input.title, "Choose");

        manager.submit_input(&id, &p1(), &pass).await.unwrap();
        assert!(manager.waiting_for(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_and_follow_up_runs_before_remaining_steps() {
        let extra = InputTree::or(
            "Bonus",
            [InputNode::option("Take", Action::AddResource { resource: "vp".into(), amount: 2 })],
        );
        let steps = InputTree::and(
            "Two steps",
            [
                InputNode::option("First", Action::prompt(extra)),
                InputNode::option("Second", Action::AddResource { resource: "vp".into(), amount: 1 }),
            ],
        );
        let mut g = game(vec![p1()], false);
        g.set_pending(Some(PendingInput::new(p1(), steps)));
        let mut session = GameSession::new(g);

        let (first, follow_up) = session.submit(&p1(), &InputResponse::and(0, InputResponse::Option)).unwrap();
        assert!(!first.complete);
        assert!(follow_up);
        assert_eq!(session.waiting_for().unwrap().input.title, "Bonus");

        assert!(matches!(
            session.submit(&p1(), &InputResponse::and(1, InputResponse::Option)),
            Err(SessionError::Input(InputError::WrongResponse { .. }))
        ));

        session.submit(&p1(), &InputResponse::or(0, InputResponse::Option)).unwrap();
        assert_eq!(session.waiting_for().unwrap().input.cursor(), 1);

        let (last, _) = session.submit(&p1(), &InputResponse::and(1, InputResponse::Option)).unwrap();
        assert!(last.complete);
        assert!(session.waiting_for().is_none());
        assert_eq!(session.game().player(&p1()).unwrap().resource("vp"), 3);
    }

    #[tokio::test]
    async fn test_undo_reloads_previous_version() {
        let manager = manager();
        let id = manager.create_game(game(vec![p1()], true)).await.unwrap();
        manager
            .submit_input(&id, &p1(), &InputResponse::or(2, InputResponse::amount(5)))
            .await
            .unwrap();
        manager
            .submit_input(&id, &p1(), &InputResponse::or(0, InputResponse::Option))
            .await
            .unwrap();
        assert_eq!(manager.database().get_save_ids(&id).await.unwrap(), vec![0, 1, 2]);

        let report = manager.undo(&id, 1).await.unwrap();
        assert_eq!(report.removed(), vec![2]);

        let session = manager.get_session(&id).await.unwrap();
        let session = session.read().await;
        assert_eq!(session.game().last_save_id, 2);
        assert_eq!(session.game().player(&p1()).unwrap().resource("mc"), 5);
        assert_eq!(session.waiting_for().unwrap().input.title, "Next action");
    }

    #[tokio::test]
    async fn test_undo_requires_option() {
        let manager = manager();
        let id = manager.create_game(game(vec![p1()], false)).await.unwrap();
        assert!(matches!(manager.undo(&id, 1).await, Err(SessionError::UndoDisabled(_))));
    }

    #[tokio::test]
    async fn test_reload_after_unload() {
        let manager = manager();
        let id = manager.create_game(game(vec![p1()], false)).await.unwrap();
        manager
            .submit_input(&id, &p1(), &InputResponse::or(1, InputResponse::Option))
            .await
            .unwrap();

        assert!(manager.unload(&id).await);
        assert_eq!(manager.session_count().await, 0);

        let session = manager.load_game(&id).await.unwrap();
        let session = session.read().await;
        assert_eq!(session.game().last_save_id, 2);
        assert_eq!(session.game().player(&p1()).unwrap().resource("cards"), 1);
        assert!(session.waiting_for().is_none());
    }

    #[tokio::test]
    async fn test_finalize_and_participants() {
        let manager = manager();
        let id = manager.create_game(game(vec![p1()], false)).await.unwrap();
        manager
            .submit_input(&id, &p1(), &InputResponse::or(1, InputResponse::Option))
            .await
            .unwrap();

        let spectator: ParticipantId = "s1".parse().unwrap();
        assert_eq!(manager.game_for_participant(&spectator).await.unwrap(), id);
        manager.unload(&id).await;
        assert_eq!(manager.game_for_participant(&spectator).await.unwrap(), id);

        manager.finalize(&id).await.unwrap();
        let results = manager.database().get_game_results(&id).await.unwrap();
        assert_eq!(results.players, 1);
        assert_eq!(results.scores[0].player, p1());
        assert_eq!(results.scores[0].resources["cards"], 1);
        assert!(matches!(
            manager.submit_input(&id, &p1(), &InputResponse::or(0, InputResponse::Option)).await,
            Err(SessionError::GameFinished(_))
        ));
        assert!(matches!(
            manager.create_game(game(vec![p1()], false)).await,
            Err(SessionError::GameExists(_))
        ));

        let stranger: ParticipantId = "p404".parse().unwrap();
        assert!(manager.game_for_participant(&stranger).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clone_starts_from_seed_with_fresh_ids() {
        let manager = manager();
        let seed_id = manager.create_game(game(vec![p1(), p2()], true)).await.unwrap();
        manager
            .submit_input(&seed_id, &p1(), &InputResponse::or(2, InputResponse::amount(8)))
            .await
            .unwrap();

        let id = manager.clone_game(&seed_id).await.unwrap();
        assert_ne!(id, seed_id);
        assert_eq!(manager.database().get_save_ids(&id).await.unwrap(), vec![0]);

        let session = manager.get_session(&id).await.unwrap();
        let session = session.read().await;
        let clone = session.game();
        assert_eq!(clone.last_save_id, 1);
        assert_eq!(clone.options.cloned_game_id, Some(seed_id.clone()));
        assert!(clone.options.undo);
        assert!(clone.player(&p1()).is_none());
        assert_eq!(clone.players[0].resource("mc"), 0);
        assert_eq!(session.waiting_for().unwrap().player, clone.players[0].id);

        let spectator = ParticipantId::Spectator(clone.spectator_id.clone().unwrap());
        assert_eq!(manager.game_for_participant(&spectator).await.unwrap(), id);

        let missing = GameId::new("g404");
        assert!(manager.clone_game(&missing).await.unwrap_err().is_not_found());
    }
}
