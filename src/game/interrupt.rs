//! Interrupt Queue
//!
//! Forced decisions raised by game content (for example "choose a party to
//! send a delegate to"). Interrupts are answered strictly in FIFO order and,
//! while any remain, the game's normal turn input is not offered.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};

use crate::core::ids::PlayerId;
use crate::game::action::Action;
use crate::game::input::{InputNode, InputTree};
use crate::game::state::{Delegate, Game, PendingInput};

/// FIFO of forced decisions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterruptQueue {
    queue: VecDeque<PendingInput>,
}

impl InterruptQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue behind existing interrupts.
    pub fn push(&mut self, interrupt: PendingInput) {
        self.queue.push_back(interrupt);
    }

    /// Queue ahead of existing interrupts.
    pub fn push_front(&mut self, interrupt: PendingInput) {
        self.queue.push_front(interrupt);
    }

    /// Oldest interrupt.
    pub fn front(&self) -> Option<&PendingInput> {
        self.queue.front()
    }

    /// Oldest interrupt, mutably.
    pub fn front_mut(&mut self) -> Option<&mut PendingInput> {
        self.queue.front_mut()
    }

    /// Remove the oldest interrupt.
    pub fn pop(&mut self) -> Option<PendingInput> {
        self.queue.pop_front()
    }

    /// Number of queued interrupts.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued interrupts, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PendingInput> {
        self.queue.iter()
    }
}

// =============================================================================
// BUILT-IN INTERRUPTS
// =============================================================================

/// Default title for [`select_party`].
pub const SELECT_PARTY_TITLE: &str = "Select where to send a delegate";

/// Build a "send a delegate" interrupt for `player`.
///
/// Offers one option per party. With `replace` set, only parties holding more
/// than one delegate, one of which is a non-leader owned by `replace`, are
/// offered, and each choice displaces that delegate.
pub fn select_party(
    game: &Game,
    player: &PlayerId,
    title: Option<&str>,
    count: u32,
    replace: Option<Delegate>,
) -> PendingInput {
    let options = game
        .parties
        .iter()
        .filter(|party| match &replace {
            Some(owner) => party.size() > 1 && party.delegates.contains(owner),
            None => true,
        })
        .map(|party| {
            InputNode::option(
                format!("{} - ({})", party.name, party.description),
                Action::SendDelegate {
                    party: party.name.clone(),
                    count,
                    replace: replace.clone(),
                },
            )
        });

    let tree = InputTree::or(title.unwrap_or(SELECT_PARTY_TITLE), options);
    PendingInput::new(player.clone(), tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::GameId;
    use crate::game::input::{Input, InputResponse};
    use crate::game::resolver::resolve;
    use crate::game::action::execute;
    use crate::game::state::{GameOptions, Party, Player};

    fn pending(title: &str) -> PendingInput {
        PendingInput::new(
            PlayerId::new("p1"),
            InputTree::or(title, [InputNode::option("ok", Action::Noop)]),
        )
    }

    fn party_game() -> Game {
        let mut crowded = Party::new("Greens", "plants");
        crowded.add_delegate(Delegate::Neutral);
        crowded.add_delegate(Delegate::Player(PlayerId::new("p2")));
        let mut lone = Party::new("Reds", "no terraforming");
        lone.add_delegate(Delegate::Player(PlayerId::new("p2")));

        Game::new(
            GameId::new("g1"),
            vec![
                Player::new(PlayerId::new("p1"), "Ada"),
                Player::new(PlayerId::new("p2"), "Grace"),
            ],
            None,
            GameOptions::default(),
        )
        .with_parties(vec![crowded, lone, Party::new("Unity", "space")])
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = InterruptQueue::new();
        queue.push(pending("first"));
        queue.push(pending("second"));
        queue.push_front(pending("urgent"));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().input.title, "urgent");
        assert_eq!(queue.pop().unwrap().input.title, "first");
        assert_eq!(queue.front().unwrap().input.title, "second");
        queue.pop();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_select_party_offers_all_parties() {
        let game = party_game();
        let interrupt = select_party(&game, &PlayerId::new("p1"), None, 1, None);
        assert_eq!(interrupt.input.title, SELECT_PARTY_TITLE);
        assert_eq!(interrupt.input.len(), 3);
        match interrupt.input.child(0) {
            Some(Input::Node(node)) => assert_eq!(node.label, "Greens - (plants)"),
            other => panic!("unexpected child {other:?}"),
        }
    }

    #[test]
    fn test_select_party_replace_filters() {
        let game = party_game();
        let owner = Delegate::Player(PlayerId::new("p2"));
        let interrupt = select_party(&game, &PlayerId::new("p1"), Some("Replace"), 1, Some(owner));
        // Reds has only its leader, Unity is empty.
        assert_eq!(interrupt.input.len(), 1);
    }

    #[test]
    fn test_select_party_resolution_sends_delegate() {
        let mut game = party_game();
        let p1 = PlayerId::new("p1");
        let mut interrupt = select_party(&game, &p1, None, 2, None);

        let r = resolve(&mut interrupt.input, &InputResponse::or(2, InputResponse::Option)).unwrap();
        let follow = execute(&mut game, &p1, &r.action, &r.value).unwrap();
        assert!(follow.is_none());

        let unity = game.party("Unity").unwrap();
        assert_eq!(unity.leader, Some(Delegate::Player(p1.clone())));
        assert_eq!(unity.size(), 2);
    }
}
