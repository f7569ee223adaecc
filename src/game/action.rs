//! Node Actions
//!
//! Tagged effects bound to input leaves, interpreted by [`execute`] once the
//! leaf is chosen. Keeping effects as data means a pending tree round-trips
//! through a snapshot and a resolution can be replayed without game content.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::ids::PlayerId;
use crate::game::events::GameEventData;
use crate::game::input::{InputTree, ResolvedValue};
use crate::game::state::{Delegate, Game};

/// Effect of choosing a leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Nothing happens.
    Noop,
    /// Add a fixed amount to a resource.
    AddResource {
        resource: String,
        amount: i64,
    },
    /// Add the chosen amount to a resource. Only valid on amount leaves.
    AddChosenAmount {
        resource: String,
    },
    /// Send delegates to a party, optionally displacing another owner's.
    SendDelegate {
        party: String,
        count: u32,
        #[serde(default)]
        replace: Option<Delegate>,
    },
    /// Append a message to the game log.
    Log {
        message: String,
    },
    /// Continue the decision with a follow-up prompt.
    Prompt {
        input: Box<InputTree>,
    },
    /// Run several actions in order.
    Sequence {
        actions: Vec<Action>,
    },
}

impl Action {
    /// Follow-up prompt action.
    pub fn prompt(input: InputTree) -> Self {
        Action::Prompt { input: Box::new(input) }
    }
}

/// Failures while running an action against a game.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Player is not seated in this game.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// No party with this name.
    #[error("unknown party {0}")]
    UnknownParty(String),

    /// Not enough delegates of the displaced owner.
    #[error("no replaceable delegate in party {party}")]
    DelegateNotFound { party: String },

    /// Action needs an amount but the leaf produced something else.
    #[error("action requires an amount value")]
    AmountRequired,

    /// Resource total left the representable range.
    #[error("resource {0} overflowed")]
    ResourceOverflow(String),

    /// More than one follow-up prompt from a single action.
    #[error("action produced more than one follow-up prompt")]
    MultipleFollowUps,
}

/// Run `action` for `player` with the resolved `value`.
///
/// Returns the follow-up prompt, if the action produced one.
pub fn execute(
    game: &mut Game,
    player: &PlayerId,
    action: &Action,
    value: &ResolvedValue,
) -> Result<Option<InputTree>, ActionError> {
    match action {
        Action::Noop => Ok(None),
        Action::AddResource { resource, amount } => {
            game.adjust_resource(player, resource, *amount)?;
            Ok(None)
        }
        Action::AddChosenAmount { resource } => {
            let amount = value.amount().ok_or(ActionError::AmountRequired)?;
            game.adjust_resource(player, resource, amount)?;
            Ok(None)
        }
        Action::SendDelegate { party, count, replace } => {
            game.send_delegates(player, party, *count, replace.as_ref())?;
            Ok(None)
        }
        Action::Log { message } => {
            game.log_event(GameEventData::Message {
                player: player.clone(),
                message: message.clone(),
            });
            Ok(None)
        }
        Action::Prompt { input } => Ok(Some(input.as_ref().clone())),
        Action::Sequence { actions } => {
            let mut follow_up = None;
            for step in actions {
                if let Some(next) = execute(game, player, step, value)? {
                    if follow_up.is_some() {
                        return Err(ActionError::MultipleFollowUps);
                    }
                    follow_up = Some(next);
                }
            }
            Ok(follow_up)
        }
    }
}
