//! Input Resolution
//!
//! Matches an [`InputResponse`] against a pending [`InputTree`].
//!
//! Resolution runs in two phases. [`plan`] walks the single path addressed by
//! the response without touching the tree and fails on the first invalid step.
//! Only a valid plan is committed, advancing `And` cursors and `Or` locks along
//! that path. A rejected response therefore leaves the tree exactly as it was,
//! and the caller can resubmit.

use thiserror::Error;

use crate::game::action::Action;
use crate::game::input::{
    Combinator, Input, InputNode, InputResponse, InputTree, NodeSpec, ResolvedValue, ResponseKind,
};

/// Rejected responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Index outside `[0, len)`.
    #[error("Invalid index {index}: prompt has {len} options")]
    InvalidIndex { index: usize, len: usize },

    /// Response shape does not match the addressed prompt.
    #[error("Not a valid {expected}Response (received {received}Response)")]
    WrongResponse {
        expected: ResponseKind,
        received: ResponseKind,
    },

    /// Amount outside the leaf's bounds.
    #[error("Amount {amount} outside [{min}, {max}]")]
    AmountOutOfRange { amount: i64, min: i64, max: i64 },

    /// An `And` child answered before the current one.
    #[error("Out of order: expected answer for option {expected}, received {received}")]
    OutOfOrder { expected: usize, received: usize },

    /// An `Or` already committed to a partially answered child.
    #[error("Option {locked} is in progress, cannot answer option {received}")]
    Locked { locked: usize, received: usize },
}

/// A validated, not yet applied resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Child indices from the root to the addressed leaf.
    pub path: Vec<usize>,
    /// Parsed leaf value.
    pub value: ResolvedValue,
    /// Leaf action to execute.
    pub action: Action,
}

/// Result of a committed resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Child indices from the root to the addressed leaf.
    pub path: Vec<usize>,
    /// Parsed leaf value.
    pub value: ResolvedValue,
    /// Leaf action to execute.
    pub action: Action,
    /// True once the root tree needs no further answers.
    pub complete: bool,
}

/// Validate `response` against `tree` without changing it.
pub fn plan(tree: &InputTree, response: &InputResponse) -> Result<Plan, InputError> {
    let mut path = Vec::new();
    let (value, action) = plan_tree(tree, response, &mut path)?;
    Ok(Plan { path, value, action })
}

/// Validate and apply `response` to `tree`.
pub fn resolve(tree: &mut InputTree, response: &InputResponse) -> Result<Resolution, InputError> {
    let Plan { path, value, action } = plan(tree, response)?;
    let complete = commit(tree, &path);
    Ok(Resolution { path, value, action, complete })
}

fn plan_tree(
    tree: &InputTree,
    response: &InputResponse,
    path: &mut Vec<usize>,
) -> Result<(ResolvedValue, Action), InputError> {
    let (index, inner) = match (tree.combinator, response) {
        (Combinator::Or, InputResponse::Or { index, response })
        | (Combinator::And, InputResponse::And { index, response }) => (*index, response.as_ref()),
        _ => {
            return Err(InputError::WrongResponse {
                expected: tree.combinator.kind(),
                received: response.kind(),
            })
        }
    };

    let child = tree.child(index).ok_or(InputError::InvalidIndex {
        index,
        len: tree.len(),
    })?;

    match tree.combinator {
        Combinator::And if index != tree.cursor() => {
            return Err(InputError::OutOfOrder {
                expected: tree.cursor(),
                received: index,
            });
        }
        Combinator::Or => {
            if let Some(locked) = tree.locked().filter(|locked| *locked != index) {
                return Err(InputError::Locked { locked, received: index });
            }
        }
        _ => {}
    }

    path.push(index);
    match child {
        Input::Node(node) => plan_node(node, inner),
        Input::Tree(sub) => plan_tree(sub, inner, path),
    }
}

fn plan_node(node: &InputNode, response: &InputResponse) -> Result<(ResolvedValue, Action), InputError> {
    let value = match (&node.spec, response) {
        (NodeSpec::Option, InputResponse::Option) => ResolvedValue::Option,
        (NodeSpec::Amount { min, max }, InputResponse::Amount { amount }) => {
            if amount < min || amount > max {
                return Err(InputError::AmountOutOfRange {
                    amount: *amount,
                    min: *min,
                    max: *max,
                });
            }
            ResolvedValue::Amount(*amount)
        }
        (NodeSpec::Custom { .. }, InputResponse::Custom { payload }) => {
            ResolvedValue::Custom(payload.clone())
        }
        _ => {
            return Err(InputError::WrongResponse {
                expected: node.kind(),
                received: response.kind(),
            })
        }
    };
    Ok((value, node.action.clone()))
}

/// Apply a validated path. Returns whether `tree` is now complete.
fn commit(tree: &mut InputTree, path: &[usize]) -> bool {
    let Some((&index, rest)) = path.split_first() else {
        return false;
    };

    let child_complete = match tree.child_mut(index) {
        Some(Input::Tree(sub)) => commit(sub, rest),
        Some(Input::Node(_)) => true,
        None => false,
    };

    match tree.combinator {
        Combinator::Or => {
            // A finished child frees the tree; a half-answered one pins it.
            tree.set_locked(if child_complete { None } else { Some(index) });
            child_complete
        }
        Combinator::And => {
            if child_complete {
                tree.advance();
            }
            tree.cursor() >= tree.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(tag: i64) -> Action {
        Action::AddResource { resource: "picked".into(), amount: tag }
    }

    fn three_way() -> InputTree {
        InputTree::or(
            "Choose",
            [
                Input::Node(InputNode::option("two", record(2))),
                Input::Node(InputNode::option("three", record(3))),
                Input::Node(InputNode::amount("amount", 0, 10, Action::AddChosenAmount { resource: "picked".into() })),
            ],
        )
    }

    #[test]
    fn test_or_picks_addressed_child() {
        let mut tree = three_way();

        let r = resolve(&mut tree, &InputResponse::or(0, InputResponse::Option)).unwrap();
        assert_eq!(r.action, record(2));
        assert!(r.complete);

        let r = resolve(&mut tree, &InputResponse::or(1, InputResponse::Option)).unwrap();
        assert_eq!(r.action, record(3));

        let r = resolve(&mut tree, &InputResponse::or(2, InputResponse::amount(8))).unwrap();
        assert_eq!(r.value, ResolvedValue::Amount(8));
        assert_eq!(r.path, vec![2]);
    }

    #[test]
    fn test_wrong_response_names_both_kinds() {
        let mut tree = three_way();
        let err = resolve(&mut tree, &InputResponse::or(2, InputResponse::Option)).unwrap_err();
        assert_eq!(
            err,
            InputError::WrongResponse { expected: ResponseKind::Amount, received: ResponseKind::Option }
        );
        let message = err.to_string();
        assert!(message.contains("Not a valid SelectAmountResponse"));
        assert!(message.contains("SelectOption"));
    }

    #[test]
    fn test_invalid_index() {
        let mut tree = three_way();
        for index in [3, 5] {
            let err = resolve(&mut tree, &InputResponse::or(index, InputResponse::Option)).unwrap_err();
            assert!(err.to_string().starts_with("Invalid index"));
        }
    }

    #[test]
    fn test_amount_bounds() {
        let mut tree = three_way();
        let err = resolve(&mut tree, &InputResponse::or(2, InputResponse::amount(11))).unwrap_err();
        assert_eq!(err, InputError::AmountOutOfRange { amount: 11, min: 0, max: 10 });
        assert!(resolve(&mut tree, &InputResponse::or(2, InputResponse::amount(0))).is_ok());
        assert!(resolve(&mut tree, &InputResponse::or(2, InputResponse::amount(10))).is_ok());
        assert!(resolve(&mut tree, &InputResponse::or(2, InputResponse::amount(-1))).is_err());
    }

    #[test]
    fn test_combinator_mismatch() {
        let mut tree = three_way();
        let err = resolve(&mut tree, &InputResponse::and(0, InputResponse::Option)).unwrap_err();
        assert_eq!(
            err,
            InputError::WrongResponse { expected: ResponseKind::Or, received: ResponseKind::And }
        );
    }

    #[test]
    fn test_and_requires_order() {
        let mut tree = InputTree::and(
            "Both",
            [InputNode::option("first", record(1)), InputNode::option("second", record(2))],
        );

        let err = resolve(&mut tree, &InputResponse::and(1, InputResponse::Option)).unwrap_err();
        assert_eq!(err, InputError::OutOfOrder { expected: 0, received: 1 });
        assert_eq!(tree.cursor(), 0);

        let r = resolve(&mut tree, &InputResponse::and(0, InputResponse::Option)).unwrap();
        assert!(!r.complete);
        assert_eq!(tree.cursor(), 1);

        let r = resolve(&mut tree, &InputResponse::and(1, InputResponse::Option)).unwrap();
        assert!(r.complete);
        assert_eq!(r.action, record(2));
    }

    #[test]
    fn test_nested_and_locks_parent_or() {
        let inner = InputTree::and(
            "Pair",
            [InputNode::option("a", record(1)), InputNode::option("b", record(2))],
        );
        let mut tree = InputTree::or(
            "Outer",
            [Input::Tree(inner), Input::Node(InputNode::option("other", record(9)))],
        );

        let step = InputResponse::or(0, InputResponse::and(0, InputResponse::Option));
        let r = resolve(&mut tree, &step).unwrap();
        assert!(!r.complete);
        assert_eq!(r.path, vec![0, 0]);
        assert_eq!(tree.locked(), Some(0));

        let err = resolve(&mut tree, &InputResponse::or(1, InputResponse::Option)).unwrap_err();
        assert_eq!(err, InputError::Locked { locked: 0, received: 1 });

        let finish = InputResponse::or(0, InputResponse::and(1, InputResponse::Option));
        let r = resolve(&mut tree, &finish).unwrap();
        assert!(r.complete);
        assert_eq!(r.action, record(2));
    }

    #[test]
    fn test_rejection_leaves_tree_untouched() {
        let inner = InputTree::and(
            "Pair",
            [InputNode::option("a", record(1)), InputNode::amount("n", 1, 3, record(2))],
        );
        let mut tree = InputTree::and("Outer", [Input::Tree(inner)]);
        resolve(&mut tree, &InputResponse::and(0, InputResponse::and(0, InputResponse::Option))).unwrap();
        let before = tree.clone();

        let bad = InputResponse::and(0, InputResponse::and(1, InputResponse::amount(7)));
        assert!(resolve(&mut tree, &bad).is_err());
        assert_eq!(tree, before);
    }

    #[test]
    fn test_custom_payload() {
        let mut tree = InputTree::or(
            "Custom",
            [InputNode::custom("colony", "tile", Action::Noop)],
        );
        let payload = serde_json::json!({"x": 1, "y": 2});
        let r = resolve(
            &mut tree,
            &InputResponse::or(0, InputResponse::Custom { payload: payload.clone() }),
        )
        .unwrap();
        assert_eq!(r.value, ResolvedValue::Custom(payload));
    }

    proptest! {
        #[test]
        fn prop_or_resolves_only_addressed_child(n in 1usize..12, pick in 0usize..12) {
            let i = pick % n;
            let mut tree = InputTree::or(
                "Many",
                (0..n).map(|k| InputNode::option(format!("o{k}"), record(k as i64))),
            );
            let r = resolve(&mut tree, &InputResponse::or(i, InputResponse::Option)).unwrap();
            prop_assert_eq!(r.action, record(i as i64));
            prop_assert_eq!(r.path, vec![i]);
        }

        #[test]
        fn prop_out_of_range_index_rejected(n in 0usize..12, extra in 0usize..100) {
            let mut tree = InputTree::or(
                "Many",
                (0..n).map(|k| InputNode::option(format!("o{k}"), Action::Noop)),
            );
            let index = n + extra;
            let err = resolve(&mut tree, &InputResponse::or(index, InputResponse::Option)).unwrap_err();
            prop_assert_eq!(err, InputError::InvalidIndex { index, len: n });
        }

        #[test]
        fn prop_kind_mismatch_never_applies(n in 1usize..8, pick in 0usize..8) {
            let i = pick % n;
            let mut tree = InputTree::and(
                "Amounts",
                (0..n).map(|k| InputNode::amount(format!("a{k}"), 0, 5, Action::Noop)),
            );
            let before = tree.clone();
            let err = resolve(&mut tree, &InputResponse::and(i, InputResponse::Option));
            prop_assert!(err.is_err());
            prop_assert_eq!(tree, before);
        }
    }
}
