//! Player Input Trees
//!
//! A game that is waiting for a decision holds a tree of typed prompts.
//! Leaves are atomic decisions (pick an option, pick an amount, send a custom
//! payload); composites either accept exactly one child (`Or`) or require all
//! children in order (`And`).
//!
//! Every node carries an [`Action`] instead of a closure, so a pending tree
//! serializes into the snapshot together with the rest of the game.

use std::fmt;

use serde::{Serialize, Deserialize};

use crate::game::action::Action;

// =============================================================================
// KINDS
// =============================================================================

/// Shape of a prompt or of a response to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Answer to an `Or` tree.
    Or,
    /// Answer to an `And` tree.
    And,
    /// Choose a labeled option.
    Option,
    /// Choose a bounded integer.
    Amount,
    /// Free-form payload.
    Custom,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResponseKind::Or => "OrOptions",
            ResponseKind::And => "AndOptions",
            ResponseKind::Option => "SelectOption",
            ResponseKind::Amount => "SelectAmount",
            ResponseKind::Custom => "Custom",
        };
        f.write_str(label)
    }
}

// =============================================================================
// LEAVES
// =============================================================================

/// What a leaf asks for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeSpec {
    /// Pick this option.
    Option,
    /// Pick an integer in `[min, max]`.
    Amount {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Supply a payload interpreted by game content.
    Custom {
        /// Name of the payload shape, shown to clients.
        schema: String,
    },
}

impl NodeSpec {
    /// Response kind this leaf accepts.
    pub fn kind(&self) -> ResponseKind {
        match self {
            NodeSpec::Option => ResponseKind::Option,
            NodeSpec::Amount { .. } => ResponseKind::Amount,
            NodeSpec::Custom { .. } => ResponseKind::Custom,
        }
    }
}

/// Atomic decision unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputNode {
    /// Human-readable label.
    pub label: String,
    /// Accepted response shape.
    pub spec: NodeSpec,
    /// Executed with the parsed value once this leaf is chosen.
    pub action: Action,
}

impl InputNode {
    /// Option leaf.
    pub fn option(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            spec: NodeSpec::Option,
            action,
        }
    }

    /// Amount leaf with inclusive bounds.
    pub fn amount(label: impl Into<String>, min: i64, max: i64, action: Action) -> Self {
        Self {
            label: label.into(),
            spec: NodeSpec::Amount { min, max },
            action,
        }
    }

    /// Custom payload leaf.
    pub fn custom(label: impl Into<String>, schema: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            spec: NodeSpec::Custom { schema: schema.into() },
            action,
        }
    }

    /// Response kind this leaf accepts.
    pub fn kind(&self) -> ResponseKind {
        self.spec.kind()
    }
}

// =============================================================================
// TREES
// =============================================================================

/// Composite combinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// Exactly one child resolves the tree.
    Or,
    /// Every child, in presentation order.
    And,
}

impl Combinator {
    /// Response kind this combinator accepts.
    pub fn kind(self) -> ResponseKind {
        match self {
            Combinator::Or => ResponseKind::Or,
            Combinator::And => ResponseKind::And,
        }
    }
}

/// A child of an [`InputTree`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Leaf decision.
    Node(InputNode),
    /// Nested tree.
    Tree(InputTree),
}

impl Input {
    /// Response kind expected for this child.
    pub fn kind(&self) -> ResponseKind {
        match self {
            Input::Node(node) => node.kind(),
            Input::Tree(tree) => tree.combinator.kind(),
        }
    }
}

impl From<InputNode> for Input {
    fn from(node: InputNode) -> Self {
        Input::Node(node)
    }
}

impl From<InputTree> for Input {
    fn from(tree: InputTree) -> Self {
        Input::Tree(tree)
    }
}

/// Composite prompt.
///
/// Children are addressed by their 0-based position, which never changes for
/// the lifetime of the tree. Resolution progress lives on the tree itself:
/// `cursor` is the next `And` child to answer, `locked` pins an `Or` to a child
/// sub-tree that has been partially answered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputTree {
    /// How children combine.
    pub combinator: Combinator,
    /// Prompt title.
    pub title: String,
    children: Vec<Input>,
    #[serde(default)]
    cursor: usize,
    #[serde(default)]
    locked: Option<usize>,
}

impl InputTree {
    /// Create an empty tree.
    pub fn new(combinator: Combinator, title: impl Into<String>) -> Self {
        Self {
            combinator,
            title: title.into(),
            children: Vec::new(),
            cursor: 0,
            locked: None,
        }
    }

    /// `Or` tree over the given children.
    pub fn or<I>(title: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Input>,
    {
        Self::new(Combinator::Or, title).with_children(children)
    }

    /// `And` tree over the given children.
    pub fn and<I>(title: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Input>,
    {
        Self::new(Combinator::And, title).with_children(children)
    }

    /// Append children.
    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Input>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Append one child.
    pub fn push(&mut self, child: impl Into<Input>) {
        self.children.push(child.into());
    }

    /// Children in presentation order.
    pub fn children(&self) -> &[Input] {
        &self.children
    }

    /// Child at `index`.
    pub fn child(&self, index: usize) -> Option<&Input> {
        self.children.get(index)
    }

    pub(crate) fn child_mut(&mut self, index: usize) -> Option<&mut Input> {
        self.children.get_mut(index)
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True if the tree has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Next `And` child to answer.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// `Or` child this tree is pinned to, if any.
    pub fn locked(&self) -> Option<usize> {
        self.locked
    }

    /// True once any part of the tree has been answered.
    pub fn is_started(&self) -> bool {
        self.cursor > 0 || self.locked.is_some()
    }

    pub(crate) fn advance(&mut self) {
        self.cursor += 1;
    }

    pub(crate) fn set_locked(&mut self, locked: Option<usize>) {
        self.locked = locked;
    }
}

// =============================================================================
// RESPONSES
// =============================================================================

/// A player's answer to a pending tree.
///
/// Wire form (JSON): `{"type":"or","index":2,"response":{"type":"amount","amount":8}}`.
/// The nested response targets the child at `index` and must match its kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputResponse {
    /// Answer one child of an `Or` tree.
    Or {
        /// Targeted child.
        index: usize,
        /// Answer for that child.
        response: Box<InputResponse>,
    },
    /// Answer the current child of an `And` tree.
    And {
        /// Targeted child.
        index: usize,
        /// Answer for that child.
        response: Box<InputResponse>,
    },
    /// Pick an option leaf.
    Option,
    /// Pick an amount.
    Amount {
        /// Chosen value.
        amount: i64,
    },
    /// Custom payload.
    Custom {
        /// Opaque payload.
        payload: serde_json::Value,
    },
}

impl InputResponse {
    /// `Or` response wrapping `response`.
    pub fn or(index: usize, response: InputResponse) -> Self {
        InputResponse::Or { index, response: Box::new(response) }
    }

    /// `And` response wrapping `response`.
    pub fn and(index: usize, response: InputResponse) -> Self {
        InputResponse::And { index, response: Box::new(response) }
    }

    /// Amount response.
    pub fn amount(amount: i64) -> Self {
        InputResponse::Amount { amount }
    }

    /// Kind of this response.
    pub fn kind(&self) -> ResponseKind {
        match self {
            InputResponse::Or { .. } => ResponseKind::Or,
            InputResponse::And { .. } => ResponseKind::And,
            InputResponse::Option => ResponseKind::Option,
            InputResponse::Amount { .. } => ResponseKind::Amount,
            InputResponse::Custom { .. } => ResponseKind::Custom,
        }
    }
}

/// Parsed, bounds-checked value handed to a leaf's action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResolvedValue {
    /// An option was picked.
    Option,
    /// An amount within bounds.
    Amount(i64),
    /// A custom payload.
    Custom(serde_json::Value),
}

impl ResolvedValue {
    /// The amount, if this is an amount value.
    pub fn amount(&self) -> Option<i64> {
        match self {
            ResolvedValue::Amount(amount) => Some(*amount),
            _ => None,
        }
    }
}
