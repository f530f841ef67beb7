//! Quasiliteral patterns: trees with holes, matched against concrete trees
//! and instantiated from bindings.
//!
//! Patterns are normally written in the s-expression syntax read by
//! [`parse_tree`]:
//!
//! ```text
//! (Operation = @target (Operation call (Reference (Identifier eval)) @args*))
//! ```
//!
//! `@name` stands for exactly one subtree, `@name*` for zero or more siblings
//! and `@name+` for one or more. A `:Kind` suffix restricts what a hole
//! accepts, e.g. `@lhs:Reference` or `@body*:Statement`.

mod matcher;
mod reader;
mod rules;
mod substitute;

use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::error::TreeError;
use super::node::{KindTag, Node, NodeRef};

pub use matcher::match_pattern;
pub use reader::{parse_tree, parse_tree_with_source};
pub use rules::{RewriteOutcome, Rewriter, Rule, RuleAction, RuleSet};
pub use substitute::substitute;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    ExactlyOne,
    ZeroOrMore,
    OneOrMore,
}

impl Quantifier {
    /// Holes that stand for a run of siblings rather than one node.
    pub fn is_variable(self) -> bool {
        !matches!(self, Quantifier::ExactlyOne)
    }

    /// Fewest nodes the hole can stand for.
    pub fn min(self) -> usize {
        match self {
            Quantifier::ZeroOrMore => 0,
            _ => 1,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Quantifier::ExactlyOne => "",
            Quantifier::ZeroOrMore => "*",
            Quantifier::OneOrMore => "+",
        }
    }
}

/// Restricts which nodes a hole unifies with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HoleFilter {
    #[default]
    Any,
    Kind(KindTag),
    Statement,
    Expression,
}

impl HoleFilter {
    pub fn from_name(name: &str) -> Option<HoleFilter> {
        match name {
            "Any" => Some(HoleFilter::Any),
            "Statement" => Some(HoleFilter::Statement),
            "Expression" => Some(HoleFilter::Expression),
            other => KindTag::from_name(other).map(HoleFilter::Kind),
        }
    }

    pub fn accepts(self, node: &Node) -> bool {
        match self {
            HoleFilter::Any => true,
            HoleFilter::Kind(tag) => node.tag() == tag,
            HoleFilter::Statement => node.tag().is_statement(),
            HoleFilter::Expression => node.tag().is_expression(),
        }
    }
}

impl fmt::Display for HoleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoleFilter::Any => Ok(()),
            HoleFilter::Kind(tag) => write!(f, ":{}", tag),
            HoleFilter::Statement => f.write_str(":Statement"),
            HoleFilter::Expression => f.write_str(":Expression"),
        }
    }
}

/// Descriptor carried by a `QuasiHole` node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuasiHole {
    name: String,
    quantifier: Quantifier,
    filter: HoleFilter,
}

impl QuasiHole {
    pub fn new(name: &str, quantifier: Quantifier, filter: HoleFilter) -> Self {
        QuasiHole { name: name.to_string(), quantifier, filter }
    }

    pub fn exactly_one(name: &str) -> Self {
        QuasiHole::new(name, Quantifier::ExactlyOne, HoleFilter::Any)
    }

    pub fn zero_or_more(name: &str) -> Self {
        QuasiHole::new(name, Quantifier::ZeroOrMore, HoleFilter::Any)
    }

    pub fn one_or_more(name: &str) -> Self {
        QuasiHole::new(name, Quantifier::OneOrMore, HoleFilter::Any)
    }

    pub fn with_filter(mut self, filter: HoleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantifier(&self) -> Quantifier {
        self.quantifier
    }

    pub fn filter(&self) -> HoleFilter {
        self.filter
    }

    pub fn accepts(&self, node: &Node) -> bool {
        self.filter.accepts(node)
    }
}

impl fmt::Display for QuasiHole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}{}{}", self.name, self.quantifier.suffix(), self.filter)
    }
}

/// What a hole was bound to by a match.
#[derive(Debug, Clone)]
pub enum Binding {
    Single(NodeRef),
    Many(Vec<NodeRef>),
}

impl Binding {
    pub fn structurally_equal(&self, other: &Binding) -> bool {
        match (self, other) {
            (Binding::Single(a), Binding::Single(b)) => a.structurally_equal(b),
            (Binding::Many(a), Binding::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structurally_equal(y))
            }
            _ => false,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Binding::Single(_) => "a single node",
            Binding::Many(_) => "a node sequence",
        }
    }
}

/// Hole name to bound subtree(s).
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: FxHashMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.map.get(name)
    }

    pub fn single(&self, name: &str) -> Option<&NodeRef> {
        match self.map.get(name) {
            Some(Binding::Single(node)) => Some(node),
            _ => None,
        }
    }

    pub fn many(&self, name: &str) -> Option<&[NodeRef]> {
        match self.map.get(name) {
            Some(Binding::Many(nodes)) => Some(nodes),
            _ => None,
        }
    }

    pub fn insert(&mut self, name: &str, binding: Binding) -> Option<Binding> {
        self.map.insert(name.to_string(), binding)
    }

    pub fn bind_single(mut self, name: &str, node: NodeRef) -> Self {
        self.insert(name, Binding::Single(node));
        self
    }

    pub fn bind_many(mut self, name: &str, nodes: Vec<NodeRef>) -> Self {
        self.insert(name, Binding::Many(nodes));
        self
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.map.iter().map(|(name, binding)| (name.as_str(), binding))
    }

    /// Same names bound to structurally equal subtrees.
    pub fn structurally_equal(&self, other: &Bindings) -> bool {
        self.map.len() == other.map.len()
            && self
                .map
                .iter()
                .all(|(name, binding)| other.map.get(name).is_some_and(|theirs| binding.structurally_equal(theirs)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuasiError {
    #[error("quasi syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("no binding for @{0}")]
    MissingBinding(String),

    #[error("@{name} needs {expected} but is bound to {found}")]
    QuantifierMismatch { name: String, expected: &'static str, found: &'static str },

    #[error("{parent} has more than one variable-length hole among its children (@{first} and @{second})")]
    AmbiguousHoles { parent: KindTag, first: String, second: String },

    #[error("variable-length hole @{0} cannot stand for a whole tree")]
    SpreadAtRoot(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// A validated pattern or template tree.
#[derive(Debug, Clone)]
pub struct Pattern {
    root: NodeRef,
}

impl Pattern {
    /// Checks that no child list has more than one variable-length hole and
    /// that the root is not one.
    pub fn new(root: NodeRef) -> Result<Self, QuasiError> {
        if let Some(hole) = root.as_hole().filter(|hole| hole.quantifier().is_variable()) {
            return Err(QuasiError::SpreadAtRoot(hole.name().to_string()));
        }
        validate(&root)?;
        Ok(Pattern { root })
    }

    pub fn parse(source: &str) -> Result<Self, QuasiError> {
        Pattern::new(parse_tree(source)?)
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Distinct hole names, sorted.
    pub fn hole_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_holes(&self.root, &mut names);
        names.sort();
        names.dedup();
        names
    }

    pub fn match_node(&self, candidate: &NodeRef) -> Option<Bindings> {
        match_pattern(&self.root, candidate)
    }

    pub fn substitute(&self, bindings: &Bindings) -> Result<NodeRef, QuasiError> {
        substitute(&self.root, bindings)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

fn validate(node: &Node) -> Result<(), QuasiError> {
    let mut spread: Option<String> = None;
    for child in node.children().iter() {
        if let Some(hole) = child.as_hole().filter(|hole| hole.quantifier().is_variable()) {
            if let Some(first) = spread.take() {
                return Err(QuasiError::AmbiguousHoles {
                    parent: node.tag(),
                    first,
                    second: hole.name().to_string(),
                });
            }
            spread = Some(hole.name().to_string());
        }
        validate(child)?;
    }
    Ok(())
}

fn collect_holes(node: &Node, names: &mut Vec<String>) {
    if let Some(hole) = node.as_hole() {
        names.push(hole.name().to_string());
    }
    for child in node.children().iter() {
        collect_holes(child, names);
    }
}
