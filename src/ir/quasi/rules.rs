//! Ordered rewrite rules and the bottom-up rewriter that applies them.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use super::{Bindings, Pattern, QuasiError};
use crate::ir::ancestor::AncestorChain;
use crate::ir::attributes::{AttributeKey, AttributeValue};
use crate::ir::node::{Node, NodeRef};
use crate::ir::visitor::Visitor;

/// Custom rule body: receives the bindings and the matched node, returns the
/// replacement or `None` to decline.
pub type RuleFn = dyn Fn(&Bindings, &NodeRef) -> Result<Option<NodeRef>, QuasiError>;

pub enum RuleAction {
    /// Instantiate a template with the match bindings.
    Template(Pattern),
    Custom(Box<RuleFn>),
}

pub struct Rule {
    name: String,
    pattern: Pattern,
    action: RuleAction,
}

impl Rule {
    pub fn new(name: &str, pattern: Pattern, template: Pattern) -> Self {
        Rule { name: name.to_string(), pattern, action: RuleAction::Template(template) }
    }

    /// Builds a template rule from quasi source.
    pub fn parse(name: &str, pattern: &str, template: &str) -> Result<Self, QuasiError> {
        Ok(Rule::new(name, Pattern::parse(pattern)?, Pattern::parse(template)?))
    }

    pub fn custom<F>(name: &str, pattern: Pattern, action: F) -> Self
    where
        F: Fn(&Bindings, &NodeRef) -> Result<Option<NodeRef>, QuasiError> + 'static,
    {
        Rule { name: name.to_string(), pattern, action: RuleAction::Custom(Box::new(action)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Replacement for `node`, or `None` if the rule does not apply.
    pub fn fire(&self, node: &NodeRef) -> Result<Option<NodeRef>, QuasiError> {
        let Some(bindings) = self.pattern.match_node(node) else {
            return Ok(None);
        };
        match &self.action {
            RuleAction::Template(template) => template.substitute(&bindings).map(Some),
            RuleAction::Custom(action) => action(&bindings, node),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match &self.action {
            RuleAction::Template(template) => template.to_string(),
            RuleAction::Custom(_) => "<custom>".to_string(),
        };
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.to_string())
            .field("action", &action)
            .finish()
    }
}

/// Rules tried in order; the first one that fires wins.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Replacement from the first rule that fires, with that rule.
    pub fn rewrite_node(&self, node: &NodeRef) -> Result<Option<(&Rule, NodeRef)>, QuasiError> {
        for rule in &self.rules {
            if let Some(replacement) = rule.fire(node)? {
                return Ok(Some((rule, replacement)));
            }
        }
        Ok(None)
    }
}

/// Result of rewriting a tree.
#[derive(Debug)]
pub struct RewriteOutcome {
    /// The root after rewriting; a new node if the root itself was replaced.
    pub root: NodeRef,
    /// Names of the rules applied, in application order.
    pub applied: Vec<String>,
}

/// Applies a [`RuleSet`] to every node of a tree, children before parents.
///
/// Each replacement is spliced into the parent with a mutation, so a
/// replacement that breaks the parent's structure is rolled back and reported.
/// Replacement nodes are not revisited. Replacements without a range inherit
/// the range of the node they replace and are marked `Synthetic`.
pub struct Rewriter<'r> {
    rules: &'r RuleSet,
}

impl<'r> Rewriter<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Rewriter { rules }
    }

    pub fn rewrite(&self, root: &NodeRef) -> Result<RewriteOutcome, QuasiError> {
        let mut pass = RewritePass {
            rules: self.rules,
            new_root: None,
            applied: Vec::new(),
            produced: FxHashMap::default(),
            error: None,
        };
        root.accept_post_order(&mut pass, None);
        if let Some(err) = pass.error {
            warn!("Rewrite stopped after {} rule application(s): {}", pass.applied.len(), err);
            return Err(err);
        }
        Ok(RewriteOutcome { root: pass.new_root.unwrap_or_else(|| Rc::clone(root)), applied: pass.applied })
    }
}

struct RewritePass<'r> {
    rules: &'r RuleSet,
    new_root: Option<NodeRef>,
    applied: Vec<String>,
    /// Every node of every replacement spliced in by this pass, by address.
    produced: FxHashMap<*const Node, NodeRef>,
    error: Option<QuasiError>,
}

impl RewritePass<'_> {
    fn remember(&mut self, node: &NodeRef) {
        if self.produced.insert(Rc::as_ptr(node), Rc::clone(node)).is_none() {
            for child in node.children().iter() {
                self.remember(child);
            }
        }
    }
}

impl Visitor for RewritePass<'_> {
    fn visit(&mut self, chain: &AncestorChain<'_>) -> bool {
        let node = chain.node();
        if self.produced.contains_key(&Rc::as_ptr(node)) {
            trace!("Skipping {} produced by this pass", node.tag());
            return true;
        }
        let (rule, replacement) = match self.rules.rewrite_node(node) {
            Ok(Some(found)) => found,
            Ok(None) => return true,
            Err(err) => {
                self.error = Some(err);
                return false;
            }
        };

        if replacement.range().is_none() {
            replacement.set_range(node.range());
        }
        replacement.set_attribute(AttributeKey::Synthetic, AttributeValue::Flag(true));
        replacement.set_attribute(AttributeKey::RewrittenBy, AttributeValue::Text(rule.name().to_string()));

        self.remember(&replacement);
        match chain.parent_node() {
            Some(_) => {
                if let Err(err) = chain.replace_with(replacement) {
                    self.error = Some(err.into());
                    return false;
                }
            }
            None => self.new_root = Some(replacement),
        }
        debug!("Rule '{}' rewrote {} at {}", rule.name(), node.tag(), chain.path());
        self.applied.push(rule.name().to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::{Node, SourceId};
    use crate::ir::quasi::{parse_tree, parse_tree_with_source};

    fn fold_zero() -> Rule {
        Rule::parse("fold-add-zero", "(Operation + @x 0)", "@x").unwrap()
    }

    #[test]
    fn test_first_rule_wins() {
        let rules = RuleSet::new()
            .with_rule(Rule::parse("first", "(Operation + @a @b)", "(Operation - @a @b)").unwrap())
            .with_rule(Rule::parse("second", "(Operation + @a @b)", "(Operation * @a @b)").unwrap());
        let tree = parse_tree("(Operation + a b)").unwrap();
        let (rule, replacement) = rules.rewrite_node(&tree).unwrap().unwrap();
        assert_eq!(rule.name(), "first");
        assert!(replacement.structurally_equal(&parse_tree("(Operation - a b)").unwrap()));
    }

    #[test]
    fn test_custom_rule_may_decline() {
        let declines = Rule::custom("declines", Pattern::parse("@any").unwrap(), |_, _| Ok(None));
        let rules = RuleSet::new().with_rule(declines).with_rule(fold_zero());
        let tree = parse_tree("(Operation + a 0)").unwrap();
        let (rule, _) = rules.rewrite_node(&tree).unwrap().unwrap();
        assert_eq!(rule.name(), "fold-add-zero");
    }

    #[test]
    fn test_rewriter_works_bottom_up() {
        let rules = RuleSet::new().with_rule(fold_zero());
        let tree = parse_tree("(ExpressionStmt (Operation + (Operation + a 0) 0))").unwrap();
        let outcome = Rewriter::new(&rules).rewrite(&tree).unwrap();
        assert!(Rc::ptr_eq(&outcome.root, &tree));
        assert_eq!(outcome.applied, ["fold-add-zero", "fold-add-zero"]);
        assert!(tree.structurally_equal(&parse_tree("(ExpressionStmt a)").unwrap()));
        let a = tree.child(0).unwrap();
        assert_eq!(a.attribute(AttributeKey::RewrittenBy), Some(AttributeValue::Text("fold-add-zero".into())));
    }

    #[test]
    fn test_rewriter_replaces_root() {
        let rules = RuleSet::new().with_rule(fold_zero());
        let tree = parse_tree("(Operation + b 0)").unwrap();
        let outcome = Rewriter::new(&rules).rewrite(&tree).unwrap();
        assert!(outcome.root.structurally_equal(&Node::reference("b")));
    }

    #[test]
    fn test_self_embedding_rule_fires_once_in_any_position() {
        let wrap = Rule::parse("wrap", "(Operation call @f @args*)", "(Operation call guard (Operation call @f @args*))").unwrap();
        let rules = RuleSet::new().with_rule(wrap);
        for (source, expected) in [
            ("(Operation + (Operation call f) x)", "(Operation + (Operation call guard (Operation call f)) x)"),
            ("(Operation + x (Operation call f))", "(Operation + x (Operation call guard (Operation call f)))"),
            ("(Operation call f a)", "(Operation call guard (Operation call f a))"),
        ] {
            let tree = parse_tree(source).unwrap();
            let outcome = Rewriter::new(&rules).rewrite(&tree).unwrap();
            assert_eq!(outcome.applied, ["wrap"], "{}", source);
            assert!(outcome.root.structurally_equal(&parse_tree(expected).unwrap()), "{}", outcome.root);
        }
    }

    #[test]
    fn test_rewriter_reports_structural_errors() {
        // Turning an assignment target into a literal breaks the parent.
        let rules = RuleSet::new().with_rule(Rule::custom("bad", Pattern::parse("(Reference (Identifier x))").unwrap(), |_, _| {
            Ok(Some(Node::number_literal(1.0)))
        }));
        let tree = parse_tree("(ExpressionStmt (Operation = x 2))").unwrap();
        let err = Rewriter::new(&rules).rewrite(&tree).unwrap_err();
        assert!(matches!(err, QuasiError::Tree(_)));
        assert!(tree.structurally_equal(&parse_tree("(ExpressionStmt (Operation = x 2))").unwrap()));
    }

    #[test]
    fn test_replacement_inherits_range() {
        let rules = RuleSet::new().with_rule(Rule::parse("flip", "(Operation + @x 0)", "(Operation - @x 0)").unwrap());
        let tree = parse_tree_with_source("(ExpressionStmt (Operation + a 0))", SourceId::new("t.js")).unwrap();
        let op_range = tree.child(0).and_then(|op| op.range());
        assert!(op_range.is_some());

        Rewriter::new(&rules).rewrite(&tree).unwrap();
        let flipped = tree.child(0).unwrap();
        assert_eq!(flipped.kind().value(), crate::ir::node::NodeValue::Operator(crate::ir::node::Operator::Subtract));
        assert_eq!(flipped.range(), op_range);
        assert!(flipped.has_attribute(AttributeKey::Synthetic));
    }
}
