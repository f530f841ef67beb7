//! Tree unification of a pattern against a concrete tree.
//!
//! Non-hole nodes match when kind and value agree and children match pairwise.
//! In a child list holding a variable-length hole, the fixed patterns before
//! it are matched from the front and those after it from the back; whatever
//! is left in the middle is bound to the hole. A name that occurs more than
//! once must bind structurally equal subtrees every time.

use std::rc::Rc;

use tracing::trace;

use super::{Binding, Bindings};
use crate::ir::node::{Node, NodeRef, NodeVector};

pub fn match_pattern(pattern: &NodeRef, candidate: &NodeRef) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    if unify(pattern, candidate, &mut bindings) {
        trace!("Pattern matched {} with {} binding(s)", candidate.tag(), bindings.len());
        Some(bindings)
    } else {
        None
    }
}

fn unify(pattern: &NodeRef, candidate: &NodeRef, bindings: &mut Bindings) -> bool {
    if let Some(hole) = pattern.as_hole() {
        // Variable-length holes only make sense inside a child list.
        if hole.quantifier().is_variable() || !hole.accepts(candidate) {
            return false;
        }
        return bind_single(hole.name(), candidate, bindings);
    }
    if !pattern.kind().same_value(candidate.kind()) {
        return false;
    }
    unify_children(&pattern.children(), &candidate.children(), bindings)
}

fn unify_children(patterns: &NodeVector, candidates: &NodeVector, bindings: &mut Bindings) -> bool {
    let patterns: Vec<&NodeRef> = patterns.iter().collect();
    let candidates: Vec<&NodeRef> = candidates.iter().collect();

    let spread = patterns
        .iter()
        .position(|p| p.as_hole().is_some_and(|hole| hole.quantifier().is_variable()));
    let Some(split) = spread else {
        return patterns.len() == candidates.len()
            && patterns.iter().zip(&candidates).all(|(p, c)| unify(p, c, bindings));
    };
    let Some(hole) = patterns[split].as_hole() else {
        return false;
    };

    let head = &patterns[..split];
    let tail = &patterns[split + 1..];
    if candidates.len() < head.len() + tail.len() + hole.quantifier().min() {
        return false;
    }
    let tail_start = candidates.len() - tail.len();

    if !head.iter().zip(&candidates[..split]).all(|(p, c)| unify(p, c, bindings)) {
        return false;
    }
    if !tail.iter().zip(&candidates[tail_start..]).all(|(p, c)| unify(p, c, bindings)) {
        return false;
    }
    let middle = &candidates[split..tail_start];
    if !middle.iter().all(|node| hole.accepts(node)) {
        return false;
    }
    bind_many(hole.name(), middle, bindings)
}

fn bind_single(name: &str, candidate: &NodeRef, bindings: &mut Bindings) -> bool {
    match bindings.get(name) {
        Some(Binding::Single(bound)) => bound.structurally_equal(candidate),
        Some(Binding::Many(_)) => false,
        None => {
            bindings.insert(name, Binding::Single(candidate.clone()));
            true
        }
    }
}

fn bind_many(name: &str, run: &[&NodeRef], bindings: &mut Bindings) -> bool {
    match bindings.get(name) {
        Some(Binding::Many(bound)) => {
            bound.len() == run.len() && bound.iter().zip(run).all(|(a, b)| Node::structurally_equal(a, b))
        }
        Some(Binding::Single(_)) => false,
        None => {
            bindings.insert(name, Binding::Many(run.iter().map(|node| Rc::clone(node)).collect()));
            true
        }
    }
}
