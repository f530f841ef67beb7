//! Pre-order and post-order traversal that tolerates structural edits made
//! from inside the visitor.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use super::ancestor::AncestorChain;
use super::node::{Node, NodeRef, NodeVector};

/// Callback invoked once per node during a traversal.
///
/// The two orders treat the return value differently:
///
/// * Pre-order: `false` means "do not descend into this node". Siblings are
///   still visited and the traversal as a whole carries on.
/// * Post-order: `false` means "stop". The remaining siblings are skipped and
///   `false` propagates up through every ancestor, none of which is visited.
///
/// The visitor may edit the tree through the chain it receives. A node the
/// visitor detaches is not descended into (pre-order) and a node detached
/// while its children were processed is not visited (post-order).
pub trait Visitor {
    fn visit(&mut self, chain: &AncestorChain<'_>) -> bool;
}

/// Adapts a closure into a [`Visitor`].
pub struct FnVisitor<F>(F);

/// Wraps a closure so it can be passed where a [`Visitor`] is expected.
pub fn visitor_fn<F>(f: F) -> FnVisitor<F>
where
    F: FnMut(&AncestorChain<'_>) -> bool,
{
    FnVisitor(f)
}

impl<F> Visitor for FnVisitor<F>
where
    F: FnMut(&AncestorChain<'_>) -> bool,
{
    fn visit(&mut self, chain: &AncestorChain<'_>) -> bool {
        (self.0)(chain)
    }
}

impl Node {
    /// Visits this node, then its children. `ancestors` is the chain of the
    /// node's parents, if the caller has one.
    pub fn accept_pre_order<V: Visitor + ?Sized>(
        self: &Rc<Self>,
        visitor: &mut V,
        ancestors: Option<&AncestorChain<'_>>,
    ) -> bool {
        let chain = AncestorChain::extend(ancestors, self);
        walk_pre_order(&chain, visitor)
    }

    /// Visits the children, then this node. Returns `false` if any visit did.
    pub fn accept_post_order<V: Visitor + ?Sized>(
        self: &Rc<Self>,
        visitor: &mut V,
        ancestors: Option<&AncestorChain<'_>>,
    ) -> bool {
        let chain = AncestorChain::extend(ancestors, self);
        walk_post_order(&chain, visitor)
    }
}

/// Cheap attachment check: an unchanged parent generation proves the node is
/// still in place, otherwise the parent's list is searched.
fn still_attached(chain: &AncestorChain<'_>, parent_generation: Option<u64>) -> bool {
    match (chain.parent_node(), parent_generation) {
        (Some(parent), Some(before)) if parent.generation() == before => true,
        (Some(parent), _) => parent.contains_child(chain.node()),
        (None, _) => true,
    }
}

fn walk_pre_order<V: Visitor + ?Sized>(chain: &AncestorChain<'_>, visitor: &mut V) -> bool {
    let parent_generation = chain.parent_node().map(|parent| parent.generation());
    if !visitor.visit(chain) {
        return false;
    }
    if !still_attached(chain, parent_generation) {
        trace!("{} detached during visit, skipping its children", chain.node().tag());
        return true;
    }
    let mut cursor = ChildCursor::new(chain.node());
    while let Some(child) = cursor.advance() {
        walk_pre_order(&chain.child(&child), visitor);
    }
    true
}

fn walk_post_order<V: Visitor + ?Sized>(chain: &AncestorChain<'_>, visitor: &mut V) -> bool {
    let parent_generation = chain.parent_node().map(|parent| parent.generation());
    let mut cursor = ChildCursor::new(chain.node());
    while let Some(child) = cursor.advance() {
        if !walk_post_order(&chain.child(&child), visitor) {
            return false;
        }
    }
    if !still_attached(chain, parent_generation) {
        trace!("{} detached before its post-order visit", chain.node().tag());
        return true;
    }
    visitor.visit(chain)
}

/// How far back from the last visited position a resync looks for a
/// surviving sibling to anchor on.
const RESYNC_WINDOW: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CursorState {
    /// Snapshot matches the live child list.
    InSync,
    /// Parent changed since the snapshot; next position must be recomputed.
    Resyncing,
    Exhausted,
}

/// Walks one node's child list while tolerating edits to it.
///
/// Children are read from a snapshot. When the parent's generation moves on,
/// the cursor takes a new snapshot and picks where to continue:
///
/// 1. right after the last child it handed out, if that is still present;
/// 2. otherwise at the first not-yet-visited old sibling still present;
/// 3. otherwise, if old siblings were still pending, right after the nearest
///    earlier visited sibling still present, looking back at most
///    [`RESYNC_WINDOW`] positions;
/// 4. otherwise it stops. A list whose last child was replaced or removed
///    stops here, so the replacement is never handed out.
///
/// After a resync, children already handed out are skipped so no node is
/// visited twice.
pub(crate) struct ChildCursor<'n> {
    parent: &'n Node,
    snapshot: NodeVector,
    generation: u64,
    next: usize,
    last: Option<NodeRef>,
    /// Keyed by address; the value keeps the node alive so the key stays unique.
    visited: FxHashMap<*const Node, NodeRef>,
    resynced: bool,
    state: CursorState,
}

impl<'n> ChildCursor<'n> {
    pub(crate) fn new(parent: &'n Node) -> Self {
        ChildCursor {
            parent,
            snapshot: parent.children(),
            generation: parent.generation(),
            next: 0,
            last: None,
            visited: FxHashMap::default(),
            resynced: false,
            state: CursorState::InSync,
        }
    }

    pub(crate) fn state(&self) -> CursorState {
        self.state
    }

    pub(crate) fn advance(&mut self) -> Option<NodeRef> {
        loop {
            match self.state {
                CursorState::Exhausted => return None,
                CursorState::Resyncing => self.resync(),
                CursorState::InSync => {
                    if self.parent.generation() != self.generation {
                        self.state = CursorState::Resyncing;
                        continue;
                    }
                    let Some(child) = self.snapshot.get(self.next).cloned() else {
                        self.state = CursorState::Exhausted;
                        return None;
                    };
                    self.next += 1;
                    if self.resynced && self.was_visited(&child) {
                        continue;
                    }
                    self.visited.insert(Rc::as_ptr(&child), child.clone());
                    self.last = Some(child.clone());
                    return Some(child);
                }
            }
        }
    }

    fn was_visited(&self, node: &NodeRef) -> bool {
        self.visited.contains_key(&Rc::as_ptr(node))
    }

    fn resync(&mut self) {
        let live = self.parent.children();
        match self.resume_index(&live) {
            Some(index) => {
                trace!(
                    "Resynced {} children at {} (generation {} -> {})",
                    self.parent.tag(),
                    index,
                    self.generation,
                    self.parent.generation()
                );
                self.snapshot = live;
                self.next = index;
                self.generation = self.parent.generation();
                self.resynced = true;
                self.state = CursorState::InSync;
            }
            None => {
                trace!("Lost position among {} children, stopping", self.parent.tag());
                self.state = CursorState::Exhausted;
            }
        }
    }

    fn resume_index(&self, live: &NodeVector) -> Option<usize> {
        let Some(last) = self.last.as_ref() else {
            return Some(0);
        };
        if let Some(position) = index_of(live, last) {
            return Some(position + 1);
        }
        for pending in self.snapshot.iter().skip(self.next) {
            if let Some(position) = index_of(live, pending) {
                return Some(position);
            }
        }
        if self.next >= self.snapshot.len() {
            return None;
        }
        let last_index = self.next.saturating_sub(1);
        let lower = last_index.saturating_sub(RESYNC_WINDOW);
        (lower..last_index)
            .rev()
            .filter_map(|index| self.snapshot.get(index))
            .find_map(|earlier| index_of(live, earlier))
            .map(|position| position + 1)
    }
}

fn index_of(list: &NodeVector, node: &NodeRef) -> Option<usize> {
    list.iter().position(|child| Rc::ptr_eq(child, node))
}
