//! Atomic batches of child-list edits.
//!
//! A [`Mutation`] collects primitive edits against one node. `execute` applies
//! them in order to the live child list, recording one inverse per edit, then
//! runs the structural checks for the node's kind. Any failure, a panic
//! included, replays the inverses in reverse order and leaves the node exactly
//! as it was. Snapshots taken with [`Node::children`] are never affected.

use std::iter;
use std::rc::Rc;

use scopeguard::{ScopeGuard, guard};
use tracing::{debug, trace};

use super::error::TreeError;
use super::node::{Node, NodeRef, NodeVector};
use super::structure;

#[derive(Debug)]
enum Edit {
    Replace { new: NodeRef, old: NodeRef },
    InsertBefore { new: NodeRef, before: Option<NodeRef> },
    Remove { old: NodeRef },
}

/// Inverse of an applied edit.
#[derive(Debug)]
enum Undo {
    Restore { index: usize, old: NodeRef },
    Detach { index: usize },
    Reinsert { index: usize, node: NodeRef },
}

/// Pending edits against a single node. Nothing changes until [`Mutation::execute`].
#[must_use = "a mutation does nothing until executed"]
pub struct Mutation<'a> {
    node: &'a Node,
    edits: Vec<Edit>,
}

impl<'a> Mutation<'a> {
    pub(crate) fn new(node: &'a Node) -> Self {
        Mutation { node, edits: Vec::new() }
    }

    pub fn replace_child(mut self, new: NodeRef, old: &NodeRef) -> Self {
        self.edits.push(Edit::Replace { new, old: old.clone() });
        self
    }

    /// Inserts before `before`, or appends when `before` is `None`.
    pub fn insert_before(mut self, new: NodeRef, before: Option<&NodeRef>) -> Self {
        self.edits.push(Edit::InsertBefore { new, before: before.cloned() });
        self
    }

    pub fn append_child(self, new: NodeRef) -> Self {
        self.insert_before(new, None)
    }

    pub fn remove_child(mut self, old: &NodeRef) -> Self {
        self.edits.push(Edit::Remove { old: old.clone() });
        self
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Applies every edit or none of them.
    pub fn execute(self) -> Result<(), TreeError> {
        if self.edits.is_empty() {
            return Ok(());
        }
        let node = self.node;
        let mut undo_log = guard(Vec::with_capacity(self.edits.len()), |log: Vec<Undo>| {
            debug!("Rolling back {} edit(s) on {}", log.len(), node.tag());
            rollback(node, log);
        });

        for edit in self.edits {
            let undo = apply(node, edit)?;
            undo_log.push(undo);
        }
        node.with_children_mut(|list| structure::check(node.kind(), list))?;

        let applied = ScopeGuard::into_inner(undo_log);
        node.bump_generation();
        trace!("Applied {} edit(s) on {}, generation {}", applied.len(), node.tag(), node.generation());
        Ok(())
    }
}

fn index_of(list: &NodeVector, node: &NodeRef) -> Option<usize> {
    list.iter().position(|child| Rc::ptr_eq(child, node))
}

fn insert_at(list: &NodeVector, index: usize, node: NodeRef) -> NodeVector {
    if index == list.len() {
        return list.push_back(node);
    }
    list.iter()
        .take(index)
        .cloned()
        .chain(iter::once(node))
        .chain(list.iter().skip(index).cloned())
        .collect()
}

fn remove_at(list: &NodeVector, index: usize) -> NodeVector {
    if index + 1 == list.len() {
        if let Some(shorter) = list.drop_last() {
            return shorter;
        }
    }
    list.iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, child)| child.clone())
        .collect()
}

fn apply(node: &Node, edit: Edit) -> Result<Undo, TreeError> {
    let parent = node.tag();
    let incoming = match &edit {
        Edit::Replace { new, .. } | Edit::InsertBefore { new, .. } => Some(new),
        Edit::Remove { .. } => None,
    };
    if incoming.is_some_and(|new| std::ptr::eq(Rc::as_ptr(new), node)) {
        return Err(TreeError::invalid(parent, "a node cannot be its own child"));
    }
    node.with_children_mut(|list| match edit {
        Edit::Replace { new, old } => {
            if Rc::ptr_eq(&new, &old) || index_of(list, &new).is_some() {
                return Err(TreeError::AlreadyPresent { parent, child: new.tag() });
            }
            let index = index_of(list, &old).ok_or(TreeError::NotFound { parent, child: old.tag() })?;
            list.set_mut(index, new);
            Ok(Undo::Restore { index, old })
        }
        Edit::InsertBefore { new, before } => {
            if index_of(list, &new).is_some() {
                return Err(TreeError::AlreadyPresent { parent, child: new.tag() });
            }
            let index = match &before {
                Some(anchor) => index_of(list, anchor).ok_or(TreeError::NotFound { parent, child: anchor.tag() })?,
                None => list.len(),
            };
            *list = insert_at(list, index, new);
            Ok(Undo::Detach { index })
        }
        Edit::Remove { old } => {
            let index = index_of(list, &old).ok_or(TreeError::NotFound { parent, child: old.tag() })?;
            *list = remove_at(list, index);
            Ok(Undo::Reinsert { index, node: old })
        }
    })
}

fn rollback(node: &Node, log: Vec<Undo>) {
    node.with_children_mut(|list| {
        for undo in log.into_iter().rev() {
            match undo {
                Undo::Restore { index, old } => {
                    list.set_mut(index, old);
                }
                Undo::Detach { index } => *list = remove_at(list, index),
                Undo::Reinsert { index, node } => *list = insert_at(list, index, node),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::{NodeKind, Operator};

    fn block(names: &[&str]) -> (NodeRef, Vec<NodeRef>) {
        let stmts: Vec<NodeRef> = names
            .iter()
            .map(|name| Node::new(NodeKind::ExpressionStmt, [Node::reference(name)]).unwrap())
            .collect();
        (Node::new(NodeKind::Block, stmts.clone()).unwrap(), stmts)
    }

    fn names(node: &Node) -> Vec<String> {
        node.children()
            .iter()
            .filter_map(|stmt| stmt.child(0).and_then(|expr| expr.identifier_name()))
            .collect()
    }

    fn stmt(name: &str) -> NodeRef {
        Node::new(NodeKind::ExpressionStmt, [Node::reference(name)]).unwrap()
    }

    #[test]
    fn test_batch_applies_in_order() {
        let (root, stmts) = block(&["a", "b", "c"]);
        root.mutate()
            .remove_child(&stmts[1])
            .insert_before(stmt("x"), Some(&stmts[0]))
            .append_child(stmt("z"))
            .replace_child(stmt("y"), &stmts[2])
            .execute()
            .unwrap();
        assert_eq!(names(&root), ["x", "a", "y", "z"]);
        assert_eq!(root.generation(), 1);
    }

    #[test]
    fn test_failed_edit_rolls_back_earlier_edits() {
        let (root, stmts) = block(&["a", "b", "c"]);
        let stranger = stmt("q");
        let err = root
            .mutate()
            .remove_child(&stmts[0])
            .append_child(stmt("d"))
            .remove_child(&stranger)
            .execute()
            .unwrap_err();
        assert!(matches!(err, TreeError::NotFound { .. }));
        assert_eq!(names(&root), ["a", "b", "c"]);
        assert_eq!(root.generation(), 0);
        for (live, original) in root.children().iter().zip(&stmts) {
            assert!(Rc::ptr_eq(live, original));
        }
    }

    #[test]
    fn test_validation_failure_rolls_back() {
        let target = Node::reference("a");
        let assign = Node::new(NodeKind::Operation(Operator::Assign), [target.clone(), Node::number_literal(1.0)]).unwrap();
        let err = assign.replace_child(Node::number_literal(2.0), &target).unwrap_err();
        assert!(matches!(err, TreeError::InvalidStructure { .. }));
        assert!(Rc::ptr_eq(&assign.child(0).unwrap(), &target));
        assert_eq!(assign.generation(), 0);
    }

    #[test]
    fn test_self_replace_and_duplicate_insert() {
        let (root, stmts) = block(&["a", "b"]);
        assert!(matches!(root.replace_child(stmts[0].clone(), &stmts[0]), Err(TreeError::AlreadyPresent { .. })));
        assert!(matches!(root.append_child(stmts[1].clone()), Err(TreeError::AlreadyPresent { .. })));
        assert!(matches!(root.replace_child(stmts[1].clone(), &stmts[0]), Err(TreeError::AlreadyPresent { .. })));
        assert_eq!(names(&root), ["a", "b"]);
    }

    #[test]
    fn test_snapshot_isolation() {
        let (root, stmts) = block(&["a", "b"]);
        let before = root.children();
        root.remove_child(&stmts[0]).unwrap();
        root.append_child(stmt("c")).unwrap();
        assert_eq!(before.len(), 2);
        assert!(Rc::ptr_eq(&before[0], &stmts[0]));
        assert_eq!(names(&root), ["b", "c"]);
        assert_eq!(root.generation(), 2);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let (root, _) = block(&["a"]);
        let mutation = root.mutate();
        assert!(mutation.is_empty());
        mutation.execute().unwrap();
        assert_eq!(root.generation(), 0);
    }

    #[test]
    fn test_remove_last_child() {
        let (root, stmts) = block(&["a", "b"]);
        root.remove_child(&stmts[1]).unwrap();
        assert_eq!(names(&root), ["a"]);
        root.remove_child(&stmts[0]).unwrap();
        assert_eq!(root.child_count(), 0);
    }
}
