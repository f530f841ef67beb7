//! Borrowed chain of ancestors built during traversal.
//!
//! Nodes keep no parent pointer. A traversal instead threads an
//! `AncestorChain` down the stack: each link borrows its parent link and the
//! node it stands for, so walking up costs O(depth) and nothing outlives the
//! traversal.

use std::fmt;

use super::error::TreeError;
use super::node::{KindTag, NodeRef};

#[derive(Clone, Copy)]
pub struct AncestorChain<'a> {
    parent: Option<&'a AncestorChain<'a>>,
    node: &'a NodeRef,
    depth: usize,
}

impl<'a> AncestorChain<'a> {
    pub fn root(node: &'a NodeRef) -> Self {
        AncestorChain { parent: None, node, depth: 0 }
    }

    /// Link for `node` below `parent`, or a root link when there is no parent.
    pub fn extend(parent: Option<&'a AncestorChain<'a>>, node: &'a NodeRef) -> Self {
        AncestorChain { parent, node, depth: parent.map_or(0, |p| p.depth + 1) }
    }

    pub fn child<'b>(&'b self, node: &'b NodeRef) -> AncestorChain<'b> {
        AncestorChain { parent: Some(self), node, depth: self.depth + 1 }
    }

    pub fn node(&self) -> &'a NodeRef {
        self.node
    }

    pub fn parent(&self) -> Option<&'a AncestorChain<'a>> {
        self.parent
    }

    pub fn parent_node(&self) -> Option<&'a NodeRef> {
        self.parent.map(|p| p.node)
    }

    /// Distance from the outermost link; the root is at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Nodes from this one up to the root.
    pub fn iter(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Closest proper ancestor of the given kind.
    pub fn nearest(&self, tag: KindTag) -> Option<&'a NodeRef> {
        let mut link = self.parent;
        while let Some(current) = link {
            if current.node.tag() == tag {
                return Some(current.node);
            }
            link = current.parent;
        }
        None
    }

    /// Whether the node is still a child of the parent recorded in the chain.
    pub fn is_attached(&self) -> bool {
        self.parent_node().is_none_or(|parent| parent.contains_child(self.node))
    }

    /// Replaces this node in its parent.
    pub fn replace_with(&self, replacement: NodeRef) -> Result<(), TreeError> {
        let parent = self.parent_node().ok_or(TreeError::Detached(self.node.tag()))?;
        parent.replace_child(replacement, self.node)
    }

    /// Removes this node from its parent.
    pub fn remove(&self) -> Result<(), TreeError> {
        let parent = self.parent_node().ok_or(TreeError::Detached(self.node.tag()))?;
        parent.remove_child(self.node)
    }

    /// Kinds from the root down to this node, e.g. `Block > ExpressionStmt > Reference`.
    pub fn path(&self) -> String {
        let mut tags: Vec<&'static str> = self.iter().map(|node| node.tag().name()).collect();
        tags.reverse();
        tags.join(" > ")
    }
}

impl fmt::Debug for AncestorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AncestorChain")
            .field("path", &self.path())
            .field("depth", &self.depth)
            .finish()
    }
}

pub struct Ancestors<'a> {
    next: Option<&'a AncestorChain<'a>>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a NodeRef;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.next?;
        self.next = link.parent;
        Some(link.node)
    }
}
