use tracing::trace;

use super::{Binding, Bindings, QuasiError};
use crate::ir::node::{Node, NodeRef};

/// Instantiates `template` with `bindings`.
///
/// The result is a fresh tree: non-hole nodes are rebuilt, single holes are
/// replaced by a deep clone of their binding and variable-length holes splice
/// in clones of every bound node. The template itself is left unchanged.
pub fn substitute(template: &NodeRef, bindings: &Bindings) -> Result<NodeRef, QuasiError> {
    if let Some(hole) = template.as_hole() {
        if hole.quantifier().is_variable() {
            return Err(QuasiError::SpreadAtRoot(hole.name().to_string()));
        }
        return match bindings.get(hole.name()) {
            Some(Binding::Single(node)) => Ok(node.deep_clone()),
            Some(other) => Err(QuasiError::QuantifierMismatch {
                name: hole.name().to_string(),
                expected: "a single node",
                found: other.describe(),
            }),
            None => Err(QuasiError::MissingBinding(hole.name().to_string())),
        };
    }

    let mut children = Vec::with_capacity(template.child_count());
    for child in template.children().iter() {
        match child.as_hole().filter(|hole| hole.quantifier().is_variable()) {
            Some(hole) => match bindings.get(hole.name()) {
                Some(Binding::Many(nodes)) => {
                    if nodes.len() < hole.quantifier().min() {
                        return Err(QuasiError::QuantifierMismatch {
                            name: hole.name().to_string(),
                            expected: "one or more nodes",
                            found: "an empty sequence",
                        });
                    }
                    children.extend(nodes.iter().map(|node| node.deep_clone()));
                }
                Some(other) => {
                    return Err(QuasiError::QuantifierMismatch {
                        name: hole.name().to_string(),
                        expected: "a node sequence",
                        found: other.describe(),
                    });
                }
                None => return Err(QuasiError::MissingBinding(hole.name().to_string())),
            },
            None => children.push(substitute(child, bindings)?),
        }
    }

    let node = Node::new_at(template.kind().clone(), children, template.range())?;
    for comment in template.comments().iter() {
        node.attach_comment(comment.clone());
    }
    trace!("Instantiated {} with {} children", node.tag(), node.child_count());
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::quasi::{Pattern, parse_tree};
    use std::rc::Rc;

    #[test]
    fn test_splices_sequences() {
        let template = Pattern::parse("(Operation call (Reference (Identifier wrap)) @x @rest*)").unwrap();
        let bindings = Bindings::new()
            .bind_single("x", Node::reference("a"))
            .bind_many("rest", vec![Node::number_literal(1.0), Node::number_literal(2.0)]);
        let tree = template.substitute(&bindings).unwrap();
        let expected = parse_tree("(Operation call wrap a 1 2)").unwrap();
        assert!(tree.structurally_equal(&expected));
    }

    #[test]
    fn test_bound_subtrees_are_cloned() {
        let bound = Node::reference("a");
        let template = Pattern::parse("(ExpressionStmt @x)").unwrap();
        let tree = template.substitute(&Bindings::new().bind_single("x", bound.clone())).unwrap();
        let inserted = tree.child(0).unwrap();
        assert!(!Rc::ptr_eq(&inserted, &bound));
        assert!(inserted.structurally_equal(&bound));
    }

    #[test]
    fn test_missing_binding() {
        let template = Pattern::parse("(ExpressionStmt @x)").unwrap();
        assert_eq!(template.substitute(&Bindings::new()).unwrap_err(), QuasiError::MissingBinding("x".into()));
    }

    #[test]
    fn test_quantifier_mismatch() {
        let template = Pattern::parse("(Operation call f @args*)").unwrap();
        let err = template.substitute(&Bindings::new().bind_single("args", Node::reference("a"))).unwrap_err();
        assert!(matches!(err, QuasiError::QuantifierMismatch { expected: "a node sequence", .. }));

        let template = Pattern::parse("(ExpressionStmt @x)").unwrap();
        let err = template.substitute(&Bindings::new().bind_many("x", vec![])).unwrap_err();
        assert!(matches!(err, QuasiError::QuantifierMismatch { expected: "a single node", .. }));

        let template = Pattern::parse("(Operation call f @args+)").unwrap();
        let err = template.substitute(&Bindings::new().bind_many("args", vec![])).unwrap_err();
        assert!(matches!(err, QuasiError::QuantifierMismatch { found: "an empty sequence", .. }));
    }

    #[test]
    fn test_invalid_result_is_a_tree_error() {
        let template = Pattern::parse("(Operation = @target 1)").unwrap();
        let err = template.substitute(&Bindings::new().bind_single("target", Node::number_literal(3.0))).unwrap_err();
        assert!(matches!(err, QuasiError::Tree(_)));
    }
}
