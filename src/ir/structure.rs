//! Per-kind structural rules, checked when a node is built and after every
//! mutation batch.
//!
//! Quasi holes satisfy any role. When a child list holds a variable-length
//! hole the number of concrete children is unknown, so count and positional
//! checks are skipped and only rules that apply to every child remain.

use super::error::TreeError;
use super::node::{KindTag, Node, NodeKind, NodeVector, Operator, OperatorShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Statement,
    Expression,
    LValue,
    Kind(KindTag),
}

impl Role {
    fn describe(self) -> String {
        match self {
            Role::Statement => "a statement".to_string(),
            Role::Expression => "an expression".to_string(),
            Role::LValue => "an assignable target".to_string(),
            Role::Kind(tag) => format!("a {}", tag),
        }
    }
}

fn fits(child: &Node, role: Role) -> bool {
    if child.is_hole() {
        return true;
    }
    let tag = child.tag();
    match role {
        Role::Statement => tag.is_statement(),
        Role::Expression => tag.is_expression(),
        Role::LValue => is_lvalue(child),
        Role::Kind(expected) => tag == expected,
    }
}

/// References, member accesses and index expressions can be assigned to.
pub fn is_lvalue(node: &Node) -> bool {
    match node.kind() {
        NodeKind::Reference => true,
        NodeKind::Operation(op) => matches!(op, Operator::Member | Operator::Index),
        NodeKind::QuasiHole(_) => true,
        _ => false,
    }
}

struct Checker<'a> {
    tag: KindTag,
    children: &'a NodeVector,
    positional: bool,
}

impl Checker<'_> {
    fn count(&self, min: usize, max: Option<usize>) -> Result<(), TreeError> {
        if !self.positional {
            return Ok(());
        }
        let n = self.children.len();
        if n < min || max.is_some_and(|max| n > max) {
            let expected = match max {
                Some(max) if max == min => format!("{}", min),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(TreeError::invalid(self.tag, format!("expected {} children, found {}", expected, n)));
        }
        Ok(())
    }

    fn at(&self, index: usize, role: Role) -> Result<(), TreeError> {
        if !self.positional {
            return Ok(());
        }
        match self.children.get(index) {
            Some(child) if !fits(child, role) => Err(TreeError::invalid(
                self.tag,
                format!("child {} must be {}, found {}", index, role.describe(), child.tag()),
            )),
            _ => Ok(()),
        }
    }

    fn all(&self, role: Role) -> Result<(), TreeError> {
        for (index, child) in self.children.iter().enumerate() {
            if !fits(child, role) {
                return Err(TreeError::invalid(
                    self.tag,
                    format!("child {} must be {}, found {}", index, role.describe(), child.tag()),
                ));
            }
        }
        Ok(())
    }

    fn range(&self, from: usize, to: usize, role: Role) -> Result<(), TreeError> {
        (from..to).try_for_each(|index| self.at(index, role))
    }
}

pub(crate) fn check(kind: &NodeKind, children: &NodeVector) -> Result<(), TreeError> {
    let positional = !children
        .iter()
        .any(|child| child.as_hole().is_some_and(|hole| hole.quantifier().is_variable()));
    let c = Checker { tag: kind.tag(), children, positional };
    let n = children.len();

    match kind {
        NodeKind::Block => c.all(Role::Statement),
        NodeKind::ExpressionStmt => {
            c.count(1, Some(1))?;
            c.at(0, Role::Expression)
        }
        NodeKind::Declaration => {
            c.count(1, Some(2))?;
            c.at(0, Role::Kind(KindTag::Identifier))?;
            c.at(1, Role::Expression)
        }
        NodeKind::FunctionDeclaration => {
            c.count(1, Some(1))?;
            c.at(0, Role::Kind(KindTag::FunctionConstructor))
        }
        NodeKind::FunctionConstructor => {
            c.count(2, None)?;
            c.at(0, Role::Kind(KindTag::Identifier))?;
            c.range(1, n.saturating_sub(1), Role::Kind(KindTag::FormalParam))?;
            c.at(n.saturating_sub(1), Role::Kind(KindTag::Block))
        }
        NodeKind::FormalParam => {
            c.count(1, Some(1))?;
            c.at(0, Role::Kind(KindTag::Identifier))
        }
        NodeKind::ReturnStmt => {
            c.count(0, Some(1))?;
            c.at(0, Role::Expression)
        }
        NodeKind::Conditional => {
            c.count(2, None)?;
            // Alternating condition/body pairs with an optional trailing else.
            (0..n).try_for_each(|index| {
                let role = if index % 2 == 0 && index + 1 < n { Role::Expression } else { Role::Statement };
                c.at(index, role)
            })
        }
        NodeKind::Reference => {
            c.count(1, Some(1))?;
            c.at(0, Role::Kind(KindTag::Identifier))
        }
        NodeKind::Operation(op) => check_operation(&c, *op),
        NodeKind::ArrayConstructor => c.all(Role::Expression),
        NodeKind::ObjectConstructor => c.all(Role::Kind(KindTag::ObjProperty)),
        NodeKind::ObjProperty => {
            c.count(2, Some(2))?;
            c.at(0, Role::Kind(KindTag::StringLiteral))?;
            c.at(1, Role::Expression)
        }
        NodeKind::Module => {
            c.count(1, Some(1))?;
            c.at(0, Role::Kind(KindTag::Block))
        }
        NodeKind::Noop
        | NodeKind::Identifier(_)
        | NodeKind::StringLiteral(_)
        | NodeKind::NumberLiteral(_)
        | NodeKind::BooleanLiteral(_)
        | NodeKind::NullLiteral
        | NodeKind::QuasiHole(_) => {
            if n > 0 {
                return Err(TreeError::invalid(c.tag, format!("leaf node cannot have children, found {}", n)));
            }
            Ok(())
        }
    }
}

fn check_operation(c: &Checker<'_>, op: Operator) -> Result<(), TreeError> {
    let n = c.children.len();
    if c.positional && !op.arity().accepts(n) {
        return Err(TreeError::invalid(
            c.tag,
            format!("operator {} takes {} operands, found {}", op, op.arity(), n),
        ));
    }
    match op.shape() {
        OperatorShape::Member => {
            c.at(0, Role::Expression)?;
            c.at(1, Role::Kind(KindTag::Reference))
        }
        _ if op.needs_lvalue_operand() => {
            c.at(0, Role::LValue)?;
            c.range(1, n, Role::Expression)
        }
        _ => c.all(Role::Expression),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::NodeRef;
    use crate::ir::quasi::QuasiHole;

    fn op(op: Operator, children: Vec<NodeRef>) -> Result<NodeRef, TreeError> {
        Node::new(NodeKind::Operation(op), children)
    }

    #[test]
    fn test_assignment_needs_lvalue() {
        assert!(op(Operator::Assign, vec![Node::reference("a"), Node::number_literal(1.0)]).is_ok());
        let err = op(Operator::Assign, vec![Node::number_literal(1.0), Node::number_literal(2.0)]).unwrap_err();
        assert!(matches!(err, TreeError::InvalidStructure { parent: KindTag::Operation, .. }));
    }

    #[test]
    fn test_member_property_is_reference() {
        assert!(op(Operator::Member, vec![Node::reference("o"), Node::reference("p")]).is_ok());
        assert!(op(Operator::Member, vec![Node::reference("o"), Node::string_literal("p")]).is_err());
    }

    #[test]
    fn test_arity() {
        assert!(op(Operator::Add, vec![Node::reference("a")]).is_err());
        assert!(op(Operator::Call, vec![]).is_err());
        assert!(op(Operator::Call, vec![Node::reference("f"), Node::reference("x"), Node::reference("y")]).is_ok());
    }

    #[test]
    fn test_block_holds_statements_only() {
        let err = Node::new(NodeKind::Block, [Node::reference("a")]).unwrap_err();
        assert_eq!(err.to_string(), "malformed Block: child 0 must be a statement, found Reference");
    }

    #[test]
    fn test_variable_hole_skips_counts() {
        let args = Node::hole(QuasiHole::zero_or_more("args"));
        assert!(op(Operator::Call, vec![args]).is_ok());
        let single = Node::hole(QuasiHole::exactly_one("x"));
        assert!(Node::new(NodeKind::ExpressionStmt, [single]).is_ok());
    }

    #[test]
    fn test_conditional_alternates() {
        let stmt = || Node::new(NodeKind::Noop, []).unwrap();
        assert!(Node::new(NodeKind::Conditional, [Node::reference("c"), stmt()]).is_ok());
        assert!(Node::new(NodeKind::Conditional, [Node::reference("c"), stmt(), stmt()]).is_ok());
        assert!(Node::new(NodeKind::Conditional, [stmt(), stmt()]).is_err());
    }

    #[test]
    fn test_leaves_have_no_children() {
        assert!(Node::new(NodeKind::NullLiteral, [Node::reference("x")]).is_err());
        assert!(Node::new(NodeKind::Identifier("x".into()), []).is_ok());
    }
}
