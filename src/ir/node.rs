use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use archery::RcK;
use rpds::Vector;

use super::attributes::{AttributeKey, AttributeValue, SyntheticAttributes};
use super::comment::Comment;
use super::error::TreeError;
use super::mutation::Mutation;
use super::quasi::QuasiHole;
use super::structure;

/// Shared handle to a node. Identity is pointer identity (`Rc::ptr_eq`).
pub type NodeRef = Rc<Node>;

/// Persistent child list. Cloning is O(1) and a clone never observes later edits.
pub type NodeVector = Vector<NodeRef, RcK>;

/// An absolute position in the source code.
/// Coordinates are zero-based (row, column, byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Position {
    pub row: usize,    // Line number (0-based)
    pub column: usize, // Column number (0-based)
    pub byte: usize,   // Byte offset from the start of the source
}

/// Identifies the source (file, URI, inline fragment) a range points into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(Rc<str>);

impl SourceId {
    pub fn new(name: &str) -> Self {
        SourceId(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provenance span of a node. Informational only: never part of equality checks
/// between trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub source: SourceId,
    pub start: Position,
    pub end: Position,
}

impl SourceRange {
    pub fn new(source: SourceId, start: Position, end: Position) -> Self {
        SourceRange { source, start, end }
    }

    /// Smallest range covering both ranges, if they point into the same source.
    pub fn span(&self, other: &SourceRange) -> Option<SourceRange> {
        if self.source != other.source {
            return None;
        }
        Some(SourceRange {
            source: self.source.clone(),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        })
    }

    pub fn len_bytes(&self) -> usize {
        self.end.byte.saturating_sub(self.start.byte)
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}+{} - {}+{}",
            self.source,
            self.start.row + 1,
            self.start.column + 1,
            self.end.row + 1,
            self.end.column + 1
        )
    }
}

/// How many operands an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Syntactic shape an operator renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorShape {
    Prefix,
    Infix,
    Member,
    Index,
    Call,
    Construct,
    Ternary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Assign,
    AddAssign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Equal,
    NotEqual,
    StrictlyEqual,
    StrictlyNotEqual,
    LessThan,
    LessEquals,
    GreaterThan,
    GreaterEquals,
    LogicalAnd,
    LogicalOr,
    Not,
    Negation,
    TypeOf,
    Void,
    Delete,
    Member,
    Index,
    Call,
    Construct,
    Comma,
    Ternary,
}

impl Operator {
    pub const ALL: [Operator; 28] = [
        Operator::Assign,
        Operator::AddAssign,
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::Modulus,
        Operator::Equal,
        Operator::NotEqual,
        Operator::StrictlyEqual,
        Operator::StrictlyNotEqual,
        Operator::LessThan,
        Operator::LessEquals,
        Operator::GreaterThan,
        Operator::GreaterEquals,
        Operator::LogicalAnd,
        Operator::LogicalOr,
        Operator::Not,
        Operator::Negation,
        Operator::TypeOf,
        Operator::Void,
        Operator::Delete,
        Operator::Member,
        Operator::Index,
        Operator::Call,
        Operator::Construct,
        Operator::Comma,
        Operator::Ternary,
    ];

    /// Name used for the operator in quasi syntax, e.g. `(Operation + a b)`.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::AddAssign => "+=",
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulus => "%",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::StrictlyEqual => "===",
            Operator::StrictlyNotEqual => "!==",
            Operator::LessThan => "<",
            Operator::LessEquals => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterEquals => ">=",
            Operator::LogicalAnd => "&&",
            Operator::LogicalOr => "||",
            Operator::Not => "!",
            Operator::Negation => "neg",
            Operator::TypeOf => "typeof",
            Operator::Void => "void",
            Operator::Delete => "delete",
            Operator::Member => ".",
            Operator::Index => "index",
            Operator::Call => "call",
            Operator::Construct => "new",
            Operator::Comma => ",",
            Operator::Ternary => "?:",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        Operator::ALL.iter().copied().find(|op| op.symbol() == symbol)
    }

    /// Token emitted when rendering, where it differs from the quasi symbol.
    pub fn js_token(self) -> &'static str {
        match self {
            Operator::Negation => "-",
            other => other.symbol(),
        }
    }

    pub fn shape(self) -> OperatorShape {
        match self {
            Operator::Not | Operator::Negation | Operator::TypeOf | Operator::Void | Operator::Delete => {
                OperatorShape::Prefix
            }
            Operator::Member => OperatorShape::Member,
            Operator::Index => OperatorShape::Index,
            Operator::Call => OperatorShape::Call,
            Operator::Construct => OperatorShape::Construct,
            Operator::Ternary => OperatorShape::Ternary,
            _ => OperatorShape::Infix,
        }
    }

    pub fn arity(self) -> Arity {
        match self.shape() {
            OperatorShape::Prefix => Arity::Fixed(1),
            OperatorShape::Call | OperatorShape::Construct => Arity::AtLeast(1),
            OperatorShape::Ternary => Arity::Fixed(3),
            _ => Arity::Fixed(2),
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Comma => 1,
            Operator::Assign | Operator::AddAssign => 2,
            Operator::Ternary => 3,
            Operator::LogicalOr => 4,
            Operator::LogicalAnd => 5,
            Operator::Equal | Operator::NotEqual | Operator::StrictlyEqual | Operator::StrictlyNotEqual => 9,
            Operator::LessThan | Operator::LessEquals | Operator::GreaterThan | Operator::GreaterEquals => 10,
            Operator::Add | Operator::Subtract => 12,
            Operator::Multiply | Operator::Divide | Operator::Modulus => 13,
            Operator::Not | Operator::Negation | Operator::TypeOf | Operator::Void | Operator::Delete => 14,
            Operator::Call | Operator::Construct => 16,
            Operator::Member | Operator::Index => 17,
        }
    }

    pub fn is_assignment(self) -> bool {
        matches!(self, Operator::Assign | Operator::AddAssign)
    }

    /// Operators whose first operand must be an assignable target.
    pub fn needs_lvalue_operand(self) -> bool {
        self.is_assignment() || self == Operator::Delete
    }

    pub fn is_right_associative(self) -> bool {
        self.is_assignment() || self == Operator::Ternary
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Discriminator for the node kinds of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Block,
    ExpressionStmt,
    Declaration,
    FunctionDeclaration,
    FunctionConstructor,
    FormalParam,
    ReturnStmt,
    Conditional,
    Noop,
    Identifier,
    Reference,
    StringLiteral,
    NumberLiteral,
    BooleanLiteral,
    NullLiteral,
    Operation,
    ArrayConstructor,
    ObjectConstructor,
    ObjProperty,
    Module,
    QuasiHole,
}

impl KindTag {
    pub const ALL: [KindTag; 21] = [
        KindTag::Block,
        KindTag::ExpressionStmt,
        KindTag::Declaration,
        KindTag::FunctionDeclaration,
        KindTag::FunctionConstructor,
        KindTag::FormalParam,
        KindTag::ReturnStmt,
        KindTag::Conditional,
        KindTag::Noop,
        KindTag::Identifier,
        KindTag::Reference,
        KindTag::StringLiteral,
        KindTag::NumberLiteral,
        KindTag::BooleanLiteral,
        KindTag::NullLiteral,
        KindTag::Operation,
        KindTag::ArrayConstructor,
        KindTag::ObjectConstructor,
        KindTag::ObjProperty,
        KindTag::Module,
        KindTag::QuasiHole,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KindTag::Block => "Block",
            KindTag::ExpressionStmt => "ExpressionStmt",
            KindTag::Declaration => "Declaration",
            KindTag::FunctionDeclaration => "FunctionDeclaration",
            KindTag::FunctionConstructor => "FunctionConstructor",
            KindTag::FormalParam => "FormalParam",
            KindTag::ReturnStmt => "ReturnStmt",
            KindTag::Conditional => "Conditional",
            KindTag::Noop => "Noop",
            KindTag::Identifier => "Identifier",
            KindTag::Reference => "Reference",
            KindTag::StringLiteral => "StringLiteral",
            KindTag::NumberLiteral => "NumberLiteral",
            KindTag::BooleanLiteral => "BooleanLiteral",
            KindTag::NullLiteral => "NullLiteral",
            KindTag::Operation => "Operation",
            KindTag::ArrayConstructor => "ArrayConstructor",
            KindTag::ObjectConstructor => "ObjectConstructor",
            KindTag::ObjProperty => "ObjProperty",
            KindTag::Module => "Module",
            KindTag::QuasiHole => "QuasiHole",
        }
    }

    pub fn from_name(name: &str) -> Option<KindTag> {
        KindTag::ALL.iter().copied().find(|tag| tag.name() == name)
    }

    pub fn is_statement(self) -> bool {
        matches!(
            self,
            KindTag::Block
                | KindTag::ExpressionStmt
                | KindTag::Declaration
                | KindTag::FunctionDeclaration
                | KindTag::ReturnStmt
                | KindTag::Conditional
                | KindTag::Noop
        )
    }

    pub fn is_expression(self) -> bool {
        matches!(
            self,
            KindTag::Reference
                | KindTag::StringLiteral
                | KindTag::NumberLiteral
                | KindTag::BooleanLiteral
                | KindTag::NullLiteral
                | KindTag::Operation
                | KindTag::ArrayConstructor
                | KindTag::ObjectConstructor
                | KindTag::FunctionConstructor
        )
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a node together with its kind-specific value.
/// The value is fixed at construction; only the children change afterwards.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// `{ stmt* }`
    Block,
    /// `expr;`
    ExpressionStmt,
    /// `var name = init?;` children: Identifier, optional initializer.
    Declaration,
    /// Statement wrapper around a named FunctionConstructor.
    FunctionDeclaration,
    /// `function name?(params) { body }` children: Identifier, FormalParam*, Block.
    FunctionConstructor,
    FormalParam,
    ReturnStmt,
    /// `if (c) s (else if (c) s)* (else s)?` as alternating condition/body children.
    Conditional,
    Noop,
    Identifier(String),
    /// A use of a name: one Identifier child.
    Reference,
    StringLiteral(String),
    NumberLiteral(f64),
    BooleanLiteral(bool),
    NullLiteral,
    Operation(Operator),
    ArrayConstructor,
    ObjectConstructor,
    /// `"key": value` children: StringLiteral key, value expression.
    ObjProperty,
    /// A consolidated unit of script: exactly one Block.
    Module,
    /// Pattern-only placeholder. Never present in a real program tree.
    QuasiHole(QuasiHole),
}

/// Borrowed view of the value a node carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeValue<'a> {
    None,
    Text(&'a str),
    Number(f64),
    Bool(bool),
    Operator(Operator),
    Hole(&'a QuasiHole),
}

impl NodeKind {
    pub fn tag(&self) -> KindTag {
        match self {
            NodeKind::Block => KindTag::Block,
            NodeKind::ExpressionStmt => KindTag::ExpressionStmt,
            NodeKind::Declaration => KindTag::Declaration,
            NodeKind::FunctionDeclaration => KindTag::FunctionDeclaration,
            NodeKind::FunctionConstructor => KindTag::FunctionConstructor,
            NodeKind::FormalParam => KindTag::FormalParam,
            NodeKind::ReturnStmt => KindTag::ReturnStmt,
            NodeKind::Conditional => KindTag::Conditional,
            NodeKind::Noop => KindTag::Noop,
            NodeKind::Identifier(_) => KindTag::Identifier,
            NodeKind::Reference => KindTag::Reference,
            NodeKind::StringLiteral(_) => KindTag::StringLiteral,
            NodeKind::NumberLiteral(_) => KindTag::NumberLiteral,
            NodeKind::BooleanLiteral(_) => KindTag::BooleanLiteral,
            NodeKind::NullLiteral => KindTag::NullLiteral,
            NodeKind::Operation(_) => KindTag::Operation,
            NodeKind::ArrayConstructor => KindTag::ArrayConstructor,
            NodeKind::ObjectConstructor => KindTag::ObjectConstructor,
            NodeKind::ObjProperty => KindTag::ObjProperty,
            NodeKind::Module => KindTag::Module,
            NodeKind::QuasiHole(_) => KindTag::QuasiHole,
        }
    }

    pub fn value(&self) -> NodeValue<'_> {
        match self {
            NodeKind::Identifier(name) => NodeValue::Text(name),
            NodeKind::StringLiteral(text) => NodeValue::Text(text),
            NodeKind::NumberLiteral(n) => NodeValue::Number(*n),
            NodeKind::BooleanLiteral(b) => NodeValue::Bool(*b),
            NodeKind::Operation(op) => NodeValue::Operator(*op),
            NodeKind::QuasiHole(hole) => NodeValue::Hole(hole),
            _ => NodeValue::None,
        }
    }

    /// Same kind and equal value. Numbers compare by bit pattern so that a
    /// NaN literal equals itself and `0` differs from `-0`.
    pub fn same_value(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::NumberLiteral(a), NodeKind::NumberLiteral(b)) => a.to_bits() == b.to_bits(),
            (NodeKind::Identifier(a), NodeKind::Identifier(b)) => a == b,
            (NodeKind::StringLiteral(a), NodeKind::StringLiteral(b)) => a == b,
            (NodeKind::BooleanLiteral(a), NodeKind::BooleanLiteral(b)) => a == b,
            (NodeKind::Operation(a), NodeKind::Operation(b)) => a == b,
            (NodeKind::QuasiHole(a), NodeKind::QuasiHole(b)) => a == b,
            _ => self.tag() == other.tag() && matches!(self.value(), NodeValue::None),
        }
    }
}

/// A node of the mutable parse tree.
///
/// The envelope shared by every kind holds the ordered child list, the
/// provenance range, attached comments and the synthetic attribute bag.
/// Children are only changed through [`Mutation`] batches, which validate the
/// result and roll back on failure. Each successful batch bumps the node's
/// generation so in-flight traversals can tell their snapshot is stale.
///
/// Trees are single-threaded: nodes are `Rc`-shared and use interior
/// mutability, so they are neither `Send` nor `Sync`.
pub struct Node {
    kind: NodeKind,
    children: RefCell<NodeVector>,
    generation: Cell<u64>,
    range: RefCell<Option<SourceRange>>,
    comments: RefCell<Vec<Comment>>,
    attributes: RefCell<Option<Box<SyntheticAttributes>>>,
}

impl Node {
    /// Creates a node after checking the structural rules for its kind.
    pub fn new(kind: NodeKind, children: impl IntoIterator<Item = NodeRef>) -> Result<NodeRef, TreeError> {
        Node::new_at(kind, children, None)
    }

    pub fn new_at(
        kind: NodeKind,
        children: impl IntoIterator<Item = NodeRef>,
        range: Option<SourceRange>,
    ) -> Result<NodeRef, TreeError> {
        let children: NodeVector = children.into_iter().collect();
        for (index, child) in children.iter().enumerate() {
            if children.iter().take(index).any(|earlier| Rc::ptr_eq(earlier, child)) {
                return Err(TreeError::AlreadyPresent { parent: kind.tag(), child: child.tag() });
            }
        }
        structure::check(&kind, &children)?;
        Ok(Node::raw(kind, children, range))
    }

    /// Builds a node without structural checks. Only for shapes known to be valid.
    fn raw(kind: NodeKind, children: NodeVector, range: Option<SourceRange>) -> NodeRef {
        Rc::new(Node {
            kind,
            children: RefCell::new(children),
            generation: Cell::new(0),
            range: RefCell::new(range),
            comments: RefCell::new(Vec::new()),
            attributes: RefCell::new(None),
        })
    }

    fn leaf(kind: NodeKind) -> NodeRef {
        Node::raw(kind, NodeVector::new_with_ptr_kind(), None)
    }

    pub fn identifier(name: &str) -> NodeRef {
        Node::leaf(NodeKind::Identifier(name.to_string()))
    }

    /// `Reference` wrapping a fresh `Identifier`.
    pub fn reference(name: &str) -> NodeRef {
        let children = NodeVector::new_with_ptr_kind().push_back(Node::identifier(name));
        Node::raw(NodeKind::Reference, children, None)
    }

    pub fn string_literal(text: &str) -> NodeRef {
        Node::leaf(NodeKind::StringLiteral(text.to_string()))
    }

    pub fn number_literal(value: f64) -> NodeRef {
        Node::leaf(NodeKind::NumberLiteral(value))
    }

    pub fn boolean_literal(value: bool) -> NodeRef {
        Node::leaf(NodeKind::BooleanLiteral(value))
    }

    pub fn null_literal() -> NodeRef {
        Node::leaf(NodeKind::NullLiteral)
    }

    pub fn noop() -> NodeRef {
        Node::leaf(NodeKind::Noop)
    }

    pub fn hole(hole: QuasiHole) -> NodeRef {
        Node::leaf(NodeKind::QuasiHole(hole))
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn tag(&self) -> KindTag {
        self.kind.tag()
    }

    pub fn value(&self) -> NodeValue<'_> {
        self.kind.value()
    }

    /// Snapshot of the current children. Later mutations never change it.
    pub fn children(&self) -> NodeVector {
        self.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn child(&self, index: usize) -> Option<NodeRef> {
        self.children.borrow().get(index).cloned()
    }

    /// Index of `node` among the children, by identity.
    pub fn position_of(&self, node: &NodeRef) -> Option<usize> {
        self.children.borrow().iter().position(|child| Rc::ptr_eq(child, node))
    }

    pub fn contains_child(&self, node: &NodeRef) -> bool {
        self.position_of(node).is_some()
    }

    /// Number of successful mutation batches applied to this node's children.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    pub(crate) fn with_children_mut<R>(&self, f: impl FnOnce(&mut NodeVector) -> R) -> R {
        f(&mut self.children.borrow_mut())
    }

    pub fn range(&self) -> Option<SourceRange> {
        self.range.borrow().clone()
    }

    pub fn set_range(&self, range: Option<SourceRange>) {
        *self.range.borrow_mut() = range;
    }

    pub fn comments(&self) -> Ref<'_, Vec<Comment>> {
        self.comments.borrow()
    }

    pub fn attach_comment(&self, comment: Comment) {
        self.comments.borrow_mut().push(comment);
    }

    pub fn attribute(&self, key: AttributeKey) -> Option<AttributeValue> {
        self.attributes.borrow().as_ref().and_then(|attrs| attrs.get(key).cloned())
    }

    pub fn has_attribute(&self, key: AttributeKey) -> bool {
        self.attributes.borrow().as_ref().is_some_and(|attrs| attrs.contains(key))
    }

    /// Sets a synthetic attribute, allocating the attribute bag on first use.
    pub fn set_attribute(&self, key: AttributeKey, value: AttributeValue) -> Option<AttributeValue> {
        self.attributes
            .borrow_mut()
            .get_or_insert_with(Default::default)
            .insert(key, value)
    }

    pub fn remove_attribute(&self, key: AttributeKey) -> Option<AttributeValue> {
        self.attributes.borrow_mut().as_mut().and_then(|attrs| attrs.remove(key))
    }

    /// Whether the attribute bag has been allocated at all.
    pub fn has_attribute_bag(&self) -> bool {
        self.attributes.borrow().is_some()
    }

    /// Starts a batch of child edits against this node.
    pub fn mutate(&self) -> Mutation<'_> {
        Mutation::new(self)
    }

    pub fn replace_child(&self, replacement: NodeRef, old: &NodeRef) -> Result<(), TreeError> {
        self.mutate().replace_child(replacement, old).execute()
    }

    /// Inserts `node` before `before`, or at the end when `before` is `None`.
    pub fn insert_before(&self, node: NodeRef, before: Option<&NodeRef>) -> Result<(), TreeError> {
        self.mutate().insert_before(node, before).execute()
    }

    pub fn append_child(&self, node: NodeRef) -> Result<(), TreeError> {
        self.insert_before(node, None)
    }

    pub fn remove_child(&self, node: &NodeRef) -> Result<(), TreeError> {
        self.mutate().remove_child(node).execute()
    }

    /// Recursively copies the subtree. Ranges and comments are kept, the
    /// `Tainted` attribute is dropped and other attributes are copied by value.
    pub fn deep_clone(&self) -> NodeRef {
        let children: NodeVector = self.children.borrow().iter().map(|child| child.deep_clone()).collect();
        let copy = Node::raw(self.kind.clone(), children, self.range());
        copy.comments.borrow_mut().clone_from(&self.comments.borrow());
        if let Some(attrs) = self.attributes.borrow().as_ref() {
            *copy.attributes.borrow_mut() = attrs.transferable_copy().map(Box::new);
        }
        copy
    }

    /// Compares kind, value and children recursively. Ranges, comments and
    /// attributes are ignored.
    pub fn structurally_equal(&self, other: &Node) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if !self.kind.same_value(&other.kind) {
            return false;
        }
        let mine = self.children.borrow();
        let theirs = other.children.borrow();
        mine.len() == theirs.len() && mine.iter().zip(theirs.iter()).all(|(a, b)| a.structurally_equal(b))
    }

    pub fn as_hole(&self) -> Option<&QuasiHole> {
        match &self.kind {
            NodeKind::QuasiHole(hole) => Some(hole),
            _ => None,
        }
    }

    pub fn is_hole(&self) -> bool {
        self.as_hole().is_some()
    }

    /// Whether any node of the subtree is a pattern placeholder.
    pub fn contains_holes(&self) -> bool {
        self.is_hole() || self.children.borrow().iter().any(|child| child.contains_holes())
    }

    /// Number of nodes in the subtree, this node included.
    pub fn subtree_size(&self) -> usize {
        1 + self.children.borrow().iter().map(|child| child.subtree_size()).sum::<usize>()
    }

    /// Name carried by an `Identifier`, or by the identifier of a `Reference`.
    pub fn identifier_name(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Identifier(name) => Some(name.clone()),
            NodeKind::Reference => self.child(0).and_then(|child| child.identifier_name()),
            _ => None,
        }
    }
}

/// Writes a string literal in quasi syntax, escaping quotes, backslashes and
/// control characters.
pub(crate) fn write_quoted(f: &mut impl fmt::Write, text: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            _ if c.is_control() => write!(f, "\\u{{{:x}}}", c as u32)?,
            _ => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

pub(crate) fn is_bare_word(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// Long-form quasi syntax, readable back by [`crate::ir::quasi::parse_tree`].
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let NodeKind::QuasiHole(hole) = &self.kind {
            return write!(f, "{}", hole);
        }
        write!(f, "({}", self.tag())?;
        match &self.kind {
            NodeKind::Identifier(name) if is_bare_word(name) => write!(f, " {}", name)?,
            NodeKind::Identifier(name) | NodeKind::StringLiteral(name) => {
                f.write_str(" ")?;
                write_quoted(f, name)?;
            }
            NodeKind::NumberLiteral(n) => write!(f, " {}", n)?,
            NodeKind::BooleanLiteral(b) => write!(f, " {}", b)?,
            NodeKind::Operation(op) => write!(f, " {}", op)?,
            _ => {}
        }
        for child in self.children.borrow().iter() {
            write!(f, " {}", child)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
