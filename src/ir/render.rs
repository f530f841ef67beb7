//! Rendering trees back to JavaScript tokens.
//!
//! A node renders into a [`TokenConsumer`] through a [`RenderContext`].
//! Before emitting the tokens of a node that has a source range, the
//! renderer calls `mark` so consumers can build a source map. Parentheses are
//! inserted from operator precedence only; whatever the tree held originally
//! is irrelevant.

use tracing::trace;

use super::node::{KindTag, Node, NodeKind, NodeRef, Operator, OperatorShape, SourceRange};

/// Receives the token stream of a rendered tree.
pub trait TokenConsumer {
    /// Source range of the tokens that follow.
    fn mark(&mut self, range: Option<&SourceRange>);
    fn consume(&mut self, token: &str);
    /// Called once after the last token.
    fn no_more_tokens(&mut self) {}
}

pub struct RenderContext<'a> {
    out: &'a mut dyn TokenConsumer,
    emit_comments: bool,
}

impl<'a> RenderContext<'a> {
    pub fn new(out: &'a mut dyn TokenConsumer) -> Self {
        RenderContext { out, emit_comments: false }
    }

    pub fn with_comments(mut self, emit: bool) -> Self {
        self.emit_comments = emit;
        self
    }

    pub fn consume(&mut self, token: &str) {
        self.out.consume(token);
    }

    pub fn mark(&mut self, range: Option<&SourceRange>) {
        self.out.mark(range);
    }

    pub fn finish(self) {
        self.out.no_more_tokens();
    }
}

pub trait Render {
    fn render(&self, ctx: &mut RenderContext<'_>);
}

/// Precedence of a node in expression position.
fn precedence(node: &Node) -> u8 {
    match node.kind() {
        NodeKind::Operation(op) => op.precedence(),
        // `-1` renders with a leading minus and binds like one.
        NodeKind::NumberLiteral(n) if n.is_sign_negative() && !n.is_nan() => Operator::Negation.precedence(),
        _ => u8::MAX,
    }
}

/// Whether the leftmost token of an expression statement would read as the
/// start of a function declaration or a block.
fn starts_ambiguously(node: &Node) -> bool {
    match node.kind() {
        NodeKind::FunctionConstructor | NodeKind::ObjectConstructor => true,
        NodeKind::Operation(op) if !matches!(op.shape(), OperatorShape::Prefix | OperatorShape::Construct) => {
            node.child(0).is_some_and(|first| starts_ambiguously(&first))
        }
        _ => false,
    }
}

fn render_operand(ctx: &mut RenderContext<'_>, operand: &NodeRef, min_precedence: u8) {
    if precedence(operand) < min_precedence {
        ctx.consume("(");
        operand.render(ctx);
        ctx.consume(")");
    } else {
        operand.render(ctx);
    }
}

fn render_list(ctx: &mut RenderContext<'_>, items: impl Iterator<Item = NodeRef>) {
    for (index, item) in items.enumerate() {
        if index > 0 {
            ctx.consume(",");
        }
        // Comma expressions inside argument and element lists need parens.
        render_operand(ctx, &item, Operator::Assign.precedence());
    }
}

fn render_body(ctx: &mut RenderContext<'_>, body: &NodeRef) {
    if body.tag() == KindTag::Block {
        body.render(ctx);
    } else {
        ctx.consume("{");
        body.render(ctx);
        ctx.consume("}");
    }
}

fn render_operation(node: &Node, op: Operator, ctx: &mut RenderContext<'_>) {
    let children: Vec<NodeRef> = node.children().iter().cloned().collect();
    let prec = op.precedence();
    match (op.shape(), children.as_slice()) {
        (OperatorShape::Prefix, [operand]) => {
            ctx.consume(op.js_token());
            render_operand(ctx, operand, prec);
        }
        (OperatorShape::Infix, [left, right]) => {
            // Left-associative operators need parens on an equal-precedence
            // right operand; right-associative ones on the left.
            let (left_min, right_min) = if op.is_right_associative() { (prec + 1, prec) } else { (prec, prec + 1) };
            render_operand(ctx, left, left_min);
            ctx.consume(op.js_token());
            render_operand(ctx, right, right_min);
        }
        (OperatorShape::Member, [object, property]) => {
            render_operand(ctx, object, prec);
            ctx.consume(".");
            match property.identifier_name() {
                Some(name) => ctx.consume(&name),
                None => property.render(ctx),
            }
        }
        (OperatorShape::Index, [object, index]) => {
            render_operand(ctx, object, prec);
            ctx.consume("[");
            index.render(ctx);
            ctx.consume("]");
        }
        (OperatorShape::Call, [callee, args @ ..]) => {
            render_operand(ctx, callee, prec);
            ctx.consume("(");
            render_list(ctx, args.iter().cloned());
            ctx.consume(")");
        }
        (OperatorShape::Construct, [ctor, args @ ..]) => {
            ctx.consume("new");
            // `new f()()` and `new (f())()` differ; keep calls in the callee parenthesized.
            render_operand(ctx, ctor, Operator::Member.precedence());
            ctx.consume("(");
            render_list(ctx, args.iter().cloned());
            ctx.consume(")");
        }
        (OperatorShape::Ternary, [cond, then, otherwise]) => {
            render_operand(ctx, cond, prec + 1);
            ctx.consume("?");
            render_operand(ctx, then, Operator::Assign.precedence());
            ctx.consume(":");
            render_operand(ctx, otherwise, Operator::Assign.precedence());
        }
        _ => {
            // Only reachable for pattern trees with spread holes.
            ctx.consume(op.js_token());
            ctx.consume("(");
            render_list(ctx, children.into_iter());
            ctx.consume(")");
        }
    }
}

fn render_string(ctx: &mut RenderContext<'_>, text: &str) {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            // Keeps `</script>` and friends out of inline output.
            '<' => quoted.push_str("\\x3c"),
            '>' => quoted.push_str("\\x3e"),
            '\u{2028}' => quoted.push_str("\\u2028"),
            '\u{2029}' => quoted.push_str("\\u2029"),
            _ if c.is_control() => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    ctx.consume(&quoted);
}

fn render_number(ctx: &mut RenderContext<'_>, n: f64) {
    let text = if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        format!("{}", n)
    };
    ctx.consume(&text);
}

impl Render for Node {
    fn render(&self, ctx: &mut RenderContext<'_>) {
        let range = self.range();
        ctx.mark(range.as_ref());
        if ctx.emit_comments {
            for comment in self.comments().iter() {
                ctx.consume(&comment.inline_text());
            }
        }

        let children: Vec<NodeRef> = self.children().iter().cloned().collect();
        match self.kind() {
            NodeKind::Module => {
                // The single Block renders without braces at top level.
                for stmt in children.iter().flat_map(|block| block.children().iter().cloned().collect::<Vec<_>>()) {
                    stmt.render(ctx);
                }
            }
            NodeKind::Block => {
                ctx.consume("{");
                children.iter().for_each(|stmt| stmt.render(ctx));
                ctx.consume("}");
            }
            NodeKind::ExpressionStmt => {
                if let Some(expr) = children.first() {
                    if starts_ambiguously(expr) {
                        ctx.consume("(");
                        expr.render(ctx);
                        ctx.consume(")");
                    } else {
                        expr.render(ctx);
                    }
                }
                ctx.consume(";");
            }
            NodeKind::Declaration => {
                ctx.consume("var");
                if let Some(name) = children.first() {
                    name.render(ctx);
                }
                if let Some(init) = children.get(1) {
                    ctx.consume("=");
                    render_operand(ctx, init, Operator::Assign.precedence());
                }
                ctx.consume(";");
            }
            NodeKind::FunctionDeclaration => children.iter().for_each(|f| f.render(ctx)),
            NodeKind::FunctionConstructor => {
                ctx.consume("function");
                if let Some(name) = children.first().and_then(|id| id.identifier_name()) {
                    if !name.is_empty() {
                        ctx.consume(&name);
                    }
                }
                ctx.consume("(");
                let params = children.len().saturating_sub(2);
                render_list(ctx, children.iter().skip(1).take(params).cloned());
                ctx.consume(")");
                if let Some(body) = children.last().filter(|_| children.len() >= 2) {
                    render_body(ctx, body);
                }
            }
            NodeKind::FormalParam => children.iter().for_each(|id| id.render(ctx)),
            NodeKind::ReturnStmt => {
                ctx.consume("return");
                if let Some(value) = children.first() {
                    value.render(ctx);
                }
                ctx.consume(";");
            }
            NodeKind::Conditional => {
                for (index, pair) in children.chunks(2).enumerate() {
                    match pair {
                        [cond, body] => {
                            if index > 0 {
                                ctx.consume("else");
                            }
                            ctx.consume("if");
                            ctx.consume("(");
                            cond.render(ctx);
                            ctx.consume(")");
                            render_body(ctx, body);
                        }
                        [otherwise] => {
                            ctx.consume("else");
                            render_body(ctx, otherwise);
                        }
                        _ => {}
                    }
                }
            }
            NodeKind::Noop => ctx.consume(";"),
            NodeKind::Identifier(name) => ctx.consume(name),
            NodeKind::Reference => children.iter().for_each(|id| id.render(ctx)),
            NodeKind::StringLiteral(text) => render_string(ctx, text),
            NodeKind::NumberLiteral(n) => render_number(ctx, *n),
            NodeKind::BooleanLiteral(b) => ctx.consume(if *b { "true" } else { "false" }),
            NodeKind::NullLiteral => ctx.consume("null"),
            NodeKind::Operation(op) => render_operation(self, *op, ctx),
            NodeKind::ArrayConstructor => {
                ctx.consume("[");
                render_list(ctx, children.into_iter());
                ctx.consume("]");
            }
            NodeKind::ObjectConstructor => {
                ctx.consume("{");
                for (index, property) in children.iter().enumerate() {
                    if index > 0 {
                        ctx.consume(",");
                    }
                    property.render(ctx);
                }
                ctx.consume("}");
            }
            NodeKind::ObjProperty => {
                if let [key, value] = children.as_slice() {
                    key.render(ctx);
                    ctx.consume(":");
                    render_operand(ctx, value, Operator::Assign.precedence());
                }
            }
            NodeKind::QuasiHole(hole) => ctx.consume(&hole.to_string()),
        }
    }
}

/// Joins tokens into a string, adding a space only where two tokens would
/// otherwise run together or form a different token.
#[derive(Debug, Default)]
pub struct Concatenator {
    out: String,
    marks: Vec<(usize, SourceRange)>,
    finished: bool,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn needs_space(prev: char, next: char) -> bool {
    (is_word_char(prev) && (is_word_char(next) || next == '\\'))
        || (prev == '+' && next == '+')
        || (prev == '-' && next == '-')
        || (prev == '/' && (next == '/' || next == '*'))
        || (prev.is_ascii_digit() && next == '.')
}

impl Concatenator {
    pub fn new() -> Self {
        Concatenator::default()
    }

    /// Output byte offsets paired with the source range starting there.
    pub fn marks(&self) -> &[(usize, SourceRange)] {
        &self.marks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

impl TokenConsumer for Concatenator {
    fn mark(&mut self, range: Option<&SourceRange>) {
        if let Some(range) = range {
            self.marks.push((self.out.len(), range.clone()));
        }
    }

    fn consume(&mut self, token: &str) {
        let (Some(prev), Some(next)) = (self.out.chars().next_back(), token.chars().next()) else {
            self.out.push_str(token);
            return;
        };
        if needs_space(prev, next) {
            self.out.push(' ');
        }
        self.out.push_str(token);
    }

    fn no_more_tokens(&mut self) {
        self.finished = true;
        trace!("Rendered {} bytes with {} source marks", self.out.len(), self.marks.len());
    }
}

/// Renders a tree to compact JavaScript.
pub fn render_to_string(node: &Node) -> String {
    let mut out = Concatenator::new();
    let mut ctx = RenderContext::new(&mut out);
    node.render(&mut ctx);
    ctx.finish();
    out.into_string()
}
