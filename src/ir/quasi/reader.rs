//! Reader for the quasi s-expression syntax.
//!
//! ```text
//! tree  := '(' Kind value? tree* ')' | atom
//! atom  := "string" | number | true | false | null | name | @hole
//! hole  := '@' name ('*' | '+')? (':' Filter)?
//! ```
//!
//! A bare `name` is shorthand for `(Reference (Identifier name))`. `;` starts
//! a comment running to the end of the line.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::{HoleFilter, Quantifier, QuasiError, QuasiHole};
use crate::ir::node::{KindTag, Node, NodeKind, NodeRef, Operator, Position, SourceId, SourceRange, is_bare_word};

static KINDS: Lazy<FxHashMap<&'static str, KindTag>> =
    Lazy::new(|| KindTag::ALL.iter().map(|tag| (tag.name(), *tag)).collect());

static OPERATORS: Lazy<FxHashMap<&'static str, Operator>> =
    Lazy::new(|| Operator::ALL.iter().map(|op| (op.symbol(), *op)).collect());

/// Reads a single tree.
pub fn parse_tree(source: &str) -> Result<NodeRef, QuasiError> {
    Parser::new(source, None)?.parse_all()
}

/// Reads a single tree, giving every node a range into `id`.
pub fn parse_tree_with_source(source: &str, id: SourceId) -> Result<NodeRef, QuasiError> {
    Parser::new(source, Some(id))?.parse_all()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Str(String),
    Word(String),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

fn syntax(offset: usize, message: impl Into<String>) -> QuasiError {
    QuasiError::Syntax { offset, message: message.into() }
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, QuasiError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            ';' => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            }
            '(' | ')' => {
                chars.next();
                let token = if c == '(' { Token::Open } else { Token::Close };
                tokens.push(Spanned { token, start, end: start + 1 });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let end = loop {
                    let Some((offset, c)) = chars.next() else {
                        return Err(syntax(start, "unterminated string"));
                    };
                    match c {
                        '"' => break offset + 1,
                        '\\' => text.push(read_escape(&mut chars, offset)?),
                        _ => text.push(c),
                    }
                };
                tokens.push(Spanned { token: Token::Str(text), start, end });
            }
            _ => {
                let mut word = String::new();
                let mut end = start;
                while let Some((offset, c)) = chars.next_if(|&(_, c)| !c.is_whitespace() && !matches!(c, '(' | ')' | '"' | ';')) {
                    word.push(c);
                    end = offset + c.len_utf8();
                }
                tokens.push(Spanned { token: Token::Word(word), start, end });
            }
        }
    }
    Ok(tokens)
}

fn read_escape(chars: &mut impl Iterator<Item = (usize, char)>, offset: usize) -> Result<char, QuasiError> {
    match chars.next() {
        Some((_, 'n')) => Ok('\n'),
        Some((_, 'r')) => Ok('\r'),
        Some((_, 't')) => Ok('\t'),
        Some((_, '"')) => Ok('"'),
        Some((_, '\\')) => Ok('\\'),
        Some((_, 'u')) => {
            if !matches!(chars.next(), Some((_, '{'))) {
                return Err(syntax(offset, "expected `{` after \\u"));
            }
            let mut hex = String::new();
            loop {
                match chars.next() {
                    Some((_, '}')) => break,
                    Some((_, c)) if c.is_ascii_hexdigit() => hex.push(c),
                    _ => return Err(syntax(offset, "malformed \\u{...} escape")),
                }
            }
            u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| syntax(offset, format!("invalid code point {}", hex)))
        }
        Some((_, other)) => Err(syntax(offset, format!("unknown escape \\{}", other))),
        None => Err(syntax(offset, "unterminated string")),
    }
}

/// Byte offset to row/column conversion.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        LineIndex { starts }
    }

    fn position(&self, byte: usize) -> Position {
        let row = self.starts.partition_point(|&start| start <= byte).saturating_sub(1);
        let column = byte - self.starts.get(row).copied().unwrap_or(0);
        Position { row, column, byte }
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    len: usize,
    lines: LineIndex,
    source: Option<SourceId>,
}

impl Parser {
    fn new(text: &str, source: Option<SourceId>) -> Result<Self, QuasiError> {
        Ok(Parser {
            tokens: tokenize(text)?,
            index: 0,
            len: text.len(),
            lines: LineIndex::new(text),
            source,
        })
    }

    fn parse_all(mut self) -> Result<NodeRef, QuasiError> {
        let tree = self.parse_tree()?;
        if let Some(extra) = self.tokens.get(self.index) {
            return Err(syntax(extra.start, "unexpected input after the tree"));
        }
        Ok(tree)
    }

    fn next(&mut self) -> Result<Spanned, QuasiError> {
        let token = self
            .tokens
            .get(self.index)
            .cloned()
            .ok_or_else(|| syntax(self.len, "unexpected end of input"))?;
        self.index += 1;
        Ok(token)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|spanned| &spanned.token)
    }

    fn range(&self, start: usize, end: usize) -> Option<SourceRange> {
        self.source
            .as_ref()
            .map(|id| SourceRange::new(id.clone(), self.lines.position(start), self.lines.position(end)))
    }

    fn parse_tree(&mut self) -> Result<NodeRef, QuasiError> {
        let Spanned { token, start, end } = self.next()?;
        let node = match token {
            Token::Open => return self.parse_list(start),
            Token::Close => return Err(syntax(start, "unexpected `)`")),
            Token::Str(text) => Node::string_literal(&text),
            Token::Word(word) => parse_atom(&word, start)?,
        };
        node.set_range(self.range(start, end));
        Ok(node)
    }

    fn parse_list(&mut self, open: usize) -> Result<NodeRef, QuasiError> {
        let head = self.next()?;
        let Token::Word(name) = &head.token else {
            return Err(syntax(head.start, "expected a node kind after `(`"));
        };
        let tag = *KINDS
            .get(name.as_str())
            .ok_or_else(|| syntax(head.start, format!("unknown node kind `{}`", name)))?;

        let kind = match tag {
            KindTag::Identifier => NodeKind::Identifier(self.expect_text()?),
            KindTag::StringLiteral => {
                let value = self.next()?;
                match value.token {
                    Token::Str(text) => NodeKind::StringLiteral(text),
                    _ => return Err(syntax(value.start, "StringLiteral needs a quoted value")),
                }
            }
            KindTag::NumberLiteral => {
                let (word, at) = self.expect_word()?;
                let n = word
                    .parse::<f64>()
                    .map_err(|_| syntax(at, format!("`{}` is not a number", word)))?;
                NodeKind::NumberLiteral(n)
            }
            KindTag::BooleanLiteral => match self.expect_word()? {
                (word, _) if word == "true" => NodeKind::BooleanLiteral(true),
                (word, _) if word == "false" => NodeKind::BooleanLiteral(false),
                (word, at) => return Err(syntax(at, format!("`{}` is not a boolean", word))),
            },
            KindTag::Operation => {
                let (word, at) = self.expect_word()?;
                let op = *OPERATORS
                    .get(word.as_str())
                    .ok_or_else(|| syntax(at, format!("unknown operator `{}`", word)))?;
                NodeKind::Operation(op)
            }
            KindTag::QuasiHole => return Err(syntax(head.start, "holes are written as @name")),
            other => unit_kind(other).ok_or_else(|| syntax(head.start, format!("cannot build {}", other)))?,
        };

        let mut children = Vec::new();
        let close = loop {
            match self.peek() {
                Some(Token::Close) => break self.next()?.end,
                Some(_) => children.push(self.parse_tree()?),
                None => return Err(syntax(open, "unclosed `(`")),
            }
        };

        Node::new_at(kind, children, self.range(open, close)).map_err(|err| syntax(open, err.to_string()))
    }

    fn expect_word(&mut self) -> Result<(String, usize), QuasiError> {
        let spanned = self.next()?;
        match spanned.token {
            Token::Word(word) => Ok((word, spanned.start)),
            _ => Err(syntax(spanned.start, "expected a value")),
        }
    }

    fn expect_text(&mut self) -> Result<String, QuasiError> {
        let spanned = self.next()?;
        match spanned.token {
            Token::Word(word) | Token::Str(word) => Ok(word),
            _ => Err(syntax(spanned.start, "expected a name")),
        }
    }
}

fn unit_kind(tag: KindTag) -> Option<NodeKind> {
    Some(match tag {
        KindTag::Block => NodeKind::Block,
        KindTag::ExpressionStmt => NodeKind::ExpressionStmt,
        KindTag::Declaration => NodeKind::Declaration,
        KindTag::FunctionDeclaration => NodeKind::FunctionDeclaration,
        KindTag::FunctionConstructor => NodeKind::FunctionConstructor,
        KindTag::FormalParam => NodeKind::FormalParam,
        KindTag::ReturnStmt => NodeKind::ReturnStmt,
        KindTag::Conditional => NodeKind::Conditional,
        KindTag::Noop => NodeKind::Noop,
        KindTag::Reference => NodeKind::Reference,
        KindTag::NullLiteral => NodeKind::NullLiteral,
        KindTag::ArrayConstructor => NodeKind::ArrayConstructor,
        KindTag::ObjectConstructor => NodeKind::ObjectConstructor,
        KindTag::ObjProperty => NodeKind::ObjProperty,
        KindTag::Module => NodeKind::Module,
        _ => return None,
    })
}

fn looks_numeric(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    digits.starts_with(|c: char| c.is_ascii_digit())
        || (digits.starts_with('.') && digits[1..].starts_with(|c: char| c.is_ascii_digit()))
}

fn parse_atom(word: &str, at: usize) -> Result<NodeRef, QuasiError> {
    if let Some(hole) = word.strip_prefix('@') {
        return parse_hole(hole, at).map(Node::hole);
    }
    match word {
        "true" => return Ok(Node::boolean_literal(true)),
        "false" => return Ok(Node::boolean_literal(false)),
        "null" => return Ok(Node::null_literal()),
        _ => {}
    }
    if looks_numeric(word) {
        return word
            .parse::<f64>()
            .map(Node::number_literal)
            .map_err(|_| syntax(at, format!("`{}` is not a number", word)));
    }
    if is_bare_word(word) {
        return Ok(Node::reference(word));
    }
    Err(syntax(at, format!("unexpected `{}`", word)))
}

fn parse_hole(text: &str, at: usize) -> Result<QuasiHole, QuasiError> {
    let name_len = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(text.len());
    let (name, rest) = text.split_at(name_len);
    if name.is_empty() {
        return Err(syntax(at, "hole needs a name"));
    }

    let (quantifier, rest) = match rest.chars().next() {
        Some('*') => (Quantifier::ZeroOrMore, &rest[1..]),
        Some('+') => (Quantifier::OneOrMore, &rest[1..]),
        _ => (Quantifier::ExactlyOne, rest),
    };

    let filter = match rest.strip_prefix(':') {
        Some(filter) => HoleFilter::from_name(filter)
            .ok_or_else(|| syntax(at, format!("unknown hole filter `{}`", filter)))?,
        None if rest.is_empty() => HoleFilter::Any,
        None => return Err(syntax(at, format!("unexpected `{}` after hole @{}", rest, name))),
    };

    Ok(QuasiHole::new(name, quantifier, filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_shorthands() {
        let tree = parse_tree(r#"(ArrayConstructor a "s" 1.5 -2 true null)"#).unwrap();
        assert_eq!(
            tree.to_string(),
            r#"(ArrayConstructor (Reference (Identifier a)) (StringLiteral "s") (NumberLiteral 1.5) (NumberLiteral -2) (BooleanLiteral true) (NullLiteral))"#
        );
    }

    #[test]
    fn test_display_reads_back() {
        let source = r#"(Block (Declaration (Identifier x) (Operation + 1 (Operation call f "a\"b\n"))) (ReturnStmt x))"#;
        let tree = parse_tree(source).unwrap();
        let again = parse_tree(&tree.to_string()).unwrap();
        assert!(tree.structurally_equal(&again));
    }

    #[test]
    fn test_holes() {
        let tree = parse_tree("(Operation call @f:Reference @args+ )").unwrap();
        let f = tree.child(0).unwrap();
        let hole = f.as_hole().unwrap();
        assert_eq!(hole.name(), "f");
        assert_eq!(hole.filter(), HoleFilter::Kind(KindTag::Reference));
        assert_eq!(tree.child(1).unwrap().as_hole().map(|h| h.quantifier()), Some(Quantifier::OneOrMore));
    }

    #[test]
    fn test_errors_carry_offsets() {
        assert!(matches!(parse_tree("(Block"), Err(QuasiError::Syntax { offset: 0, .. })));
        assert!(matches!(parse_tree("(Frob)"), Err(QuasiError::Syntax { offset: 1, .. })));
        assert!(matches!(parse_tree("a b"), Err(QuasiError::Syntax { offset: 2, .. })));
        assert!(matches!(parse_tree("@x?"), Err(QuasiError::Syntax { .. })));
        assert!(matches!(parse_tree(""), Err(QuasiError::Syntax { offset: 0, .. })));
        assert!(matches!(parse_tree("\"open"), Err(QuasiError::Syntax { .. })));
    }

    #[test]
    fn test_structure_errors_become_syntax_errors() {
        let err = parse_tree("(Operation = 1 2)").unwrap_err();
        let QuasiError::Syntax { offset, message } = err else {
            panic!("expected a syntax error");
        };
        assert_eq!(offset, 0);
        assert!(message.contains("assignable target"), "{}", message);
    }

    #[test]
    fn test_comments_and_ranges() {
        let source = indoc! {r#"
            ; increments x
            (ExpressionStmt
              (Operation += x 1))
        "#};
        let tree = parse_tree_with_source(source, SourceId::new("inc.quasi")).unwrap();
        let range = tree.range().unwrap();
        assert_eq!(range.start.row, 1);
        assert_eq!(range.start.column, 0);
        assert_eq!(range.end.row, 2);
        let op = tree.child(0).unwrap();
        assert_eq!(op.range().map(|r| r.start.column), Some(2));
        let x = op.child(0).unwrap();
        assert_eq!(x.range().map(|r| (r.start.row, r.start.column)), Some((2, 16)));
    }
}
