//! Random script trees for property-based testing.
//!
//! `JsExpr`, `JsStmt` and `JsProgram` model the script subset the tree
//! engine understands. Each value renders to quasi syntax through `to_quasi`,
//! which the crate's reader parses back into a node tree. Every generated
//! value is structurally valid, so parsing never fails.
//!
//! Generation takes a depth parameter to bound recursion; names avoid words
//! the reader treats as literals.

use quickcheck::{Arbitrary, Gen};
use std::fmt;

const MAX_DEPTH: usize = 4;

/// Bare words the reader turns into literals, plus script keywords.
const RESERVED_WORDS: &[&str] = &[
    "true", "false", "null", "var", "function", "return", "if", "else", "new", "typeof", "void", "delete", "this",
];

#[derive(Clone, Debug, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
    Void,
}

#[derive(Clone, Debug)]
pub enum JsExpr {
    Var(String),
    Str(String),
    Num(i64),
    Bool(bool),
    Null,
    Binary(BinOp, Box<JsExpr>, Box<JsExpr>),
    Unary(UnaryOp, Box<JsExpr>),
    Assign(String, Box<JsExpr>),
    Member(Box<JsExpr>, String),
    Index(Box<JsExpr>, Box<JsExpr>),
    Call(Box<JsExpr>, Vec<JsExpr>),
    Ternary(Box<JsExpr>, Box<JsExpr>, Box<JsExpr>),
    Array(Vec<JsExpr>),
    Object(Vec<(String, JsExpr)>),
}

#[derive(Clone, Debug)]
pub enum JsStmt {
    Expr(JsExpr),
    Var { name: String, init: Option<JsExpr> },
    Return(Option<JsExpr>),
    If { condition: JsExpr, consequence: Vec<JsStmt>, alternative: Option<Vec<JsStmt>> },
    Block(Vec<JsStmt>),
    Function { name: String, params: Vec<String>, body: Vec<JsStmt> },
    Noop,
}

/// A top-level statement list, rendered as one `Block`.
#[derive(Clone, Debug)]
pub struct JsProgram {
    pub statements: Vec<JsStmt>,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::StrictEq => "===",
            BinOp::StrictNeq => "!==",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        f.write_str(symbol)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "neg"),
            UnaryOp::TypeOf => write!(f, "typeof"),
            UnaryOp::Void => write!(f, "void"),
        }
    }
}

/// Generates a random number in the range [min, max] inclusive.
fn gen_range(g: &mut Gen, min: u32, max: u32) -> u32 {
    min + (u32::arbitrary(g) % (max - min + 1))
}

/// Generates a random name that the reader will not mistake for a literal.
fn gen_name(g: &mut Gen) -> String {
    let starters: Vec<char> = "abcdefghijklmnopqrstuvwxyz_$".chars().collect();
    let continuers: Vec<char> = "abcdefghijklmnopqrstuvwxyz0123456789_".chars().collect();
    loop {
        let len = gen_range(g, 1, 8);
        let mut name = String::new();
        name.push(*g.choose(&starters).unwrap());
        for _ in 1..len {
            name.push(*g.choose(&continuers).unwrap());
        }
        if !RESERVED_WORDS.contains(&name.as_str()) {
            return name;
        }
    }
}

fn gen_string_content(g: &mut Gen) -> String {
    let alphabet: Vec<char> = "abcXYZ 019<>/'\"\\\n".chars().collect();
    let len = gen_range(g, 0, 6);
    (0..len).map(|_| *g.choose(&alphabet).unwrap()).collect()
}

fn gen_list<T>(g: &mut Gen, min: u32, max: u32, mut item: impl FnMut(&mut Gen) -> T) -> Vec<T> {
    (0..gen_range(g, min, max)).map(|_| item(g)).collect()
}

fn gen_leaf(g: &mut Gen) -> JsExpr {
    const CHOICES: &[&str] = &["var", "var", "string", "number", "bool", "null"];
    match *g.choose(CHOICES).unwrap() {
        "var" => JsExpr::Var(gen_name(g)),
        "string" => JsExpr::Str(gen_string_content(g)),
        "number" => JsExpr::Num(i64::arbitrary(g) % 1000),
        "bool" => JsExpr::Bool(bool::arbitrary(g)),
        "null" => JsExpr::Null,
        _ => unreachable!(),
    }
}

/// Generates a random expression with limited depth.
pub fn gen_expr(g: &mut Gen, depth: usize) -> JsExpr {
    let depth = depth.min(MAX_DEPTH);
    if depth == 0 {
        return gen_leaf(g);
    }
    const CHOICES: &[&str] = &[
        "leaf", "binary", "binary", "unary", "assign", "member", "index", "call", "ternary", "array", "object",
    ];
    let sub = |g: &mut Gen| Box::new(gen_expr(g, depth - 1));
    match *g.choose(CHOICES).unwrap() {
        "leaf" => gen_leaf(g),
        "binary" => {
            let op = BinOp::arbitrary(g);
            JsExpr::Binary(op, sub(g), sub(g))
        }
        "unary" => {
            let op = UnaryOp::arbitrary(g);
            JsExpr::Unary(op, sub(g))
        }
        "assign" => JsExpr::Assign(gen_name(g), sub(g)),
        "member" => JsExpr::Member(sub(g), gen_name(g)),
        "index" => JsExpr::Index(sub(g), sub(g)),
        "call" => JsExpr::Call(sub(g), gen_list(g, 0, 3, |g| gen_expr(g, depth - 1))),
        "ternary" => JsExpr::Ternary(sub(g), sub(g), sub(g)),
        "array" => JsExpr::Array(gen_list(g, 0, 3, |g| gen_expr(g, depth - 1))),
        "object" => JsExpr::Object(gen_list(g, 0, 2, |g| (gen_name(g), gen_expr(g, depth - 1)))),
        _ => unreachable!(),
    }
}

fn gen_body(g: &mut Gen, depth: usize) -> Vec<JsStmt> {
    gen_list(g, 0, 3, |g| gen_stmt(g, depth))
}

/// Generates a random statement with limited depth.
pub fn gen_stmt(g: &mut Gen, depth: usize) -> JsStmt {
    let depth = depth.min(MAX_DEPTH);
    if depth == 0 {
        return JsStmt::Expr(gen_leaf(g));
    }
    const CHOICES: &[&str] = &["expr", "expr", "var", "return", "if", "block", "function", "noop"];
    match *g.choose(CHOICES).unwrap() {
        "expr" => JsStmt::Expr(gen_expr(g, depth - 1)),
        "var" => JsStmt::Var {
            name: gen_name(g),
            init: if bool::arbitrary(g) { Some(gen_expr(g, depth - 1)) } else { None },
        },
        "return" => JsStmt::Return(if bool::arbitrary(g) { Some(gen_expr(g, depth - 1)) } else { None }),
        "if" => JsStmt::If {
            condition: gen_expr(g, depth - 1),
            consequence: gen_body(g, depth - 1),
            alternative: if bool::arbitrary(g) { Some(gen_body(g, depth - 1)) } else { None },
        },
        "block" => JsStmt::Block(gen_body(g, depth - 1)),
        "function" => JsStmt::Function {
            name: gen_name(g),
            params: gen_list(g, 0, 3, gen_name),
            body: gen_body(g, depth - 1),
        },
        "noop" => JsStmt::Noop,
        _ => unreachable!(),
    }
}

impl Arbitrary for BinOp {
    fn arbitrary(g: &mut Gen) -> Self {
        const CHOICES: &[BinOp] = &[
            BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod, BinOp::Eq, BinOp::Neq, BinOp::StrictEq,
            BinOp::StrictNeq, BinOp::Lt, BinOp::Lte, BinOp::Gt, BinOp::Gte, BinOp::And, BinOp::Or,
        ];
        g.choose(CHOICES).unwrap().clone()
    }
}

impl Arbitrary for UnaryOp {
    fn arbitrary(g: &mut Gen) -> Self {
        const CHOICES: &[UnaryOp] = &[UnaryOp::Not, UnaryOp::Neg, UnaryOp::TypeOf, UnaryOp::Void];
        g.choose(CHOICES).unwrap().clone()
    }
}

impl Arbitrary for JsExpr {
    fn arbitrary(g: &mut Gen) -> Self {
        gen_expr(g, g.size().min(MAX_DEPTH))
    }
}

impl Arbitrary for JsStmt {
    fn arbitrary(g: &mut Gen) -> Self {
        gen_stmt(g, g.size().min(MAX_DEPTH))
    }
}

impl Arbitrary for JsProgram {
    fn arbitrary(g: &mut Gen) -> Self {
        let depth = g.size().min(MAX_DEPTH);
        JsProgram { statements: gen_list(g, 1, 5, |g| gen_stmt(g, depth)) }
    }
}

/// Quotes a string for quasi syntax.
fn quote(s: &str) -> String {
    let mut quoted = String::from("\"");
    for c in s.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn join<T>(items: &[T], render: impl Fn(&T) -> String) -> String {
    items.iter().map(|item| format!(" {}", render(item))).collect()
}

impl JsExpr {
    /// Converts the expression to quasi syntax.
    pub fn to_quasi(&self) -> String {
        match self {
            JsExpr::Var(name) => name.clone(),
            JsExpr::Str(s) => quote(s),
            JsExpr::Num(n) => format!("(NumberLiteral {})", n),
            JsExpr::Bool(b) => b.to_string(),
            JsExpr::Null => "null".to_string(),
            JsExpr::Binary(op, l, r) => format!("(Operation {} {} {})", op, l.to_quasi(), r.to_quasi()),
            JsExpr::Unary(op, e) => format!("(Operation {} {})", op, e.to_quasi()),
            JsExpr::Assign(name, e) => format!("(Operation = {} {})", name, e.to_quasi()),
            JsExpr::Member(obj, prop) => format!("(Operation . {} {})", obj.to_quasi(), prop),
            JsExpr::Index(obj, key) => format!("(Operation index {} {})", obj.to_quasi(), key.to_quasi()),
            JsExpr::Call(f, args) => format!("(Operation call {}{})", f.to_quasi(), join(args, JsExpr::to_quasi)),
            JsExpr::Ternary(c, a, b) => format!("(Operation ?: {} {} {})", c.to_quasi(), a.to_quasi(), b.to_quasi()),
            JsExpr::Array(items) => format!("(ArrayConstructor{})", join(items, JsExpr::to_quasi)),
            JsExpr::Object(props) => format!(
                "(ObjectConstructor{})",
                join(props, |(key, value)| format!("(ObjProperty {} {})", quote(key), value.to_quasi()))
            ),
        }
    }

    /// Number of nodes the expression parses into.
    pub fn node_count(&self) -> usize {
        match self {
            // Reference + Identifier
            JsExpr::Var(_) => 2,
            JsExpr::Str(_) | JsExpr::Num(_) | JsExpr::Bool(_) | JsExpr::Null => 1,
            JsExpr::Binary(_, l, r) | JsExpr::Index(l, r) => 1 + l.node_count() + r.node_count(),
            JsExpr::Unary(_, e) => 1 + e.node_count(),
            JsExpr::Assign(_, e) | JsExpr::Member(e, _) => 3 + e.node_count(),
            JsExpr::Call(f, args) => 1 + f.node_count() + args.iter().map(JsExpr::node_count).sum::<usize>(),
            JsExpr::Ternary(c, a, b) => 1 + c.node_count() + a.node_count() + b.node_count(),
            JsExpr::Array(items) => 1 + items.iter().map(JsExpr::node_count).sum::<usize>(),
            JsExpr::Object(props) => 1 + props.iter().map(|(_, value)| 2 + value.node_count()).sum::<usize>(),
        }
    }
}

fn body_count(statements: &[JsStmt]) -> usize {
    1 + statements.iter().map(JsStmt::node_count).sum::<usize>()
}

fn block(statements: &[JsStmt]) -> String {
    format!("(Block{})", join(statements, JsStmt::to_quasi))
}

impl JsStmt {
    /// Converts the statement to quasi syntax.
    pub fn to_quasi(&self) -> String {
        match self {
            JsStmt::Expr(e) => format!("(ExpressionStmt {})", e.to_quasi()),
            JsStmt::Var { name, init: Some(init) } => format!("(Declaration (Identifier {}) {})", name, init.to_quasi()),
            JsStmt::Var { name, init: None } => format!("(Declaration (Identifier {}))", name),
            JsStmt::Return(Some(e)) => format!("(ReturnStmt {})", e.to_quasi()),
            JsStmt::Return(None) => "(ReturnStmt)".to_string(),
            JsStmt::If { condition, consequence, alternative } => {
                let mut code = format!("(Conditional {} {}", condition.to_quasi(), block(consequence));
                if let Some(alternative) = alternative {
                    code += &format!(" {}", block(alternative));
                }
                code + ")"
            }
            JsStmt::Block(statements) => block(statements),
            JsStmt::Function { name, params, body } => format!(
                "(FunctionDeclaration (FunctionConstructor (Identifier {}){} {}))",
                name,
                join(params, |p| format!("(FormalParam (Identifier {}))", p)),
                block(body)
            ),
            JsStmt::Noop => "(Noop)".to_string(),
        }
    }

    /// Number of nodes the statement parses into.
    pub fn node_count(&self) -> usize {
        match self {
            JsStmt::Expr(e) => 1 + e.node_count(),
            JsStmt::Var { init, .. } => 2 + init.as_ref().map_or(0, JsExpr::node_count),
            JsStmt::Return(e) => 1 + e.as_ref().map_or(0, JsExpr::node_count),
            JsStmt::If { condition, consequence, alternative } => {
                1 + condition.node_count() + body_count(consequence) + alternative.as_deref().map_or(0, body_count)
            }
            JsStmt::Block(statements) => body_count(statements),
            // FunctionDeclaration, FunctionConstructor, Identifier, two nodes per parameter, body
            JsStmt::Function { params, body, .. } => 3 + 2 * params.len() + body_count(body),
            JsStmt::Noop => 1,
        }
    }
}

impl JsProgram {
    /// Converts the program to a quasi-syntax `Block`.
    pub fn to_quasi(&self) -> String {
        block(&self.statements)
    }

    pub fn node_count(&self) -> usize {
        body_count(&self.statements)
    }
}
