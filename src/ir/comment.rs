//! Lexical comments attached to tree nodes.
//!
//! Comments ride along on the node they precede rather than appearing as
//! children, so traversals and pattern matching never see them. They are
//! kept so the renderer can re-emit them and so rewrite passes can read
//! pragma comments such as `/* @trusted */`.

use super::node::SourceRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentKind {
    /// `// ...` up to the end of the line
    Line,
    /// `/* ... */`
    Block,
}

/// A comment token with its raw text (delimiters included) and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub kind: CommentKind,

    /// Raw text including delimiters (e.g. `// note` or `/* block */`)
    pub text: String,

    pub range: Option<SourceRange>,

    /// Starts with `///` or `/**`
    pub is_doc_comment: bool,
}

impl Comment {
    /// Classifies raw comment text by its opening delimiter.
    /// Text without a delimiter is treated as the body of a block comment.
    pub fn new(text: &str, range: Option<SourceRange>) -> Self {
        let (kind, text) = if text.starts_with("//") {
            (CommentKind::Line, text.to_string())
        } else if text.starts_with("/*") {
            (CommentKind::Block, text.to_string())
        } else {
            (CommentKind::Block, format!("/* {} */", text))
        };
        let is_doc_comment = text.starts_with("///") || text.starts_with("/**");
        Comment { kind, text, range, is_doc_comment }
    }

    pub fn line(body: &str) -> Self {
        Comment::new(&format!("// {}", body), None)
    }

    pub fn block(body: &str) -> Self {
        Comment::new(&format!("/* {} */", body), None)
    }

    /// Comment text with the delimiters and surrounding whitespace removed.
    pub fn body(&self) -> &str {
        match self.kind {
            CommentKind::Line => self.text.trim_start_matches('/').trim(),
            CommentKind::Block => self
                .text
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim_start_matches('*')
                .trim(),
        }
    }

    /// Rewriter pragma carried by the comment: `// @trusted` gives `trusted`,
    /// `/* @policy: strict */` gives `policy`.
    pub fn directive(&self) -> Option<&str> {
        let stripped = self.body().strip_prefix('@')?;
        let name = stripped
            .split(|c: char| c == ':' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        if name.is_empty() { None } else { Some(name) }
    }

    /// Documentation text with delimiters stripped, for doc comments only.
    /// Leading `*` on each line of a block doc comment is removed.
    pub fn doc_text(&self) -> Option<String> {
        if !self.is_doc_comment {
            return None;
        }

        Some(match self.kind {
            CommentKind::Line => self.text.trim_start_matches("///").trim().to_string(),
            CommentKind::Block => self
                .text
                .trim_start_matches("/**")
                .trim_end_matches("*/")
                .lines()
                .map(|line| line.trim_start().trim_start_matches('*').trim())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        })
    }

    /// Text safe to re-emit inline between tokens. Line comments are turned
    /// into block comments and a `*/` inside the body is broken up.
    pub fn inline_text(&self) -> String {
        match self.kind {
            CommentKind::Block => self.text.clone(),
            CommentKind::Line => format!("/* {} */", self.body().replace("*/", "* /")),
        }
    }
}
