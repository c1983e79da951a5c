//! Node tree for parsed templates

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Which block construct a parse position belongs to; used by the block
/// parser's stop markers and by unterminated-block errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    For,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BlockKind::If => "if",
            BlockKind::For => "for",
        })
    }
}

/// One element of the parsed template tree.
///
/// The tree is immutable after construction and consumed read-only by
/// rendering; expression text inside tags is stored verbatim and only
/// evaluated at render time. Comment blocks are discarded during parsing
/// and never appear here.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal output, emitted unchanged.
    Text(String),
    /// `{{ expr }}` — evaluate and HTML-escape.
    Expr(String),
    /// `{% safe expr %}` — evaluate and emit raw.
    Safe(String),
    /// `{% let name = expr %}` — bind a variable, emit nothing.
    Let { target: String, expr: String },
    /// `{% include "name" arg=expr ... %}` — render another template
    /// against an extended, isolated context.
    Include {
        template: String,
        bindings: Vec<(String, String)>,
    },
    /// `{% if cond %} ... {% else %} ... {% end if %}`
    If {
        condition: String,
        then_children: Vec<Node>,
        else_children: Vec<Node>,
    },
    /// `{% for v[, v2, ...] in expr %} ... {% empty %} ... {% end for %}`
    For {
        vars: Vec<String>,
        iterable: String,
        body: Vec<Node>,
        empty: Vec<Node>,
    },
    /// Sequential container; the tree root is always a `Group`.
    Group(Vec<Node>),
}
