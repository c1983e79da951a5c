//! AST for the expression sub-language

/// A parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    /// List literal, e.g. `[1, "a", x]`
    List(Vec<Expr>),
    /// Variable reference resolved against the rendering scope
    Var(String),
    /// Attribute access, e.g. `user.name`
    Attr(Box<Expr>, String),
    /// Subscript access, e.g. `items[0]` or `row["key"]`
    Index(Box<Expr>, Box<Expr>),
    /// Function or method call
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
    NotIn,
}
