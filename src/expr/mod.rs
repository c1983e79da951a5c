//! Expression sub-language: lexer, parser, and evaluator

pub mod ast;
pub mod eval;
mod grammar;
pub mod lexer;

pub use ast::{BinOp, Expr, UnaryOp};
pub use eval::{EvalError, Evaluator, TemplateFn};
pub use grammar::parse;

use crate::context::Context;
use crate::value::Value;

/// Evaluates expression source against a rendering scope. The renderer
/// goes through this trait so hosts can swap in their own evaluator.
pub trait ExpressionEvaluator {
    fn evaluate(&self, expr: &str, scope: &Context) -> Result<Value, EvalError>;
}

impl ExpressionEvaluator for Evaluator {
    fn evaluate(&self, expr: &str, scope: &Context) -> Result<Value, EvalError> {
        let parsed = grammar::parse(expr)?;
        self.eval_expr(&parsed, scope)
    }
}
