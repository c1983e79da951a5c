//! Expression evaluation against a rendering scope

use std::collections::HashMap;

use thiserror::Error;

use crate::context::Context;
use crate::expr::ast::{BinOp, Expr, UnaryOp};
use crate::value::Value;

/// A fault raised while parsing or evaluating an expression.
///
/// Only [`EvalError::Undefined`] is recoverable, and only when the
/// failing lookup is the whole reason the expression failed. Everything
/// else aborts the render.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("undefined variable `{0}`")]
    Undefined(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function `{function}` expects {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
}

/// A host function callable from expressions
pub type TemplateFn = Box<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Evaluator with a function allow-list. Method-style calls resolve
/// through the same table with the receiver prepended to the arguments,
/// so `name.upper()` and `upper(name)` are the same call.
pub struct Evaluator {
    functions: HashMap<String, TemplateFn>,
}

impl Evaluator {
    /// Evaluator with the builtin functions registered
    pub fn new() -> Self {
        Self::without_builtins()
            .with_function("len", |args| {
                let [value] = expect_args::<1>("len", args)?;
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(map) => map.len(),
                    other => {
                        return Err(EvalError::Type(format!(
                            "len() takes a string, list, or map, got {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::from(len as f64))
            })
            .with_function("upper", |args| {
                string_arg("upper", args).map(|s| Value::from(s.to_uppercase()))
            })
            .with_function("lower", |args| {
                string_arg("lower", args).map(|s| Value::from(s.to_lowercase()))
            })
            .with_function("trim", |args| {
                string_arg("trim", args).map(|s| Value::from(s.trim()))
            })
            .with_function("join", |args| {
                if args.len() != 2 {
                    return Err(EvalError::Arity {
                        function: "join".to_string(),
                        expected: "2",
                        got: args.len(),
                    });
                }
                let Value::List(items) = &args[0] else {
                    return Err(EvalError::Type(format!(
                        "join() takes a list, got {}",
                        args[0].type_name()
                    )));
                };
                let Value::String(sep) = &args[1] else {
                    return Err(EvalError::Type(format!(
                        "join() separator must be a string, got {}",
                        args[1].type_name()
                    )));
                };
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                Ok(Value::from(parts.join(sep)))
            })
            .with_function("range", |args| {
                let (start, stop, step) = match args {
                    [Value::Number(stop)] => (0.0, *stop, 1.0),
                    [Value::Number(start), Value::Number(stop)] => (*start, *stop, 1.0),
                    [Value::Number(start), Value::Number(stop), Value::Number(step)] => {
                        (*start, *stop, *step)
                    }
                    _ if args.len() > 3 || args.is_empty() => {
                        return Err(EvalError::Arity {
                            function: "range".to_string(),
                            expected: "1 to 3",
                            got: args.len(),
                        })
                    }
                    _ => {
                        return Err(EvalError::Type(
                            "range() arguments must be numbers".to_string(),
                        ))
                    }
                };
                if !start.is_finite() || !stop.is_finite() || !step.is_finite() {
                    return Err(EvalError::Type(
                        "range() arguments must be finite numbers".to_string(),
                    ));
                }
                if step == 0.0 {
                    return Err(EvalError::Type("range() step cannot be zero".to_string()));
                }
                let mut items = Vec::new();
                let mut at = start;
                while (step > 0.0 && at < stop) || (step < 0.0 && at > stop) {
                    items.push(Value::Number(at));
                    let next = at + step;
                    // Past ~2^53 adding the step no longer changes the
                    // float, so the walk would never reach the stop.
                    if next == at {
                        return Err(EvalError::Type(
                            "range() bounds exceed float precision".to_string(),
                        ));
                    }
                    at = next;
                }
                Ok(Value::List(items))
            })
    }

    /// Evaluator with an empty function table
    pub fn without_builtins() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn with_function(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Box::new(f));
        self
    }

    pub fn eval_expr(&self, expr: &Expr, scope: &Context) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval_expr(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Var(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Undefined(name.clone())),
            Expr::Attr(base, name) => {
                let base = self.eval_expr(base, scope)?;
                match base {
                    Value::Map(map) => map.get(name).cloned().ok_or_else(|| {
                        EvalError::Type(format!("map has no key `{}`", name))
                    }),
                    other => Err(EvalError::Type(format!(
                        "cannot access `.{}` on {}",
                        name,
                        other.type_name()
                    ))),
                }
            }
            Expr::Index(base, index) => {
                let base = self.eval_expr(base, scope)?;
                let index = self.eval_expr(index, scope)?;
                eval_index(&base, &index)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, scope),
            Expr::Unary(op, inner) => {
                let value = self.eval_expr(inner, scope)?;
                match op {
                    UnaryOp::Neg => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(EvalError::Type(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                }
            }
            Expr::Binary(lhs, op, rhs) => self.eval_binary(lhs, *op, rhs, scope),
        }
    }

    fn eval_call(
        &self,
        callee: &Expr,
        args: &[Expr],
        scope: &Context,
    ) -> Result<Value, EvalError> {
        let (name, receiver) = match callee {
            Expr::Var(name) => (name, None),
            Expr::Attr(base, name) => (name, Some(self.eval_expr(base, scope)?)),
            _ => {
                return Err(EvalError::Type(
                    "expression is not callable".to_string(),
                ))
            }
        };
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;

        let mut values = Vec::with_capacity(args.len() + 1);
        if let Some(receiver) = receiver {
            values.push(receiver);
        }
        for arg in args {
            values.push(self.eval_expr(arg, scope)?);
        }
        f(&values)
    }

    fn eval_binary(
        &self,
        lhs: &Expr,
        op: BinOp,
        rhs: &Expr,
        scope: &Context,
    ) -> Result<Value, EvalError> {
        // and/or short-circuit and yield the deciding operand
        if op == BinOp::And {
            let left = self.eval_expr(lhs, scope)?;
            return if left.is_truthy() {
                self.eval_expr(rhs, scope)
            } else {
                Ok(left)
            };
        }
        if op == BinOp::Or {
            let left = self.eval_expr(lhs, scope)?;
            return if left.is_truthy() {
                Ok(left)
            } else {
                self.eval_expr(rhs, scope)
            };
        }

        let left = self.eval_expr(lhs, scope)?;
        let right = self.eval_expr(rhs, scope)?;
        match op {
            BinOp::Add => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => {
                    Ok(Value::String(format!("{}{}", a, b)))
                }
                (Value::List(a), Value::List(b)) => {
                    let mut items = a.clone();
                    items.extend(b.iter().cloned());
                    Ok(Value::List(items))
                }
                _ => Err(type_mismatch("+", &left, &right)),
            },
            BinOp::Sub => numeric(op, &left, &right).map(|(a, b)| Value::Number(a - b)),
            BinOp::Mul => numeric(op, &left, &right).map(|(a, b)| Value::Number(a * b)),
            BinOp::Div => {
                let (a, b) = numeric(op, &left, &right)?;
                if b == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Number(a / b))
                }
            }
            BinOp::Mod => {
                let (a, b) = numeric(op, &left, &right)?;
                if b == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Number(a.rem_euclid(b)))
                }
            }
            BinOp::Eq => Ok(Value::Bool(left == right)),
            BinOp::Ne => Ok(Value::Bool(left != right)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                    (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                    _ => return Err(type_mismatch(symbol(op), &left, &right)),
                };
                let Some(ordering) = ordering else {
                    return Ok(Value::Bool(false));
                };
                let holds = match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(holds))
            }
            BinOp::In => contains(&left, &right).map(Value::Bool),
            BinOp::NotIn => contains(&left, &right).map(|found| Value::Bool(!found)),
            BinOp::And | BinOp::Or => unreachable!("handled before operand evaluation"),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn eval_index(base: &Value, index: &Value) -> Result<Value, EvalError> {
    match (base, index) {
        (Value::List(items), Value::Number(n)) => {
            let at = wrap_index(*n, items.len())?;
            Ok(items[at].clone())
        }
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let at = wrap_index(*n, chars.len())?;
            Ok(Value::String(chars[at].to_string()))
        }
        (Value::Map(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::Type(format!("map has no key `{}`", key))),
        (base, index) => Err(EvalError::Type(format!(
            "cannot index {} with {}",
            base.type_name(),
            index.type_name()
        ))),
    }
}

/// Resolve a possibly-negative subscript against a length
fn wrap_index(n: f64, len: usize) -> Result<usize, EvalError> {
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(EvalError::Type(format!(
            "subscript must be an integer, got {}",
            n
        )));
    }
    let index = n as i64;
    let wrapped = if index < 0 { index + len as i64 } else { index };
    if wrapped < 0 || wrapped as usize >= len {
        Err(EvalError::IndexOutOfBounds {
            index,
            len,
        })
    } else {
        Ok(wrapped as usize)
    }
}

fn contains(needle: &Value, haystack: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::List(items) => Ok(items.contains(needle)),
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            other => Err(EvalError::Type(format!(
                "cannot search a string for {}",
                other.type_name()
            ))),
        },
        Value::Map(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(EvalError::Type(format!(
                "cannot search a map for {}",
                other.type_name()
            ))),
        },
        other => Err(EvalError::Type(format!(
            "`in` needs a list, string, or map on the right, got {}",
            other.type_name()
        ))),
    }
}

fn numeric(op: BinOp, left: &Value, right: &Value) -> Result<(f64, f64), EvalError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(type_mismatch(symbol(op), left, right)),
    }
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::In => "in",
        BinOp::NotIn => "not in",
    }
}

fn type_mismatch(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::Type(format!(
        "unsupported operands for `{}`: {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn expect_args<const N: usize>(
    function: &str,
    args: &[Value],
) -> Result<[Value; N], EvalError> {
    <[Value; N]>::try_from(args.to_vec()).map_err(|_| EvalError::Arity {
        function: function.to_string(),
        expected: if N == 1 { "1" } else { "a fixed number of" },
        got: args.len(),
    })
}

fn string_arg(function: &str, args: &[Value]) -> Result<String, EvalError> {
    let [value] = expect_args::<1>(function, args)?;
    match value {
        Value::String(s) => Ok(s),
        other => Err(EvalError::Type(format!(
            "{}() takes a string, got {}",
            function,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExpressionEvaluator;

    fn scope() -> Context {
        let mut ctx = Context::new();
        ctx.set("name", "world");
        ctx.set("count", 3.0);
        ctx.set("items", vec![Value::from(1.0), Value::from(2.0)]);
        ctx
    }

    fn eval(expr: &str) -> Result<Value, EvalError> {
        Evaluator::new().evaluate(expr, &scope())
    }

    #[test]
    fn test_variable_lookup() {
        assert_eq!(eval("name").unwrap(), Value::from("world"));
        assert_eq!(
            eval("missing").unwrap_err(),
            EvalError::Undefined("missing".to_string())
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("count * 2 + 1").unwrap(), Value::from(7.0));
        assert_eq!(eval("7 % 3").unwrap(), Value::from(1.0));
        assert_eq!(eval("1 / 0").unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            eval("'a' + 'b'").unwrap(),
            Value::from("ab")
        );
        assert!(matches!(eval("'a' + 1"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_short_circuit_yields_operand() {
        assert_eq!(eval("'' or 'fallback'").unwrap(), Value::from("fallback"));
        assert_eq!(eval("name and count").unwrap(), Value::from(3.0));
        assert_eq!(eval("0 and missing").unwrap(), Value::from(0.0));
        assert_eq!(eval("name or missing").unwrap(), Value::from("world"));
    }

    #[test]
    fn test_membership() {
        assert_eq!(eval("1 in items").unwrap(), Value::Bool(true));
        assert_eq!(eval("5 not in items").unwrap(), Value::Bool(true));
        assert_eq!(eval("'or' in 'world'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_negative_index_wraps() {
        assert_eq!(eval("items[-1]").unwrap(), Value::from(2.0));
        assert_eq!(
            eval("items[5]").unwrap_err(),
            EvalError::IndexOutOfBounds { index: 5, len: 2 }
        );
    }

    #[test]
    fn test_fractional_subscript_is_a_type_fault() {
        assert!(matches!(eval("items[1.5]"), Err(EvalError::Type(_))));
        assert!(matches!(eval("'abc'[0.5]"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_method_call_prepends_receiver() {
        assert_eq!(eval("name.upper()").unwrap(), Value::from("WORLD"));
        assert_eq!(eval("upper(name)").unwrap(), Value::from("WORLD"));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("len(items)").unwrap(), Value::from(2.0));
        assert_eq!(eval("trim('  x  ')").unwrap(), Value::from("x"));
        assert_eq!(
            eval("join(items, '-')").unwrap(),
            Value::from("1-2")
        );
        assert_eq!(
            eval("range(3)").unwrap(),
            Value::List(vec![Value::from(0.0), Value::from(1.0), Value::from(2.0)])
        );
    }

    #[test]
    fn test_range_start_stop_and_negative_step() {
        assert_eq!(
            eval("range(2, 5)").unwrap(),
            Value::List(vec![Value::from(2.0), Value::from(3.0), Value::from(4.0)])
        );
        assert_eq!(
            eval("range(5, 1, -2)").unwrap(),
            Value::List(vec![Value::from(5.0), Value::from(3.0)])
        );
        assert_eq!(eval("range(3, 3)").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_range_rejects_zero_step() {
        assert!(matches!(eval("range(0, 5, 0)"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_range_faults_past_float_precision() {
        // 2^53 is where f64 stops resolving adjacent integers; the walk
        // must fault instead of spinning in place.
        assert!(matches!(
            eval("range(9007199254740992, 9007199254740994)"),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_range_rejects_non_finite_bounds() {
        // A literal past f64's maximum parses as infinity
        let overflow = format!("range(1{})", "0".repeat(330));
        assert!(matches!(
            Evaluator::new().evaluate(&overflow, &scope()),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            eval("shout(name)").unwrap_err(),
            EvalError::UnknownFunction("shout".to_string())
        );
    }

    #[test]
    fn test_arity_fault() {
        assert!(matches!(eval("upper()"), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn test_custom_function_registration() {
        let evaluator = Evaluator::without_builtins().with_function("double", |args| {
            match args {
                [Value::Number(n)] => Ok(Value::Number(n * 2.0)),
                _ => Err(EvalError::Type("double() takes a number".to_string())),
            }
        });
        assert_eq!(
            evaluator.evaluate("double(count)", &scope()).unwrap(),
            Value::from(6.0)
        );
    }

    #[test]
    fn test_attribute_access() {
        let mut ctx = Context::new();
        let mut user = std::collections::BTreeMap::new();
        user.insert("name".to_string(), Value::from("ada"));
        ctx.set("user", Value::Map(user));
        assert_eq!(
            Evaluator::new().evaluate("user.name", &ctx).unwrap(),
            Value::from("ada")
        );
        assert!(matches!(
            Evaluator::new().evaluate("user.age", &ctx),
            Err(EvalError::Type(_))
        ));
    }
}
