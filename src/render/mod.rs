//! Tree renderer with context scoping rules

use thiserror::Error;

use crate::context::Context;
use crate::error::ParseError;
use crate::expr::{EvalError, ExpressionEvaluator};
use crate::parser::{parse, Node};
use crate::store::{StoreError, TemplateStore};
use crate::value::Value;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to evaluate `{expr}`: {source}")]
    Eval { expr: String, source: EvalError },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("include depth limit of {limit} exceeded rendering `{name}`")]
    IncludeDepth { name: String, limit: usize },
}

/// Escape text for HTML output, including both quote characters
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

pub struct Renderer<'a> {
    store: &'a dyn TemplateStore,
    evaluator: &'a dyn ExpressionEvaluator,
    max_include_depth: usize,
}

impl<'a> Renderer<'a> {
    pub fn new(
        store: &'a dyn TemplateStore,
        evaluator: &'a dyn ExpressionEvaluator,
        max_include_depth: usize,
    ) -> Self {
        Self {
            store,
            evaluator,
            max_include_depth,
        }
    }

    /// Load, parse, and render a named template with its own context.
    /// The depth guard is what breaks include cycles.
    pub fn render_template(
        &self,
        name: &str,
        mut context: Context,
        depth: usize,
    ) -> Result<String, RenderError> {
        if depth > self.max_include_depth {
            return Err(RenderError::IncludeDepth {
                name: name.to_string(),
                limit: self.max_include_depth,
            });
        }
        let source = self.store.load(name)?;
        let tree = parse(&source)?;
        self.render_node(&tree, &mut context, depth)
    }

    /// Render an already-parsed tree with its own context
    pub fn render_tree(
        &self,
        tree: &Node,
        mut context: Context,
        depth: usize,
    ) -> Result<String, RenderError> {
        self.render_node(tree, &mut context, depth)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        context: &mut Context,
        depth: usize,
    ) -> Result<String, RenderError> {
        let mut out = String::new();
        for node in nodes {
            out.push_str(&self.render_node(node, context, depth)?);
        }
        Ok(out)
    }

    fn render_node(
        &self,
        node: &Node,
        context: &mut Context,
        depth: usize,
    ) -> Result<String, RenderError> {
        match node {
            Node::Text(text) => Ok(text.clone()),
            Node::Group(children) => self.render_nodes(children, context, depth),

            Node::Expr(expr) => match self.evaluator.evaluate(expr.trim(), context) {
                Ok(value) => Ok(escape_html(&value.to_string())),
                Err(EvalError::Undefined(_)) => Ok(String::new()),
                Err(source) => Err(eval_fault(expr, source)),
            },
            Node::Safe(expr) => match self.evaluator.evaluate(expr.trim(), context) {
                Ok(value) => Ok(value.to_string()),
                Err(EvalError::Undefined(_)) => Ok(String::new()),
                Err(source) => Err(eval_fault(expr, source)),
            },

            // Bindings mutate the scope shared with later siblings
            Node::Let { target, expr } => {
                let value = self
                    .evaluator
                    .evaluate(expr.trim(), context)
                    .map_err(|source| eval_fault(expr, source))?;
                context.set(target.clone(), value);
                Ok(String::new())
            }

            Node::If {
                condition,
                then_children,
                else_children,
            } => {
                let holds = match self.evaluator.evaluate(condition.trim(), context) {
                    Ok(value) => value.is_truthy(),
                    Err(EvalError::Undefined(_)) => false,
                    Err(source) => return Err(eval_fault(condition, source)),
                };
                if holds {
                    self.render_nodes(then_children, context, depth)
                } else {
                    self.render_nodes(else_children, context, depth)
                }
            }

            Node::For {
                vars,
                iterable,
                body,
                empty,
            } => {
                let value = match self.evaluator.evaluate(iterable.trim(), context) {
                    Ok(value) => value,
                    // An unresolvable iterable suppresses the whole
                    // node, empty branch included.
                    Err(EvalError::Undefined(_)) => return Ok(String::new()),
                    Err(source) => return Err(eval_fault(iterable, source)),
                };
                let items = iter_items(&value).map_err(|source| eval_fault(iterable, source))?;

                if items.is_empty() {
                    return self.render_nodes(empty, context, depth);
                }

                // Destructuring needs every item to match before any
                // iteration renders; a mismatch empties the whole loop.
                let bindings: Vec<Vec<(String, Value)>> = if vars.len() == 1 {
                    items
                        .into_iter()
                        .map(|item| vec![(vars[0].clone(), item)])
                        .collect()
                } else {
                    match destructure_all(vars, &items) {
                        Some(bindings) => bindings,
                        None => return Ok(String::new()),
                    }
                };

                let mut out = String::new();
                for row in bindings {
                    let mut scope = context.clone();
                    for (name, value) in row {
                        scope.set(name, value);
                    }
                    out.push_str(&self.render_nodes(body, &mut scope, depth)?);
                }
                Ok(out)
            }

            Node::Include { template, bindings } => {
                let mut inner = context.clone();
                for (name, expr) in bindings {
                    let value = self
                        .evaluator
                        .evaluate(expr.trim(), context)
                        .map_err(|source| eval_fault(expr, source))?;
                    inner.set(name.clone(), value);
                }
                self.render_template(template, inner, depth + 1)
            }
        }
    }
}

fn eval_fault(expr: &str, source: EvalError) -> RenderError {
    RenderError::Eval {
        expr: expr.trim().to_string(),
        source,
    }
}

/// Expand an iterable value into loop items
fn iter_items(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Map(map) => Ok(map.keys().map(|k| Value::String(k.clone())).collect()),
        other => Err(EvalError::Type(format!(
            "cannot iterate over {}",
            other.type_name()
        ))),
    }
}

/// Pair each loop variable with the matching element of each item.
/// Returns `None` if any item cannot be split to the variable count.
fn destructure_all(vars: &[String], items: &[Value]) -> Option<Vec<Vec<(String, Value)>>> {
    items
        .iter()
        .map(|item| {
            let parts: Vec<Value> = match item {
                Value::List(parts) => parts.clone(),
                Value::String(s) => {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                }
                _ => return None,
            };
            if parts.len() != vars.len() {
                return None;
            }
            Some(
                vars.iter()
                    .cloned()
                    .zip(parts)
                    .collect::<Vec<(String, Value)>>(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Evaluator;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn render_with(store: &MemoryStore, name: &str, context: Context) -> String {
        let evaluator = Evaluator::new();
        Renderer::new(store, &evaluator, 16)
            .render_template(name, context, 0)
            .unwrap()
    }

    fn render(source: &str, context: Context) -> String {
        let store = MemoryStore::new().with("main", source);
        render_with(&store, "main", context)
    }

    #[test]
    fn test_expr_output_is_escaped() {
        let mut ctx = Context::new();
        ctx.set("html", "<b>& \"hi\"</b>");
        assert_eq!(
            render("{{ html }}", ctx),
            "&lt;b&gt;&amp; &quot;hi&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_safe_output_is_raw() {
        let mut ctx = Context::new();
        ctx.set("html", "<b>hi</b>");
        assert_eq!(render("{% safe html %}", ctx), "<b>hi</b>");
    }

    #[test]
    fn test_undefined_expr_renders_empty() {
        assert_eq!(render("a{{ missing }}b", Context::new()), "ab");
    }

    #[test]
    fn test_let_binding_is_visible_to_later_siblings() {
        assert_eq!(
            render("{% let x = 2 + 3 %}{{ x }}", Context::new()),
            "5"
        );
    }

    #[test]
    fn test_let_with_undefined_expr_is_fatal() {
        let store = MemoryStore::new().with("main", "{% let x = missing %}");
        let evaluator = Evaluator::new();
        let err = Renderer::new(&store, &evaluator, 16)
            .render_template("main", Context::new(), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Eval {
                source: EvalError::Undefined(_),
                ..
            }
        ));
    }

    #[test]
    fn test_if_branches_share_outer_scope() {
        assert_eq!(
            render(
                "{% if true %}{% let x = 1 %}{% end if %}{{ x }}",
                Context::new()
            ),
            "1"
        );
    }

    #[test]
    fn test_undefined_condition_takes_else_branch() {
        assert_eq!(
            render("{% if missing %}A{% else %}B{% end if %}", Context::new()),
            "B"
        );
    }

    #[test]
    fn test_for_iterations_are_isolated() {
        let source = "{% let y = 0 %}{% for i in [1, 2] %}{{ y }}{% let y = i %}{% end for %}|{{ y }}";
        assert_eq!(render(source, Context::new()), "00|0");
    }

    #[test]
    fn test_for_empty_branch() {
        assert_eq!(
            render("{% for i in [] %}X{% empty %}Y{% end for %}", Context::new()),
            "Y"
        );
        assert_eq!(
            render(
                "{% for i in [1, 2] %}{{ i }}{% empty %}Y{% end for %}",
                Context::new()
            ),
            "12"
        );
    }

    #[test]
    fn test_undefined_iterable_suppresses_empty_branch() {
        assert_eq!(
            render(
                "{% for i in missing %}X{% empty %}Y{% end for %}",
                Context::new()
            ),
            ""
        );
    }

    #[test]
    fn test_multi_var_destructuring() {
        let mut ctx = Context::new();
        ctx.set(
            "pairs",
            vec![
                Value::List(vec![Value::from("a"), Value::from(1.0)]),
                Value::List(vec![Value::from("b"), Value::from(2.0)]),
            ],
        );
        assert_eq!(
            render("{% for k, v in pairs %}{{ k }}={{ v }};{% end for %}", ctx),
            "a=1;b=2;"
        );
    }

    #[test]
    fn test_destructure_arity_mismatch_empties_loop() {
        let mut ctx = Context::new();
        ctx.set(
            "pairs",
            vec![
                Value::List(vec![Value::from("a"), Value::from(1.0)]),
                Value::List(vec![Value::from("b")]),
            ],
        );
        assert_eq!(
            render("{% for k, v in pairs %}{{ k }}{% end for %}", ctx),
            ""
        );
    }

    #[test]
    fn test_string_iteration() {
        assert_eq!(
            render("{% for c in 'abc' %}{{ c }}-{% end for %}", Context::new()),
            "a-b-c-"
        );
    }

    #[test]
    fn test_include_context_is_isolated() {
        let store = MemoryStore::new()
            .with("main", "{% include \"child\" x=1 %}{{ x }}{{ y }}")
            .with("child", "{% let y = 2 %}[{{ x }}{{ y }}]");
        assert_eq!(render_with(&store, "main", Context::new()), "[12]");
    }

    #[test]
    fn test_include_cycle_hits_depth_limit() {
        let store = MemoryStore::new().with("a", "{% include \"a\" %}");
        let evaluator = Evaluator::new();
        let err = Renderer::new(&store, &evaluator, 4)
            .render_template("a", Context::new(), 0)
            .unwrap_err();
        assert!(matches!(err, RenderError::IncludeDepth { limit: 4, .. }));
    }

    #[test]
    fn test_missing_include_is_fatal() {
        let store = MemoryStore::new().with("main", "{% include \"nope\" %}");
        let evaluator = Evaluator::new();
        let err = Renderer::new(&store, &evaluator, 16)
            .render_template("main", Context::new(), 0)
            .unwrap_err();
        assert!(matches!(err, RenderError::Store(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_map_iteration_yields_keys_in_order() {
        let mut ctx = Context::new();
        let mut map = std::collections::BTreeMap::new();
        map.insert("b".to_string(), Value::from(2.0));
        map.insert("a".to_string(), Value::from(1.0));
        ctx.set("m", Value::Map(map));
        assert_eq!(
            render("{% for k in m %}{{ k }}{% end for %}", ctx),
            "ab"
        );
    }
}
