//! Weft - a text template engine with control tags and scoped contexts
//!
//! This library provides a classifier, parser, and renderer for a small
//! template language: `{{ expr }}` interpolation with HTML escaping,
//! `{% safe %}` raw output, `{% let %}` bindings, `{% if %}`/`{% for %}`
//! blocks, `{% include %}` with arguments, and `{% comment %}` blocks.
//!
//! # Example
//!
//! ```rust
//! use weft::{Context, Engine, MemoryStore};
//!
//! let store = MemoryStore::new().with("hello", "Hello, {{ name }}!");
//! let engine = Engine::new(store);
//!
//! let mut ctx = Context::new();
//! ctx.set("name", "world");
//! assert_eq!(engine.render("hello", &ctx).unwrap(), "Hello, world!");
//! ```

pub mod context;
pub mod error;
pub mod expr;
pub mod parser;
pub mod render;
pub mod store;
pub mod value;

pub use context::Context;
pub use error::ParseError;
pub use expr::{EvalError, Evaluator, ExpressionEvaluator};
pub use parser::{parse, Node};
pub use render::{escape_html, RenderError, Renderer};
pub use store::{DirStore, MemoryStore, StoreError, TemplateStore};
pub use value::Value;

/// Default number of nested includes allowed before a render aborts
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;

/// Facade that ties a template store to an evaluator. Each render gets
/// its own copy of the caller's context, so engines are reusable.
pub struct Engine {
    store: Box<dyn TemplateStore>,
    evaluator: Box<dyn ExpressionEvaluator>,
    max_include_depth: usize,
}

impl Engine {
    pub fn new(store: impl TemplateStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            evaluator: Box::new(Evaluator::new()),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Render a named template from the store
    pub fn render(&self, name: &str, context: &Context) -> Result<String, RenderError> {
        self.renderer().render_template(name, context.clone(), 0)
    }

    /// Render template source directly, with the store still available
    /// for any includes it contains
    pub fn render_str(&self, source: &str, context: &Context) -> Result<String, RenderError> {
        let tree = parse(source)?;
        self.renderer().render_tree(&tree, context.clone(), 0)
    }

    fn renderer(&self) -> Renderer<'_> {
        Renderer::new(
            self.store.as_ref(),
            self.evaluator.as_ref(),
            self.max_include_depth,
        )
    }
}
