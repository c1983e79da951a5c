//! Variable context threaded through rendering
//!
//! A `Context` is the name→value scope visible to expression evaluation.
//! Sequential siblings in a template share one context object (so `let`
//! bindings flow forward), while each for-iteration and each include
//! renders against an isolated clone. `Clone` is that isolation boundary:
//! values are owned trees, so a clone is a deep, independent copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Ordered mapping from variable name to [`Value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    vars: BTreeMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Bind a variable, replacing any existing binding.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Remove a binding, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Deserialize a context from a TOML document; top-level keys become
    /// variables. Used by the CLI's `--context` flag.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut ctx = Context::new();
        ctx.set("name", "world");
        assert_eq!(ctx.get("name"), Some(&Value::from("world")));
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut original = Context::new();
        original.set("x", 1);
        let mut copy = original.clone();
        copy.set("x", 2);
        copy.set("y", 3);
        assert_eq!(original.get("x"), Some(&Value::from(1)));
        assert!(original.get("y").is_none());
    }

    #[test]
    fn test_from_toml() {
        let ctx = Context::from_toml_str(
            r#"
            title = "Inventory"
            count = 3
            items = ["a", "b"]

            [owner]
            name = "sam"
            "#,
        )
        .unwrap();
        assert_eq!(ctx.get("title"), Some(&Value::from("Inventory")));
        assert_eq!(ctx.get("count"), Some(&Value::from(3)));
        assert_eq!(
            ctx.get("items"),
            Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        assert!(matches!(ctx.get("owner"), Some(Value::Map(_))));
    }
}
