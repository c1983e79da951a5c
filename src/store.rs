//! Template stores: supply raw template text by name
//!
//! The engine core never touches storage directly; `Include` and the
//! entry point go through [`TemplateStore`]. `DirStore` reads files under
//! a base directory and owns source-text cleanup (smart-quote
//! normalization), `MemoryStore` backs tests and embedded use.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("template not found: {name}")]
    NotFound { name: String },

    #[error("error reading template {name}: {message}")]
    Io { name: String, message: String },
}

/// Supplies raw template text by name.
pub trait TemplateStore {
    fn load(&self, name: &str) -> Result<String, StoreError>;
}

/// Store backed by files under a base directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    base: PathBuf,
}

impl DirStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &PathBuf {
        &self.base
    }
}

impl TemplateStore for DirStore {
    fn load(&self, name: &str) -> Result<String, StoreError> {
        let path = self.base.join(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(normalize_quotes(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(StoreError::Io {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Replace typographic double quotes with plain ones so templates edited
/// in word processors still parse.
fn normalize_quotes(text: &str) -> String {
    text.replace('\u{201c}', "\"").replace('\u{201d}', "\"")
}

/// In-memory store keyed by template name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    templates: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl TemplateStore for MemoryStore {
    fn load(&self, name: &str) -> Result<String, StoreError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }
}
