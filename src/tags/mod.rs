//! Block tags (`{% name args %}`).
//!
//! A tag is registered as a parser function. It receives the document parser
//! (to consume a body up to its end tag), the `{%` token and a sub-parser
//! over its own argument tokens, and returns the node to execute.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::lexer::Token;
use crate::nodes::Node;
use crate::parser::Parser;

pub mod comment;
pub mod erroronmissingval;
pub mod lorem;

pub type TagParser = fn(&mut Parser<'_>, &Token, &mut Parser<'_>) -> Result<Box<dyn Node>>;

/// Thread-safe tag registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<String, TagParser>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut map: HashMap<String, TagParser> = HashMap::new();
        map.insert("comment".into(), comment::parse);
        map.insert("lorem".into(), lorem::parse);
        map.insert("erroronmissingval".into(), erroronmissingval::parse);
        Self {
            inner: Arc::new(map),
        }
    }

    /// Adds or replaces a tag.
    pub fn register(&mut self, name: impl Into<String>, parser: TagParser) {
        Arc::make_mut(&mut self.inner).insert(name.into(), parser);
    }

    pub fn get(&self, name: &str) -> Option<TagParser> {
        self.inner.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.inner.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("tags", &names).finish()
    }
}
