//! A Django-style template engine.
//!
//! Templates are compiled against a [`TemplateSet`] and rendered with a
//! [`Context`]. Expressions resolve dotted, indexed and called paths over
//! [`HostValue`]s; filters transform the result; untrusted string output is
//! HTML-escaped unless marked safe.

pub mod context;
pub mod engine;
pub mod errors;
pub mod expression;
pub mod filters;
pub mod frame;
pub mod function;
pub mod lexer;
pub mod nodes;
pub mod parser;
pub mod resolver;
pub mod tags;
pub mod value;
mod comparison;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use context::Context;
pub use engine::{Config, Template, TemplateSet};
pub use errors::{Error, ErrorKind, Result};
pub use frame::Frame;
pub use function::{Call, Function, ParamType, Returned, Signature};
pub use value::{HostValue, KeyKind, Mapping, Object, Value};

/// Compiles `src` against a fresh default set.
pub fn from_string(src: &str) -> Result<Template> {
    Arc::new(TemplateSet::default()).from_string(src)
}
