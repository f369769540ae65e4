//! Host functions callable from templates.
//!
//! A [`Function`] pairs a body with a declared [`Signature`]. The resolver
//! uses the signature to adapt a template call: it supplies the frame and
//! keyword-argument map when asked for, checks arity and argument types,
//! and unwraps the [`Returned`] result.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::BoxError;
use crate::frame::Frame;
use crate::value::{HostValue, Kind, Value};

/// Declared type of one positional parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// The uniform [`Value`] wrapper; accepts anything, trust flag included.
    Value,
    /// Interface satisfied by every value.
    Any,
    /// Interface satisfied by strings, lists and maps.
    Indexable,
    /// Exact dynamic type.
    Exact(Kind),
    /// An [`Object`](crate::Object) with this type name.
    Named(&'static str),
}

impl ParamType {
    pub fn accepts(&self, arg: &Value) -> bool {
        match self {
            ParamType::Value | ParamType::Any => true,
            ParamType::Indexable => matches!(arg.kind(), Kind::Str | Kind::List | Kind::Map),
            ParamType::Exact(kind) => arg.kind() == *kind,
            ParamType::Named(name) => {
                matches!(arg.host(), HostValue::Object(o) if o.type_name() == *name)
            }
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Value => f.write_str("Value"),
            ParamType::Any => f.write_str("any"),
            ParamType::Indexable => f.write_str("indexable"),
            ParamType::Exact(kind) => write!(f, "{kind}"),
            ParamType::Named(name) => f.write_str(name),
        }
    }
}

/// Parameter shape of a [`Function`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub(crate) takes_frame: bool,
    pub(crate) takes_kwargs: bool,
    pub(crate) params: Vec<ParamType>,
    pub(crate) variadic: bool,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current [`Frame`] is passed in [`Call::frame`]; not counted as an argument.
    pub fn with_frame(mut self) -> Self {
        self.takes_frame = true;
        self
    }

    /// Keyword arguments are collected into [`Call::kwargs`].
    pub fn with_kwargs(mut self) -> Self {
        self.takes_kwargs = true;
        self
    }

    pub fn param(mut self, ty: ParamType) -> Self {
        self.params.push(ty);
        self
    }

    /// The last declared parameter repeats; callers may also omit it.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic && !self.params.is_empty()
    }

    /// Declared type of positional slot `idx`.
    pub(crate) fn param_at(&self, idx: usize) -> Option<&ParamType> {
        if self.is_variadic() && idx + 1 >= self.params.len() {
            self.params.last()
        } else {
            self.params.get(idx)
        }
    }
}

/// Arguments handed to a function body.
pub struct Call<'a> {
    pub frame: Option<&'a Frame>,
    pub kwargs: Option<BTreeMap<String, Value>>,
    pub args: Vec<Value>,
}

impl Call<'_> {
    pub fn arg(&self, idx: usize) -> Value {
        self.args.get(idx).cloned().unwrap_or_default()
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.as_ref().and_then(|kw| kw.get(name))
    }
}

/// What a function body produced.
#[derive(Debug, Clone)]
pub enum Returned {
    /// Plain host data; the trust flag of the call site is left as is.
    Native(HostValue),
    /// A value carrying its own trust flag.
    Wrapped(Value),
}

impl Returned {
    pub fn native(v: impl Into<HostValue>) -> Self {
        Returned::Native(v.into())
    }
}

impl From<HostValue> for Returned {
    fn from(v: HostValue) -> Self {
        Returned::Native(v)
    }
}

impl From<Value> for Returned {
    fn from(v: Value) -> Self {
        Returned::Wrapped(v)
    }
}

type Body = dyn for<'a> Fn(Call<'a>) -> Result<Returned, BoxError> + Send + Sync;

#[derive(Clone)]
pub struct Function {
    signature: Signature,
    body: Arc<Body>,
}

impl Function {
    pub fn new<F>(signature: Signature, body: F) -> Self
    where
        F: for<'a> Fn(Call<'a>) -> Result<Returned, BoxError> + Send + Sync + 'static,
    {
        Self {
            signature,
            body: Arc::new(body),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn invoke(&self, call: Call<'_>) -> Result<Returned, BoxError> {
        (self.body)(call)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variadic_slots_reuse_last_type() {
        let sig = Signature::new()
            .param(ParamType::Exact(Kind::Str))
            .param(ParamType::Exact(Kind::Int))
            .variadic();
        assert_eq!(sig.param_at(0), Some(&ParamType::Exact(Kind::Str)));
        assert_eq!(sig.param_at(1), Some(&ParamType::Exact(Kind::Int)));
        assert_eq!(sig.param_at(5), Some(&ParamType::Exact(Kind::Int)));
    }

    #[test]
    fn fixed_slots_end() {
        let sig = Signature::new().param(ParamType::Any);
        assert_eq!(sig.param_at(1), None);
    }

    #[test]
    fn param_type_acceptance() {
        assert!(ParamType::Value.accepts(&Value::nil()));
        assert!(ParamType::Indexable.accepts(&Value::new("x")));
        assert!(!ParamType::Indexable.accepts(&Value::new(1)));
        assert!(ParamType::Exact(Kind::Int).accepts(&Value::new(1)));
        assert!(!ParamType::Exact(Kind::Int).accepts(&Value::new(1.5)));
    }
}
