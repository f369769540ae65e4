use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

pub mod builtins;

/// Failure reported by a filter body. The caller attaches the location.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FilterError(pub String);

impl FilterError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A named transform applied by `value|name[:param]`.
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError>;
}

/// Adapts a closure to [`Filter`].
pub struct FnFilter<F> {
    name: &'static str,
    f: F,
}

impl<F> FnFilter<F>
where
    F: Fn(&Value, Option<&Value>) -> Result<Value, FilterError> + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Value, Option<&Value>) -> Result<Value, FilterError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        (self.f)(input, param)
    }
}

/// Thread-safe filter registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Filter>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        use builtins::*;

        let mut map: HashMap<&'static str, Arc<dyn Filter>> = HashMap::new();
        let all: Vec<Arc<dyn Filter>> = vec![
            Arc::new(Escape),
            Arc::new(Safe),
            Arc::new(WordWrap),
            Arc::new(Upper),
            Arc::new(Lower),
            Arc::new(Title),
            Arc::new(CapFirst),
            Arc::new(Length),
            Arc::new(DefaultValue),
            Arc::new(DefaultIfNone),
            Arc::new(Join),
            Arc::new(First),
            Arc::new(Last),
            Arc::new(Add),
            Arc::new(Cut),
            Arc::new(TruncateChars),
            Arc::new(WordCount),
            Arc::new(LinebreaksBr),
        ];
        for f in all {
            map.insert(f.name(), f);
        }
        map.insert("e", Arc::new(Escape));
        Self {
            inner: Arc::new(map),
        }
    }

    /// Adds or replaces a filter.
    pub fn register<F: Filter + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.inner.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("filters", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtins_and_alias() {
        let reg = Registry::with_builtins();
        assert!(reg.contains("escape"));
        assert_eq!(reg.get("e").map(|f| f.name()), Some("escape"));
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn register_closure_filter() {
        let mut reg = Registry::new();
        reg.register(FnFilter::new("double", |v: &Value, _: Option<&Value>| {
            Ok(Value::new(v.integer() * 2))
        }));
        let out = reg.get("double").unwrap().call(&Value::new(21), None).unwrap();
        assert_eq!(out.to_string(), "42");
    }
}
