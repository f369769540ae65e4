use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex::Regex;

use crate::errors::ErrorKind;
use crate::value::HostValue;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("identifier pattern"));

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn is_valid_identifier(key: &str) -> bool {
    IDENTIFIER_RE.is_match(key)
}

/// Named-value scope visible to template expressions.
///
/// Reads take a shared lock and writes an exclusive one, so a single
/// Context can back many concurrent renders. Keys are only validated when a
/// Context is attached to a render (see [`Context::check_identifiers`]).
pub struct Context {
    // Lock-ordering key for `update`.
    id: u64,
    entries: RwLock<HashMap<String, HostValue>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<HostValue>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Like [`Context::set`] but rejects keys that are not identifiers.
    pub fn try_set(
        &self,
        key: impl Into<String>,
        value: impl Into<HostValue>,
    ) -> Result<(), ErrorKind> {
        let key = key.into();
        if !is_valid_identifier(&key) {
            return Err(ErrorKind::InvalidIdentifier(key));
        }
        self.set(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<HostValue> {
        self.entries.write().remove(key)
    }

    /// Copies every entry of `other` into `self`, overwriting on collision.
    ///
    /// Locks are always taken lowest id first, so two contexts merging into
    /// each other from different threads cannot deadlock.
    pub fn update(&self, other: &Context) -> &Self {
        if self.id == other.id {
            return self;
        }
        if self.id < other.id {
            let mut dst = self.entries.write();
            let src = other.entries.read();
            merge(&mut dst, &src);
        } else {
            let src = other.entries.read();
            let mut dst = self.entries.write();
            merge(&mut dst, &src);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Point-in-time copy of all entries.
    pub fn entries(&self) -> HashMap<String, HostValue> {
        self.entries.read().clone()
    }

    /// Independent copy: later writes to either side stay invisible to the other.
    pub fn snapshot(&self) -> Context {
        let copy = Context::new();
        *copy.entries.write() = self.entries();
        copy
    }

    pub fn check_identifiers(&self) -> Result<(), ErrorKind> {
        let entries = self.entries.read();
        match entries.keys().find(|k| !is_valid_identifier(k)) {
            Some(bad) => Err(ErrorKind::InvalidIdentifier(bad.clone())),
            None => Ok(()),
        }
    }

    /// Builds a context from a JSON object.
    pub fn from_json(json: serde_json::Value) -> Result<Context, ErrorKind> {
        match json {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(ErrorKind::Syntax(format!(
                "context must be a JSON object, got {other}"
            ))),
        }
    }
}

fn merge(dst: &mut HashMap<String, HostValue>, src: &HashMap<String, HostValue>) {
    for (k, v) in src {
        dst.insert(k.clone(), v.clone());
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("entries", &*self.entries.read())
            .finish()
    }
}

impl<K: Into<String>, V: Into<HostValue>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let ctx = Context::new();
        {
            let mut entries = ctx.entries.write();
            for (k, v) in iter {
                entries.insert(k.into(), v.into());
            }
        }
        ctx
    }
}
