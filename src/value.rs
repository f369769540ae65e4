//! Dynamic host values and the trust-carrying [`Value`] wrapper.
//!
//! Templates resolve paths against data whose shape is only known at run
//! time. Instead of reflection, every host value is one variant of
//! [`HostValue`]; record-like host types implement [`Object`] to expose
//! fields and methods by name.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use crate::comparison::{cmp_values, order_values};
use crate::function::Function;

/// Name of the method an [`Object`] exposes as its generic attribute getter.
pub const ATTR_GETTER: &str = "get_attr";

/// Record-like host type with named fields and methods.
///
/// `method` returns a bound [`Function`]; implementations usually capture a
/// clone of whatever state the method needs.
pub trait Object: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    fn field(&self, _name: &str) -> Option<HostValue> {
        None
    }

    fn method(&self, _name: &str) -> Option<Function> {
        None
    }

    fn to_text(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

/// Dynamic type tag of a [`HostValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Object,
    Function,
    Ref,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Nil => "nil",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Str => "string",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Object => "object",
            Kind::Function => "function",
            Kind::Ref => "ref",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Str,
    Int,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl MapKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            MapKey::Bool(_) => KeyKind::Bool,
            MapKey::Int(_) => KeyKind::Int,
            MapKey::Str(_) => KeyKind::Str,
        }
    }

    /// Key for `value` if its dynamic type is assignable to `kind`.
    fn from_host(value: &HostValue, kind: KeyKind) -> Option<MapKey> {
        match (value.unwrapped(), kind) {
            (HostValue::Str(s), KeyKind::Str) => Some(MapKey::Str(s.clone())),
            (HostValue::Int(i), KeyKind::Int) => Some(MapKey::Int(*i)),
            (HostValue::Bool(b), KeyKind::Bool) => Some(MapKey::Bool(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => f.write_str(bool_text(*b)),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::Str(s)
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

/// Mapping with a declared key type. Iteration order is the key order.
#[derive(Debug, Clone)]
pub struct Mapping {
    key_kind: KeyKind,
    entries: BTreeMap<MapKey, HostValue>,
}

impl Mapping {
    pub fn new(key_kind: KeyKind) -> Self {
        Self {
            key_kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn key_kind(&self) -> KeyKind {
        self.key_kind
    }

    /// Inserts unless the key's type differs from the declared key type.
    pub fn insert(&mut self, key: impl Into<MapKey>, value: impl Into<HostValue>) -> bool {
        let key = key.into();
        if key.kind() != self.key_kind {
            return false;
        }
        self.entries.insert(key, value.into());
        true
    }

    /// Looks up by a dynamic key. `None` when the key type is not assignable.
    pub fn lookup(&self, key: &HostValue) -> Option<Option<&HostValue>> {
        MapKey::from_host(key, self.key_kind).map(|k| self.entries.get(&k))
    }

    pub fn get_str(&self, key: &str) -> Option<&HostValue> {
        if self.key_kind != KeyKind::Str {
            return None;
        }
        self.entries.get(&MapKey::Str(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &HostValue)> {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<HostValue>> FromIterator<(K, V)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Mapping::new(KeyKind::Str);
        for (k, v) in iter {
            map.entries.insert(MapKey::Str(k.into()), v.into());
        }
        map
    }
}

static NIL: HostValue = HostValue::Nil;

/// A dynamically typed host value.
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<HostValue>),
    Map(Mapping),
    Object(Arc<dyn Object>),
    Function(Function),
    /// Optional indirection; `None` is an absent reference.
    Ref(Option<Arc<HostValue>>),
    /// A boxed [`Value`] carrying its own trust flag.
    Value(Box<Value>),
}

impl HostValue {
    pub fn object(obj: impl Object + 'static) -> Self {
        HostValue::Object(Arc::new(obj))
    }

    pub fn reference(target: Option<HostValue>) -> Self {
        HostValue::Ref(target.map(Arc::new))
    }

    /// Looks through boxed [`Value`]s and references; an absent reference
    /// is nil.
    pub fn unwrapped(&self) -> &HostValue {
        match self {
            HostValue::Value(v) => v.host.unwrapped(),
            HostValue::Ref(Some(target)) => target.unwrapped(),
            HostValue::Ref(None) => &NIL,
            other => other,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            HostValue::Nil => Kind::Nil,
            HostValue::Bool(_) => Kind::Bool,
            HostValue::Int(_) => Kind::Int,
            HostValue::Float(_) => Kind::Float,
            HostValue::Str(_) => Kind::Str,
            HostValue::List(_) => Kind::List,
            HostValue::Map(_) => Kind::Map,
            HostValue::Object(_) => Kind::Object,
            HostValue::Function(_) => Kind::Function,
            HostValue::Ref(_) => Kind::Ref,
            HostValue::Value(v) => v.host.kind(),
        }
    }

    /// Kind for error messages; objects report their own type name.
    pub fn type_name(&self) -> String {
        match self.unwrapped() {
            HostValue::Object(o) => o.type_name().to_string(),
            other => other.kind().to_string(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.unwrapped(), HostValue::Nil)
    }

    /// Method lookup. References expose the methods of their target.
    pub fn method(&self, name: &str) -> Option<Function> {
        match self {
            HostValue::Object(o) => o.method(name),
            HostValue::Ref(Some(target)) => target.method(name),
            HostValue::Value(v) => v.host.method(name),
            _ => None,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            HostValue::Nil => String::new(),
            HostValue::Bool(b) => bool_text(*b).to_string(),
            HostValue::Int(i) => i.to_string(),
            HostValue::Float(f) => float_text(*f),
            HostValue::Str(s) => s.clone(),
            HostValue::List(items) => items.iter().map(HostValue::to_text).join(", "),
            HostValue::Map(map) => format!(
                "{{{}}}",
                map.iter().map(|(k, v)| format!("{k}: {}", v.to_text())).join(", ")
            ),
            HostValue::Object(o) => o.to_text(),
            HostValue::Function(_) => "<function>".to_string(),
            HostValue::Ref(Some(target)) => target.to_text(),
            HostValue::Ref(None) => String::new(),
            HostValue::Value(v) => v.host.to_text(),
        }
    }
}

fn bool_text(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// Shortest text that round-trips; integral floats print without a fraction.
fn float_text(f: f64) -> String {
    format!("{f}")
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

macro_rules! host_from {
    ($($t:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(impl From<$t> for HostValue {
            fn from(v: $t) -> Self {
                HostValue::$variant(v as $conv)
            }
        })*
    };
}

host_from!(
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    usize => Int as i64,
    f32 => Float as f64,
    f64 => Float as f64,
);

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(HostValue::Nil)
    }
}

impl From<Mapping> for HostValue {
    fn from(map: Mapping) -> Self {
        HostValue::Map(map)
    }
}

impl<V: Into<HostValue>> From<BTreeMap<String, V>> for HostValue {
    fn from(map: BTreeMap<String, V>) -> Self {
        HostValue::Map(map.into_iter().collect())
    }
}

impl<V: Into<HostValue>> From<HashMap<String, V>> for HostValue {
    fn from(map: HashMap<String, V>) -> Self {
        HostValue::Map(map.into_iter().collect())
    }
}

impl From<Function> for HostValue {
    fn from(f: Function) -> Self {
        HostValue::Function(f)
    }
}

impl From<Arc<dyn Object>> for HostValue {
    fn from(o: Arc<dyn Object>) -> Self {
        HostValue::Object(o)
    }
}

impl From<Value> for HostValue {
    fn from(v: Value) -> Self {
        HostValue::Value(Box::new(v))
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => HostValue::Nil,
            Json::Bool(b) => HostValue::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => HostValue::Int(i),
                None => HostValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => HostValue::Str(s),
            Json::Array(items) => HostValue::List(items.into_iter().map(Into::into).collect()),
            Json::Object(map) => HostValue::Map(map.into_iter().collect()),
        }
    }
}

/// Result of evaluating an expression: a host value plus a trust flag.
///
/// A trusted ("safe") value is already sanitized and skips autoescaping.
/// During resolution the flag is recaptured from every boxed [`Value`] the
/// path passes through, so an untrusted inner value clears it again.
#[derive(Debug, Clone, Default)]
pub struct Value {
    pub(crate) host: HostValue,
    pub(crate) safe: bool,
}

impl Value {
    pub fn new(host: impl Into<HostValue>) -> Self {
        Self {
            host: host.into(),
            safe: false,
        }
    }

    pub fn safe(host: impl Into<HostValue>) -> Self {
        Self {
            host: host.into(),
            safe: true,
        }
    }

    pub fn nil() -> Self {
        Self::default()
    }

    pub fn host(&self) -> &HostValue {
        self.host.unwrapped()
    }

    pub fn into_host(self) -> HostValue {
        self.host
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn mark_safe(mut self) -> Self {
        self.safe = true;
        self
    }

    pub fn kind(&self) -> Kind {
        self.host.kind()
    }

    pub fn is_nil(&self) -> bool {
        self.host.is_nil()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.host(), HostValue::Str(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.host(), HostValue::Bool(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.host(), HostValue::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self.host(), HostValue::Float(_))
    }

    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.host() {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view: floats truncate, strings parse (0 on failure).
    pub fn integer(&self) -> i64 {
        match self.host() {
            HostValue::Int(i) => *i,
            HostValue::Float(f) => *f as i64,
            HostValue::Bool(b) => i64::from(*b),
            HostValue::Str(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn float(&self) -> f64 {
        match self.host() {
            HostValue::Int(i) => *i as f64,
            HostValue::Float(f) => *f,
            HostValue::Bool(b) => f64::from(u8::from(*b)),
            HostValue::Str(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn is_true(&self) -> bool {
        match self.host() {
            HostValue::Nil => false,
            HostValue::Bool(b) => *b,
            HostValue::Int(i) => *i != 0,
            HostValue::Float(f) => *f != 0.0,
            HostValue::Str(s) => !s.is_empty(),
            HostValue::List(items) => !items.is_empty(),
            HostValue::Map(map) => !map.is_empty(),
            HostValue::Object(_) | HostValue::Function(_) => true,
            // `host()` has already looked through these.
            HostValue::Ref(_) | HostValue::Value(_) => true,
        }
    }

    /// Length of strings (in chars), lists and maps; 0 otherwise.
    pub fn len(&self) -> usize {
        match self.host() {
            HostValue::Str(s) => s.chars().count(),
            HostValue::List(items) => items.len(),
            HostValue::Map(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Substring test for strings, membership for lists, key test for maps.
    pub fn contains(&self, other: &Value) -> bool {
        match self.host() {
            HostValue::Str(s) => s.contains(other.to_string().as_str()),
            HostValue::List(items) => items
                .iter()
                .any(|item| cmp_values(item, other.host(), Ordering::is_eq)),
            HostValue::Map(map) => matches!(map.lookup(other.host()), Some(Some(_))),
            _ => false,
        }
    }

    pub fn equal_value(&self, other: &Value) -> bool {
        cmp_values(self.host(), other.host(), Ordering::is_eq)
    }

    pub fn compare(&self, other: &Value) -> Ordering {
        order_values(self.host(), other.host())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host.to_text())
    }
}
