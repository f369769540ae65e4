use itertools::Itertools;

use super::{Filter, FilterError};
use crate::value::{HostValue, Value};

/// HTML-escapes `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn required<'a>(name: &str, param: Option<&'a Value>) -> Result<&'a Value, FilterError> {
    param.ok_or_else(|| FilterError::new(format!("{name} requires a parameter")))
}

fn map_text(input: &Value, f: impl FnOnce(&str) -> String) -> Value {
    Value {
        host: HostValue::Str(f(&input.to_string())),
        safe: input.is_safe(),
    }
}

pub struct Escape;
impl Filter for Escape {
    fn name(&self) -> &'static str {
        "escape"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        if input.is_safe() {
            return Ok(input.clone());
        }
        Ok(Value::safe(escape_html(&input.to_string())))
    }
}

pub struct Safe;
impl Filter for Safe {
    fn name(&self) -> &'static str {
        "safe"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(input.clone().mark_safe())
    }
}

/// `wordwrap:N` puts N words on each line.
pub struct WordWrap;
impl Filter for WordWrap {
    fn name(&self) -> &'static str {
        "wordwrap"
    }
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        let wrap_at = required(self.name(), param)?.integer();
        if wrap_at <= 0 {
            return Ok(input.clone());
        }
        Ok(map_text(input, |s| {
            s.split_whitespace()
                .chunks(wrap_at as usize)
                .into_iter()
                .map(|mut line| line.join(" "))
                .join("\n")
        }))
    }
}

pub struct Upper;
impl Filter for Upper {
    fn name(&self) -> &'static str {
        "upper"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(map_text(input, str::to_uppercase))
    }
}

pub struct Lower;
impl Filter for Lower {
    fn name(&self) -> &'static str {
        "lower"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(map_text(input, str::to_lowercase))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub struct Title;
impl Filter for Title {
    fn name(&self) -> &'static str {
        "title"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(map_text(input, |s| s.split(' ').map(capitalize).join(" ")))
    }
}

pub struct CapFirst;
impl Filter for CapFirst {
    fn name(&self) -> &'static str {
        "capfirst"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(map_text(input, |s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }))
    }
}

pub struct Length;
impl Filter for Length {
    fn name(&self) -> &'static str {
        "length"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(Value::new(input.len()))
    }
}

/// `default:x` replaces any falsy input.
pub struct DefaultValue;
impl Filter for DefaultValue {
    fn name(&self) -> &'static str {
        "default"
    }
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        let fallback = required(self.name(), param)?;
        Ok(if input.is_true() { input } else { fallback }.clone())
    }
}

/// `default_if_none:x` replaces only nil.
pub struct DefaultIfNone;
impl Filter for DefaultIfNone {
    fn name(&self) -> &'static str {
        "default_if_none"
    }
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        let fallback = required(self.name(), param)?;
        Ok(if input.is_nil() { fallback } else { input }.clone())
    }
}

pub struct Join;
impl Filter for Join {
    fn name(&self) -> &'static str {
        "join"
    }
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        let sep = param.map(Value::to_string).unwrap_or_default();
        let joined = match input.host() {
            HostValue::List(items) => items.iter().map(HostValue::to_text).join(&sep),
            HostValue::Str(s) => s.chars().join(&sep),
            _ => return Ok(input.clone()),
        };
        Ok(Value::new(joined))
    }
}

fn nth_item(input: &Value, from_end: bool) -> Value {
    let item = match input.host() {
        HostValue::List(items) => {
            let item = if from_end { items.last() } else { items.first() };
            item.cloned()
        }
        HostValue::Str(s) => {
            let c = if from_end { s.chars().last() } else { s.chars().next() };
            c.map(|c| HostValue::Str(c.to_string()))
        }
        _ => None,
    };
    item.map(Value::new).unwrap_or_default()
}

pub struct First;
impl Filter for First {
    fn name(&self) -> &'static str {
        "first"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(nth_item(input, false))
    }
}

pub struct Last;
impl Filter for Last {
    fn name(&self) -> &'static str {
        "last"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(nth_item(input, true))
    }
}

/// Numeric addition when both sides are numbers, concatenation otherwise.
pub struct Add;
impl Filter for Add {
    fn name(&self) -> &'static str {
        "add"
    }
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        let rhs = required(self.name(), param)?;
        if input.is_integer() && rhs.is_integer() {
            return input
                .integer()
                .checked_add(rhs.integer())
                .map(Value::new)
                .ok_or_else(|| FilterError::new("integer overflow"));
        }
        if input.is_number() && rhs.is_number() {
            return Ok(Value::new(input.float() + rhs.float()));
        }
        Ok(Value::new(format!("{input}{rhs}")))
    }
}

pub struct Cut;
impl Filter for Cut {
    fn name(&self) -> &'static str {
        "cut"
    }
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        let needle = required(self.name(), param)?.to_string();
        Ok(map_text(input, |s| s.replace(&needle, "")))
    }
}

/// `truncatechars:N`; the result including the `...` is at most N chars.
pub struct TruncateChars;
impl Filter for TruncateChars {
    fn name(&self) -> &'static str {
        "truncatechars"
    }
    fn call(&self, input: &Value, param: Option<&Value>) -> Result<Value, FilterError> {
        let max = usize::try_from(required(self.name(), param)?.integer()).unwrap_or(0);
        let s = input.to_string();
        if s.chars().count() <= max {
            return Ok(Value::new(s));
        }
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        Ok(Value::new(format!("{kept}...")))
    }
}

pub struct WordCount;
impl Filter for WordCount {
    fn name(&self) -> &'static str {
        "wordcount"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        Ok(Value::new(input.to_string().split_whitespace().count()))
    }
}

/// Escapes untrusted input, then turns newlines into `<br />`.
pub struct LinebreaksBr;
impl Filter for LinebreaksBr {
    fn name(&self) -> &'static str {
        "linebreaksbr"
    }
    fn call(&self, input: &Value, _: Option<&Value>) -> Result<Value, FilterError> {
        let text = input.to_string();
        let text = if input.is_safe() { text } else { escape_html(&text) };
        Ok(Value::safe(text.replace("\r\n", "\n").replace('\n', "<br />")))
    }
}
