//! Walks an access path (`user.addresses[0].city`, `f(1, x=2)`) against a
//! [`Frame`].
//!
//! Absence is soft: an index past the end, a map key of the wrong type or a
//! missing field produce nil. Asking a value for something it cannot do at
//! all (indexing an int, calling a string) is a hard error naming the
//! dynamic type and the full path.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use tracing::trace;

use crate::errors::{Error, ErrorKind, Result};
use crate::expression::Expr;
use crate::frame::Frame;
use crate::function::{Call, Function, Returned};
use crate::lexer::Token;
use crate::value::{HostValue, Value, ATTR_GETTER};

/// One call argument; `name` is set for `name=expr`.
#[derive(Debug)]
pub struct CallArg {
    pub name: Option<String>,
    pub expr: Expr,
}

#[derive(Debug)]
pub enum StepKind {
    /// `.0`
    Index(i64),
    /// `.name`
    Ident(String),
    /// `.@name`, always a call of the generic attribute getter.
    Attr(String),
    /// `[expr]`
    Subscript(Box<Expr>),
    /// One element of an array literal `[a, b]`.
    ArrayItem(Box<Expr>),
    /// `.nil`
    Nil,
}

#[derive(Debug)]
pub struct Step {
    pub kind: StepKind,
    /// Set when the step is followed by `(args)`.
    pub call: Option<Vec<CallArg>>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        let call = matches!(kind, StepKind::Attr(_)).then(Vec::new);
        Self { kind, call }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StepKind::Index(i) => write!(f, "{i}"),
            StepKind::Ident(s) => f.write_str(s),
            StepKind::Attr(s) => write!(f, "@{s}"),
            StepKind::Subscript(_) => f.write_str("[subscript]"),
            StepKind::ArrayItem(_) => f.write_str("[array]"),
            StepKind::Nil => f.write_str("nil"),
        }
    }
}

/// An ordered access path.
#[derive(Debug)]
pub struct Resolver {
    pub(crate) token: Token,
    pub(crate) steps: Vec<Step>,
}

impl fmt::Display for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.steps.iter().join("."))
    }
}

impl Resolver {
    pub fn new(token: Token, steps: Vec<Step>) -> Self {
        Self { token, steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn evaluate(&self, frame: &Frame) -> Result<Value> {
        trace!(path = %self, "resolving");
        self.resolve(frame)
    }

    fn fail(&self, frame: &Frame, kind: ErrorKind) -> Error {
        frame.error(kind, Some(&self.token))
    }

    fn missing(&self, frame: &Frame) -> Result<Value> {
        if frame.allow_missing {
            Ok(Value::nil())
        } else {
            Err(self.fail(
                frame,
                ErrorKind::NoValueFound {
                    path: self.to_string(),
                },
            ))
        }
    }

    fn resolve(&self, frame: &Frame) -> Result<Value> {
        if self.steps.is_empty() || matches!(self.steps[0].kind, StepKind::ArrayItem(_)) {
            return self.resolve_array(frame);
        }

        let mut current = HostValue::Nil;
        let mut safe = false;

        for (idx, step) in self.steps.iter().enumerate() {
            let mut present = false;
            let mut attr_call = false;

            if idx == 0 {
                let StepKind::Ident(name) = &step.kind else {
                    return Err(self.fail(
                        frame,
                        ErrorKind::Syntax(format!("'{self}' must start with an identifier")),
                    ));
                };
                if let Some(v) = frame.lookup(name) {
                    current = v;
                    present = true;
                }
            } else {
                // Methods are looked up before dereferencing so reference
                // receivers keep their methods.
                let mut is_method = false;
                let method_name = match &step.kind {
                    StepKind::Ident(name) => Some(name.as_str()),
                    StepKind::Attr(_) => Some(ATTR_GETTER),
                    _ => None,
                };
                if let Some(name) = method_name {
                    if let Some(m) = current.method(name) {
                        current = HostValue::Function(m);
                        present = true;
                        is_method = true;
                        attr_call = matches!(step.kind, StepKind::Attr(_));
                    } else if matches!(step.kind, StepKind::Attr(_)) {
                        return Err(self.fail(
                            frame,
                            ErrorKind::NotCallable {
                                path: self.to_string(),
                                found: format!(
                                    "{} without method {ATTR_GETTER}",
                                    current.type_name()
                                ),
                            },
                        ));
                    }
                }

                if !is_method {
                    loop {
                        match current {
                            HostValue::Ref(Some(inner)) => current = HostValue::clone(&inner),
                            HostValue::Ref(None) => return Ok(Value::nil()),
                            HostValue::Value(boxed) => {
                                safe = boxed.safe;
                                current = boxed.host;
                            }
                            other => {
                                current = other;
                                break;
                            }
                        }
                    }

                    match self.apply_step(frame, step, &current)? {
                        StepOutcome::Found(v) => {
                            current = v;
                            present = true;
                        }
                        StepOutcome::Getter(m) => {
                            current = HostValue::Function(m);
                            present = true;
                            attr_call = true;
                        }
                        StepOutcome::Absent => current = HostValue::Nil,
                        StepOutcome::SoftNil => return Ok(Value::nil()),
                    }
                }
            }

            if current.is_nil() {
                return if present {
                    Ok(Value::nil())
                } else {
                    self.missing(frame)
                };
            }

            if let HostValue::Value(boxed) = current {
                safe = boxed.safe;
                current = boxed.host;
            }

            if step.call.is_some() || matches!(current, HostValue::Function(_)) {
                let func = match current {
                    HostValue::Function(f) => f,
                    other => match other.method(ATTR_GETTER) {
                        Some(getter) => {
                            attr_call = true;
                            getter
                        }
                        None => {
                            return Err(self.fail(
                                frame,
                                ErrorKind::NotCallable {
                                    path: self.to_string(),
                                    found: other.type_name(),
                                },
                            ))
                        }
                    },
                };
                let attr_name = attr_call.then(|| step_name(step)).flatten();
                current = match self.invoke(frame, step, &func, attr_name)? {
                    Returned::Native(v) => v,
                    Returned::Wrapped(v) => {
                        safe = v.safe;
                        v.host
                    }
                };
                if let HostValue::Value(boxed) = current {
                    safe = boxed.safe;
                    current = boxed.host;
                }
                if current.is_nil() {
                    return Ok(Value::nil());
                }
            }
        }

        Ok(Value {
            safe: referenced_trust(&current).unwrap_or(safe),
            host: current,
        })
    }

    fn resolve_array(&self, frame: &Frame) -> Result<Value> {
        let mut items = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            match &step.kind {
                StepKind::ArrayItem(expr) => items.push(HostValue::from(expr.evaluate(frame)?)),
                _ => {
                    return Err(self.fail(
                        frame,
                        ErrorKind::Syntax("mixed array literal and variable parts".into()),
                    ))
                }
            }
        }
        Ok(Value::safe(HostValue::List(items)))
    }

    fn apply_step(&self, frame: &Frame, step: &Step, current: &HostValue) -> Result<StepOutcome> {
        let outcome = match &step.kind {
            StepKind::Index(i) => match current {
                HostValue::Str(_) | HostValue::List(_) => index_into(current, *i),
                other => return Err(self.not_indexable(frame, other)),
            },
            StepKind::Ident(name) => match current {
                HostValue::Object(obj) => match obj.field(name) {
                    Some(v) => StepOutcome::Found(v),
                    None => match obj.method(ATTR_GETTER) {
                        Some(getter) => StepOutcome::Getter(getter),
                        None => StepOutcome::Absent,
                    },
                },
                HostValue::Map(map) => match map.get_str(name) {
                    Some(v) => StepOutcome::Found(v.clone()),
                    None => StepOutcome::Absent,
                },
                other => {
                    return Err(self.fail(
                        frame,
                        ErrorKind::TypeMismatch {
                            path: self.to_string(),
                            message: format!(
                                "can't access a field by name on type {}",
                                other.type_name()
                            ),
                        },
                    ))
                }
            },
            StepKind::Subscript(expr) => match current {
                HostValue::Str(_) | HostValue::List(_) => {
                    let key = expr.evaluate(frame)?;
                    index_into(current, key.integer())
                }
                HostValue::Object(obj) => {
                    let key = expr.evaluate(frame)?;
                    StepOutcome::Found(obj.field(&key.to_string()).unwrap_or_default())
                }
                HostValue::Map(map) => {
                    let key = expr.evaluate(frame)?;
                    if key.is_nil() {
                        return Ok(StepOutcome::SoftNil);
                    }
                    match map.lookup(key.host()) {
                        Some(entry) => StepOutcome::Found(entry.cloned().unwrap_or_default()),
                        None => StepOutcome::SoftNil,
                    }
                }
                other => return Err(self.not_indexable(frame, other)),
            },
            StepKind::Nil => StepOutcome::Found(HostValue::Nil),
            // Handled as a method call before any step is applied.
            StepKind::Attr(_) => StepOutcome::Absent,
            StepKind::ArrayItem(_) => {
                return Err(self.fail(
                    frame,
                    ErrorKind::Syntax("array item inside a variable path".into()),
                ))
            }
        };
        Ok(outcome)
    }

    fn not_indexable(&self, frame: &Frame, value: &HostValue) -> Error {
        self.fail(
            frame,
            ErrorKind::TypeMismatch {
                path: self.to_string(),
                message: format!("can't access an index on type {}", value.type_name()),
            },
        )
    }

    /// Adapts a template call to `func`'s declared signature and runs it.
    fn invoke(
        &self,
        frame: &Frame,
        step: &Step,
        func: &Function,
        attr_name: Option<&str>,
    ) -> Result<Returned> {
        let sig = func.signature();
        let args: &[CallArg] = step.call.as_deref().unwrap_or(&[]);

        let mut seen_keyword = false;
        for arg in args {
            if arg.name.is_some() {
                seen_keyword = true;
            } else if seen_keyword {
                return Err(self.fail(
                    frame,
                    ErrorKind::ArgumentOrderError {
                        path: self.to_string(),
                    },
                ));
            }
        }

        let mut positional = Vec::with_capacity(args.len() + 1);
        if let Some(name) = attr_name {
            positional.push(Value::new(name));
        }
        let injected = positional.len();
        let mut kwargs = BTreeMap::new();
        for arg in args {
            let value = arg.expr.evaluate(frame)?;
            match &arg.name {
                Some(name) if !sig.takes_kwargs => {
                    return Err(self.fail(
                        frame,
                        ErrorKind::TypeMismatch {
                            path: self.to_string(),
                            message: format!(
                                "keyword argument '{name}' passed to a function that takes none"
                            ),
                        },
                    ))
                }
                Some(name) => {
                    kwargs.insert(name.clone(), value);
                }
                None => positional.push(value),
            }
        }

        let declared = sig.params.len();
        let given = positional.len();
        if given != declared && !(sig.is_variadic() && given + 1 >= declared) {
            return Err(self.fail(
                frame,
                ErrorKind::ArityMismatch {
                    path: self.to_string(),
                    expected: declared,
                    given: given - injected,
                },
            ));
        }

        for (slot, value) in positional.iter().enumerate().skip(injected) {
            let Some(ty) = sig.param_at(slot) else {
                continue;
            };
            if !ty.accepts(value) {
                return Err(self.fail(
                    frame,
                    ErrorKind::TypeMismatch {
                        path: self.to_string(),
                        message: format!(
                            "function input argument {} must be of type {ty} or Value (not {})",
                            slot - injected,
                            value.host().type_name()
                        ),
                    },
                ));
            }
        }

        let call = Call {
            frame: sig.takes_frame.then_some(frame),
            kwargs: sig.takes_kwargs.then_some(kwargs),
            args: positional,
        };
        func.invoke(call)
            .map_err(|e| self.fail(frame, ErrorKind::HostError(e)))
    }
}

enum StepOutcome {
    Found(HostValue),
    /// Not present, but the value has a generic attribute getter.
    Getter(Function),
    Absent,
    /// Resolution stops here with nil, successfully.
    SoftNil,
}

fn index_into(current: &HostValue, i: i64) -> StepOutcome {
    let Ok(i) = usize::try_from(i) else {
        return StepOutcome::SoftNil;
    };
    let item = match current {
        HostValue::Str(s) => s.chars().nth(i).map(|c| HostValue::Str(c.to_string())),
        HostValue::List(items) => items.get(i).cloned(),
        _ => None,
    };
    match item {
        Some(v) => StepOutcome::Found(v),
        None => StepOutcome::SoftNil,
    }
}

fn step_name(step: &Step) -> Option<&str> {
    match &step.kind {
        StepKind::Ident(s) | StepKind::Attr(s) => Some(s),
        _ => None,
    }
}

/// Trust flag of a boxed [`Value`] at the end of a reference chain.
fn referenced_trust(value: &HostValue) -> Option<bool> {
    match value {
        HostValue::Ref(Some(target)) => match &**target {
            HostValue::Value(boxed) => Some(boxed.safe),
            other => referenced_trust(other),
        },
        _ => None,
    }
}
