use std::fmt;

use thiserror::Error;

use crate::lexer::Token;

/// Boxed error returned by host functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What went wrong, independent of where it happened.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("context-key '{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    #[error("no value found for {path}")]
    NoValueFound { path: String },

    #[error("'{path}' is not a function (it is {found})")]
    NotCallable { path: String, found: String },

    #[error("calling '{path}' using a positional argument after a keyword argument")]
    ArgumentOrderError { path: String },

    #[error(
        "function input argument count ({expected}) of '{path}' must be equal to the calling argument count ({given})"
    )]
    ArityMismatch {
        path: String,
        expected: usize,
        given: usize,
    },

    #[error("{message} (variable {path})")]
    TypeMismatch { path: String, message: String },

    #[error("usage of {what} '{name}' is not allowed (sandbox restriction active)")]
    SandboxViolation { what: &'static str, name: String },

    #[error("{0}")]
    HostError(#[source] BoxError),

    #[error("filter '{name}' failed: {message}")]
    Filter { name: String, message: String },

    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    Tag(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("write error: {0}")]
    WriteError(#[from] std::io::Error),
}

/// An [`ErrorKind`] plus the location it was raised at.
#[derive(Debug)]
pub struct Error {
    pub template: Option<String>,
    pub line: usize,
    pub column: usize,
    pub token: Option<Token>,
    pub sender: String,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            template: None,
            line: 0,
            column: 0,
            token: None,
            sender: String::new(),
            kind,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    /// Takes line, column and token text from `token`.
    pub fn at(mut self, token: Option<&Token>) -> Self {
        if let Some(t) = token {
            self.line = t.line;
            self.column = t.col;
            self.token = Some(t.clone());
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[Error")?;
        if !self.sender.is_empty() {
            write!(f, " (where: {})", self.sender)?;
        }
        if let Some(name) = &self.template {
            write!(f, " in {name}")?;
        }
        if self.line > 0 {
            write!(f, " | Line {} Col {}", self.line, self.column)?;
            if let Some(t) = &self.token {
                write!(f, " near '{}'", t.val)?;
            }
        }
        write!(f, "] {}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_includes_location_when_known() {
        let token = Token {
            kind: TokenKind::Identifier,
            val: "user".into(),
            line: 3,
            col: 7,
            trim: false,
        };
        let err = Error::new(ErrorKind::NoValueFound { path: "user.name".into() })
            .with_sender("execution")
            .with_template("index.html")
            .at(Some(&token));
        assert_eq!(
            err.to_string(),
            "[Error (where: execution) in index.html | Line 3 Col 7 near 'user'] no value found for user.name"
        );
    }

    #[test]
    fn display_without_location() {
        let err = Error::new(ErrorKind::InvalidIdentifier("a-b".into()));
        assert_eq!(
            err.to_string(),
            "[Error] context-key 'a-b' is not a valid identifier"
        );
    }
}
