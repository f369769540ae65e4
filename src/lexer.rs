use std::fmt;

use crate::errors::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Html,
    Keyword,
    Identifier,
    String,
    Number,
    Symbol,
    Nil,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub val: String,
    pub line: usize,
    pub col: usize,
    /// Set on `{{-`/`{%-` and `-}}`/`-%}`: trim adjacent HTML whitespace.
    pub trim: bool,
}

impl Token {
    pub fn is(&self, kind: TokenKind, val: &str) -> bool {
        self.kind == kind && self.val == val
    }

    pub(crate) fn is_open_tag(&self) -> bool {
        self.kind == TokenKind::Symbol && (self.val == "{{" || self.val == "{%")
    }

    pub(crate) fn is_close_tag(&self) -> bool {
        self.kind == TokenKind::Symbol && (self.val == "}}" || self.val == "%}")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Token {:?} '{}' Line={} Col={}>", self.kind, self.val, self.line, self.col)
    }
}

pub const TOKEN_SPACE_CHARS: &[char] = &[' ', '\n', '\r', '\t'];

const KEYWORDS: &[&str] = &["true", "false", "in", "and", "or", "not", "as", "export"];

// Longest first.
const SYMBOLS: &[&str] = &[
    "{{", "}}", "{%", "%}", "==", "!=", "<=", ">=", "&&", "||", "(", ")", "[", "]", ",", ".",
    ":", "|", "=", "@", "+", "-", "*", "/", "%", "<", ">", "!",
];

/// Splits template source into HTML, tag delimiters and in-tag tokens.
pub fn lex(name: &str, src: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(name, src);
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    name: &'a str,
    s: &'a str,
    i: usize,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(name: &'a str, s: &'a str) -> Self {
        Self {
            name,
            s,
            i: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<()> {
        while !self.eof() {
            let (line, col) = (self.line, self.col);
            let html = self.capture_html();
            if !html.is_empty() {
                self.push(TokenKind::Html, html, line, col, false);
            }
            if self.eof() {
                break;
            }
            if self.peek_str("{#") {
                self.skip_comment()?;
            } else if self.peek_str("{{") {
                self.lex_tag("{{", "}}")?;
            } else {
                self.lex_tag("{%", "%}")?;
            }
        }
        Ok(())
    }

    fn capture_html(&mut self) -> String {
        let start = self.i;
        while !self.eof() && !(self.peek_str("{{") || self.peek_str("{%") || self.peek_str("{#")) {
            self.advance();
        }
        self.s[start..self.i].to_string()
    }

    fn skip_comment(&mut self) -> Result<()> {
        let (line, col) = (self.line, self.col);
        while !self.eof() {
            if self.peek_str("#}") {
                self.advance_n(2);
                return Ok(());
            }
            self.advance();
        }
        Err(self.error("unclosed comment", line, col))
    }

    fn lex_tag(&mut self, open: &str, close: &str) -> Result<()> {
        let (line, col) = (self.line, self.col);
        self.advance_n(open.len());
        let trim_open = self.consume_char('-');
        self.push(TokenKind::Symbol, open.to_string(), line, col, trim_open);

        loop {
            self.skip_ws();
            if self.eof() {
                return Err(self.error(&format!("'{close}' expected"), line, col));
            }
            let (tline, tcol) = (self.line, self.col);
            if self.peek_char() == Some('-') && self.s[self.i + 1..].starts_with(close) {
                self.advance_n(1 + close.len());
                self.push(TokenKind::Symbol, close.to_string(), tline, tcol, true);
                return Ok(());
            }
            if self.peek_str(close) {
                self.advance_n(close.len());
                self.push(TokenKind::Symbol, close.to_string(), tline, tcol, false);
                return Ok(());
            }
            self.lex_token(tline, tcol)?;
        }
    }

    fn lex_token(&mut self, line: usize, col: usize) -> Result<()> {
        let c = self.peek_char().unwrap_or('\0');
        if c == '_' || c.is_ascii_alphanumeric() {
            let word = self.parse_word();
            let kind = if word.chars().all(|c| c.is_ascii_digit()) {
                TokenKind::Number
            } else if word == "nil" {
                TokenKind::Nil
            } else if KEYWORDS.contains(&word.as_str()) {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            };
            self.push(kind, word, line, col, false);
            return Ok(());
        }
        if c == '"' || c == '\'' {
            let s = self
                .parse_quoted_string()
                .map_err(|msg| self.error(&msg, line, col))?;
            self.push(TokenKind::String, s, line, col, false);
            return Ok(());
        }
        for sym in SYMBOLS {
            if self.peek_str(sym) {
                self.advance_n(sym.len());
                self.push(TokenKind::Symbol, sym.to_string(), line, col, false);
                return Ok(());
            }
        }
        Err(self.error(&format!("unknown character '{c}'"), line, col))
    }

    /// An `[A-Za-z0-9_]` run. Digit-only runs are numbers; `12_3` is a name.
    fn parse_word(&mut self) -> String {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        self.s[start..self.i].to_string()
    }

    fn parse_quoted_string(&mut self) -> std::result::Result<String, String> {
        let quote = self.peek_char().ok_or_else(|| "string expected".to_string())?;
        self.advance();
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.advance();
            if c == quote {
                return Ok(out);
            }
            if c == '\\' {
                if let Some(nc) = self.peek_char() {
                    self.advance();
                    match nc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        _ => {
                            out.push('\\');
                            out.push(nc);
                        }
                    }
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        Err("unterminated string".to_string())
    }

    fn push(&mut self, kind: TokenKind, val: String, line: usize, col: usize, trim: bool) {
        self.tokens.push(Token {
            kind,
            val,
            line,
            col,
            trim,
        });
    }

    fn error(&self, msg: &str, line: usize, col: usize) -> Error {
        let mut err = Error::new(ErrorKind::Syntax(msg.to_string()))
            .with_sender("lexer")
            .with_template(self.name);
        err.line = line;
        err.column = col;
        err
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}
