use tracing::warn;

use crate::engine::TemplateSet;
use crate::errors::{Error, ErrorKind, Result};
use crate::lexer::{Token, TokenKind};
use crate::nodes::{HtmlNode, Node, VariableNode, Wrapper};

/// Cursor over a token stream, used both for whole documents and for the
/// argument tokens of a single tag.
pub struct Parser<'a> {
    name: &'a str,
    pub(crate) set: &'a TemplateSet,
    tokens: Vec<Token>,
    i: usize,
    last_token: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(name: &'a str, set: &'a TemplateSet, tokens: Vec<Token>) -> Self {
        let last_token = tokens.last().cloned();
        Self {
            name,
            set,
            tokens,
            i: 0,
            last_token,
        }
    }

    pub fn current(&self) -> Option<&Token> {
        self.tokens.get(self.i)
    }

    pub fn get(&self, i: usize) -> Option<&Token> {
        self.tokens.get(i)
    }

    /// Token `offset` positions past the current one.
    pub fn get_relative(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.i + offset)
    }

    pub fn consume(&mut self) {
        self.i += 1;
    }

    pub fn consume_n(&mut self, n: usize) {
        self.i += n;
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.i)
    }

    pub fn count(&self) -> usize {
        self.tokens.len()
    }

    pub fn last_token(&self) -> Option<&Token> {
        self.last_token.as_ref()
    }

    pub fn peek(&self, kind: TokenKind, val: &str) -> Option<&Token> {
        self.current().filter(|t| t.is(kind, val))
    }

    pub fn peek_kind(&self, kind: TokenKind) -> Option<&Token> {
        self.current().filter(|t| t.kind == kind)
    }

    /// Consumes and returns the current token if it is `kind`/`val`.
    pub fn match_one(&mut self, kind: TokenKind, val: &str) -> Option<Token> {
        let t = self.peek(kind, val).cloned()?;
        self.consume();
        Some(t)
    }

    pub fn match_kind(&mut self, kind: TokenKind) -> Option<Token> {
        let t = self.peek_kind(kind).cloned()?;
        self.consume();
        Some(t)
    }

    /// Parse error at `token`, or at the current position when `None`.
    pub fn error(&self, kind: ErrorKind, token: Option<&Token>) -> Error {
        let token = token.or_else(|| self.current()).or(self.last_token.as_ref());
        Error::new(kind)
            .with_sender("parser")
            .with_template(self.name)
            .at(token)
    }

    pub fn syntax_error(&self, msg: impl Into<String>, token: Option<&Token>) -> Error {
        self.error(ErrorKind::Syntax(msg.into()), token)
    }

    pub(crate) fn parse_document(&mut self) -> Result<Wrapper> {
        let mut nodes = Vec::new();
        while self.remaining() > 0 {
            nodes.push(self.parse_document_element()?);
        }
        Ok(Wrapper::new(nodes))
    }

    fn parse_document_element(&mut self) -> Result<Box<dyn Node>> {
        let Some(t) = self.current().cloned() else {
            return Err(self.syntax_error("unexpected end of template", None));
        };
        match t.kind {
            TokenKind::Html => {
                let trim_left = self.i > 0
                    && self
                        .get(self.i - 1)
                        .is_some_and(|p| p.is_close_tag() && p.trim);
                let trim_right = self
                    .get(self.i + 1)
                    .is_some_and(|n| n.is_open_tag() && n.trim);
                self.consume();
                Ok(Box::new(HtmlNode::new(t, trim_left, trim_right)))
            }
            TokenKind::Symbol if t.val == "{{" => self.parse_variable_element(),
            TokenKind::Symbol if t.val == "{%" => self.parse_tag_element(),
            _ => Err(self.syntax_error("unexpected token", Some(&t))),
        }
    }

    fn parse_variable_element(&mut self) -> Result<Box<dyn Node>> {
        let token = self.current().cloned();
        self.consume(); // '{{'

        let expr = self.parse_expression()?;

        if self.match_one(TokenKind::Symbol, "}}").is_none() {
            return Err(self.syntax_error("'}}' expected", None));
        }
        let token = token.ok_or_else(|| self.syntax_error("'{{' expected", None))?;
        Ok(Box::new(VariableNode::new(token, expr)))
    }

    fn parse_tag_element(&mut self) -> Result<Box<dyn Node>> {
        let start = self.current().cloned();
        self.consume(); // '{%'

        let Some(name_token) = self.match_kind(TokenKind::Identifier) else {
            return Err(self.syntax_error("tag name must be an identifier", None));
        };
        let name = name_token.val.as_str();

        if self.set.is_tag_banned(name) {
            warn!(tag = name, "rejected banned tag");
            return Err(self.error(
                ErrorKind::SandboxViolation {
                    what: "tag",
                    name: name.to_string(),
                },
                Some(&name_token),
            ));
        }
        let Some(tag_parser) = self.set.tag(name) else {
            return Err(self.syntax_error(format!("tag '{name}' does not exist"), Some(&name_token)));
        };

        let mut arguments = self.collect_tag_arguments()?;
        let start = start.unwrap_or(name_token);
        tag_parser(self, &start, &mut arguments)
    }

    /// Everything up to the closing `%}` as a sub-parser; consumes the `%}`.
    fn collect_tag_arguments(&mut self) -> Result<Parser<'a>> {
        let mut args = Vec::new();
        loop {
            match self.current() {
                None => return Err(self.syntax_error("'%}' expected", None)),
                Some(t) if t.is(TokenKind::Symbol, "%}") => {
                    self.consume();
                    return Ok(Parser::new(self.name, self.set, args));
                }
                Some(t) => {
                    args.push(t.clone());
                    self.consume();
                }
            }
        }
    }

    /// `{%` followed by one of `names`, without consuming anything.
    fn at_end_tag(&self, names: &[&str]) -> Option<String> {
        let open = self.current()?;
        let name = self.get(self.i + 1)?;
        (open.is(TokenKind::Symbol, "{%")
            && name.kind == TokenKind::Identifier
            && names.contains(&name.val.as_str()))
        .then(|| name.val.clone())
    }

    /// Parses nodes until one of the end tags `names`. Returns the body, the
    /// end tag's name and its argument tokens.
    pub fn wrap_until_tag(&mut self, names: &[&str]) -> Result<(Wrapper, String, Parser<'a>)> {
        let mut nodes = Vec::new();
        while self.remaining() > 0 {
            if let Some(end) = self.at_end_tag(names) {
                self.consume_n(2);
                let args = self.collect_tag_arguments()?;
                return Ok((Wrapper::new(nodes), end, args));
            }
            nodes.push(self.parse_document_element()?);
        }
        Err(self.syntax_error(
            format!("unexpected EOF, expected tag {}", names.join(" or ")),
            None,
        ))
    }

    /// Skips raw tokens until one of the end tags `names`.
    pub fn skip_until_tag(&mut self, names: &[&str]) -> Result<()> {
        while self.remaining() > 0 {
            if self.at_end_tag(names).is_some() {
                self.consume_n(2);
                let args = self.collect_tag_arguments()?;
                if args.count() > 0 {
                    return Err(args.syntax_error("end tag takes no arguments", None));
                }
                return Ok(());
            }
            self.consume();
        }
        Err(self.syntax_error(
            format!("unexpected EOF, expected tag {}", names.join(" or ")),
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(src: &str) -> Result<Wrapper> {
        let set = TemplateSet::default();
        let tokens = lex("t", src)?;
        let mut p = Parser::new("t", &set, tokens);
        p.parse_document()
    }

    #[test]
    fn unknown_tag_is_a_syntax_error() {
        let err = parse("{% nosuchtag %}").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(ref m) if m.contains("nosuchtag")));
    }

    #[test]
    fn unclosed_variable_is_reported() {
        let err = parse("{{ a b }}").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(_)));
        assert_eq!(err.sender, "parser");
    }

    #[test]
    fn missing_end_tag() {
        let err = parse("{% comment %} never closed").unwrap_err();
        assert!(err.to_string().contains("endcomment"));
    }
}
