use std::sync::Arc;

use tracing::{trace, warn};

use crate::errors::{ErrorKind, Result};
use crate::filters::Filter;
use crate::frame::Frame;
use crate::lexer::{Token, TokenKind};
use crate::parser::Parser;
use crate::resolver::{CallArg, Resolver, Step, StepKind};
use crate::value::{HostValue, Value};

#[derive(Debug)]
pub enum Expr {
    Literal { token: Token, value: HostValue },
    Variable(Resolver),
    Filtered(FilteredExpr),
}

impl Expr {
    pub fn evaluate(&self, frame: &Frame) -> Result<Value> {
        match self {
            Expr::Literal { value, .. } => Ok(Value::new(value.clone())),
            Expr::Variable(resolver) => resolver.evaluate(frame),
            Expr::Filtered(filtered) => filtered.evaluate(frame),
        }
    }

    /// Whether a filter named `name` runs anywhere in this expression's chain.
    pub fn filter_applied(&self, name: &str) -> bool {
        match self {
            Expr::Filtered(filtered) => filtered.chain.iter().any(|f| f.name == name),
            _ => false,
        }
    }

    pub fn token(&self) -> &Token {
        match self {
            Expr::Literal { token, .. } => token,
            Expr::Variable(resolver) => &resolver.token,
            Expr::Filtered(filtered) => &filtered.token,
        }
    }
}

/// A base expression followed by `|filter[:param]` steps.
#[derive(Debug)]
pub struct FilteredExpr {
    token: Token,
    base: Box<Expr>,
    chain: Vec<FilterCall>,
}

impl FilteredExpr {
    fn evaluate(&self, frame: &Frame) -> Result<Value> {
        let mut value = self.base.evaluate(frame)?;
        for call in &self.chain {
            value = call.execute(value, frame)?;
        }
        Ok(value)
    }
}

pub struct FilterCall {
    token: Token,
    name: String,
    filter: Arc<dyn Filter>,
    param: Option<Box<Expr>>,
}

impl std::fmt::Debug for FilterCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCall")
            .field("name", &self.name)
            .field("param", &self.param)
            .finish()
    }
}

impl FilterCall {
    fn execute(&self, input: Value, frame: &Frame) -> Result<Value> {
        let param = match &self.param {
            Some(expr) => Some(expr.evaluate(frame)?),
            None => None,
        };
        trace!(filter = %self.name, "applying filter");
        self.filter.call(&input, param.as_ref()).map_err(|e| {
            frame
                .error(
                    ErrorKind::Filter {
                        name: self.name.clone(),
                        message: e.to_string(),
                    },
                    Some(&self.token),
                )
                .with_sender(format!("filter:{}", self.name))
        })
    }
}

impl<'a> Parser<'a> {
    /// Entry point for any expression position (`{{ }}`, call arguments,
    /// subscripts, array items).
    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_variable_or_literal_with_filter()
    }

    fn parse_variable_or_literal_with_filter(&mut self) -> Result<Expr> {
        let token = self
            .current()
            .cloned()
            .ok_or_else(|| self.syntax_error("unexpected EOF, expected an expression", None))?;
        let base = self.parse_variable_or_literal()?;

        let mut chain = Vec::new();
        while self.match_one(TokenKind::Symbol, "|").is_some() {
            chain.push(self.parse_filter()?);
        }

        if chain.is_empty() {
            return Ok(base);
        }
        Ok(Expr::Filtered(FilteredExpr {
            token,
            base: Box::new(base),
            chain,
        }))
    }

    // IDENT [':' (literal | variable)]
    fn parse_filter(&mut self) -> Result<FilterCall> {
        let Some(name_token) = self.match_kind(TokenKind::Identifier) else {
            return Err(self.syntax_error("filter name must be an identifier", None));
        };
        let name = name_token.val.clone();

        if self.set.is_filter_banned(&name) {
            warn!(filter = %name, "rejected banned filter");
            return Err(self.error(
                ErrorKind::SandboxViolation { what: "filter", name },
                Some(&name_token),
            ));
        }
        let Some(filter) = self.set.filter(&name) else {
            return Err(self.syntax_error(format!("filter '{name}' does not exist"), Some(&name_token)));
        };

        let param = if self.match_one(TokenKind::Symbol, ":").is_some() {
            Some(Box::new(self.parse_variable_or_literal()?))
        } else {
            None
        };

        Ok(FilterCall {
            token: name_token,
            name,
            filter,
            param,
        })
    }

    fn parse_variable_or_literal(&mut self) -> Result<Expr> {
        let Some(t) = self.current().cloned() else {
            return Err(self.syntax_error(
                "unexpected EOF, expected a number, string, keyword or identifier",
                None,
            ));
        };

        match t.kind {
            TokenKind::Number => {
                self.consume();
                return self.parse_number(t, false);
            }
            TokenKind::Symbol if t.val == "-" || t.val == "+" => {
                self.consume();
                let Some(num) = self.match_kind(TokenKind::Number) else {
                    return Err(self.syntax_error("expected a number after the sign", None));
                };
                return self.parse_number(num, t.val == "-");
            }
            TokenKind::String => {
                self.consume();
                return Ok(Expr::Literal {
                    value: HostValue::Str(t.val.clone()),
                    token: t,
                });
            }
            TokenKind::Keyword => {
                self.consume();
                let value = match t.val.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(self.syntax_error("this keyword is not allowed here", Some(&t))),
                };
                return Ok(Expr::Literal {
                    token: t,
                    value: HostValue::Bool(value),
                });
            }
            TokenKind::Symbol if t.val == "[" => return self.parse_array(),
            TokenKind::Identifier | TokenKind::Nil => {}
            _ => {
                return Err(self.syntax_error(
                    "expected either a number, string, keyword or identifier",
                    Some(&t),
                ))
            }
        }

        // A leading `nil` is looked up like any name and hits the public
        // nil entry.
        let mut steps = vec![Step::new(StepKind::Ident(t.val.clone()))];
        self.consume();

        while self.remaining() > 0 {
            if self.match_one(TokenKind::Symbol, ".").is_some() {
                steps.push(self.parse_dotted_step()?);
            } else if self.match_one(TokenKind::Symbol, "[").is_some() {
                let subscript = self.parse_expression()?;
                if self.match_one(TokenKind::Symbol, "]").is_none() {
                    return Err(self.syntax_error("missing closing bracket after subscript argument", None));
                }
                steps.push(Step::new(StepKind::Subscript(Box::new(subscript))));
            } else if self.match_one(TokenKind::Symbol, "(").is_some() {
                let args = self.parse_call_args()?;
                if let Some(last) = steps.last_mut() {
                    last.call.get_or_insert_with(Vec::new).extend(args);
                }
            } else {
                break;
            }
        }

        Ok(Expr::Variable(Resolver::new(t, steps)))
    }

    fn parse_number(&mut self, t: Token, negative: bool) -> Result<Expr> {
        let sign = if negative { "-" } else { "" };
        // `1.5` arrives as NUMBER '.' NUMBER; only valid as a leading literal.
        if self.peek(TokenKind::Symbol, ".").is_some()
            && self
                .get_relative(1)
                .is_some_and(|n| n.kind == TokenKind::Number)
        {
            self.consume();
            let frac = self
                .match_kind(TokenKind::Number)
                .ok_or_else(|| self.syntax_error("expected a number after the '.'", None))?;
            let f: f64 = format!("{sign}{}.{}", t.val, frac.val)
                .parse()
                .map_err(|_| self.syntax_error("bad float", Some(&t)))?;
            return Ok(Expr::Literal {
                token: t,
                value: HostValue::Float(f),
            });
        }
        let i: i64 = format!("{sign}{}", t.val)
            .parse()
            .map_err(|_| self.syntax_error("bad integer", Some(&t)))?;
        Ok(Expr::Literal {
            token: t,
            value: HostValue::Int(i),
        })
    }

    // after '.': IDENT | NUMBER | nil | '@' IDENT ['(' args ')']
    fn parse_dotted_step(&mut self) -> Result<Step> {
        let Some(t) = self.current().cloned() else {
            return Err(self.syntax_error(
                "unexpected EOF, expected either IDENTIFIER or NUMBER after DOT",
                None,
            ));
        };
        self.consume();
        match t.kind {
            TokenKind::Identifier | TokenKind::Keyword => Ok(Step::new(StepKind::Ident(t.val))),
            TokenKind::Number => {
                let i = t
                    .val
                    .parse::<i64>()
                    .map_err(|_| self.syntax_error("bad index", Some(&t)))?;
                Ok(Step::new(StepKind::Index(i)))
            }
            TokenKind::Nil => Ok(Step::new(StepKind::Nil)),
            TokenKind::Symbol if t.val == "@" => {
                let Some(attr) = self.match_kind(TokenKind::Identifier) else {
                    return Err(self.syntax_error("expected an attribute name after '@'", None));
                };
                let mut step = Step::new(StepKind::Attr(attr.val));
                if self.match_one(TokenKind::Symbol, "(").is_some() {
                    step.call = Some(self.parse_call_args()?);
                }
                Ok(step)
            }
            _ => Err(self.syntax_error("this token is not allowed within a variable name", Some(&t))),
        }
    }

    // after '(': [arg {',' arg}] ')', arg = [IDENT '='] expr
    fn parse_call_args(&mut self) -> Result<Vec<CallArg>> {
        let mut args = Vec::new();
        if self.match_one(TokenKind::Symbol, ")").is_some() {
            return Ok(args);
        }
        loop {
            if self.remaining() == 0 {
                return Err(self.syntax_error("unexpected EOF, expected function call argument list", None));
            }
            let name = if self.peek_kind(TokenKind::Identifier).is_some()
                && self
                    .get_relative(1)
                    .is_some_and(|n| n.is(TokenKind::Symbol, "="))
            {
                let name = self.current().map(|t| t.val.clone());
                self.consume_n(2);
                name
            } else {
                None
            };
            let expr = self.parse_expression()?;
            args.push(CallArg { name, expr });

            if self.match_one(TokenKind::Symbol, ")").is_some() {
                return Ok(args);
            }
            if self.match_one(TokenKind::Symbol, ",").is_none() {
                return Err(self.syntax_error("missing comma or closing bracket after argument", None));
            }
        }
    }

    // '[' [expr {',' expr}] ']'
    fn parse_array(&mut self) -> Result<Expr> {
        let token = self
            .current()
            .cloned()
            .ok_or_else(|| self.syntax_error("'[' expected", None))?;
        self.consume();

        let mut steps = Vec::new();
        if self.match_one(TokenKind::Symbol, "]").is_some() {
            return Ok(Expr::Variable(Resolver::new(token, steps)));
        }
        loop {
            if self.remaining() == 0 {
                return Err(self.syntax_error("unexpected EOF, unclosed array list", None));
            }
            let item = self.parse_expression()?;
            steps.push(Step::new(StepKind::ArrayItem(Box::new(item))));

            if self.match_one(TokenKind::Symbol, "]").is_some() {
                break;
            }
            if self.match_one(TokenKind::Symbol, ",").is_none() {
                return Err(self.syntax_error("missing comma or closing bracket after argument", None));
            }
        }
        Ok(Expr::Variable(Resolver::new(token, steps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TemplateSet;
    use crate::lexer::lex;
    use pretty_assertions::assert_eq;

    fn parse_expr(set: &TemplateSet, src: &str) -> Result<Expr> {
        // Reuse the tag lexer by wrapping the expression in a variable tag.
        let mut tokens = lex("t", &format!("{{{{ {src} }}}}"))?;
        tokens.remove(0);
        tokens.pop();
        let mut p = Parser::new("t", set, tokens);
        let expr = p.parse_expression()?;
        assert_eq!(p.remaining(), 0, "trailing tokens in {src}");
        Ok(expr)
    }

    #[test]
    fn path_shape() {
        let set = TemplateSet::default();
        let Expr::Variable(r) = parse_expr(&set, "user.addresses[0].city").unwrap() else {
            panic!("expected variable");
        };
        assert_eq!(r.to_string(), "user.addresses.[subscript].city");
        assert_eq!(r.steps().len(), 4);
    }

    #[test]
    fn call_args_keep_keyword_names() {
        let set = TemplateSet::default();
        let Expr::Variable(r) = parse_expr(&set, "f(1, x=2)").unwrap() else {
            panic!("expected variable");
        };
        let args = r.steps()[0].call.as_ref().unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, None);
        assert_eq!(args[1].name.as_deref(), Some("x"));
    }

    #[test]
    fn literals() {
        let set = TemplateSet::default();
        for (src, text) in [("1.5", "1.5"), ("-3", "-3"), ("'s'", "s"), ("true", "True")] {
            match parse_expr(&set, src).unwrap() {
                Expr::Literal { value, .. } => assert_eq!(value.to_text(), text),
                other => panic!("{src} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn filter_chain_is_recorded() {
        let set = TemplateSet::default();
        let expr = parse_expr(&set, "name|lower|safe").unwrap();
        assert!(expr.filter_applied("safe"));
        assert!(!expr.filter_applied("upper"));
    }

    #[test]
    fn unknown_filter_fails_at_parse_time() {
        let set = TemplateSet::default();
        let err = parse_expr(&set, "x|frobnicate").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(_)));
    }
}
