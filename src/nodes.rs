use std::fmt;
use std::io;

use crate::errors::{ErrorKind, Result};
use crate::expression::Expr;
use crate::filters::builtins::escape_html;
use crate::frame::Frame;
use crate::lexer::{Token, TOKEN_SPACE_CHARS};

/// Append-only output sink.
pub trait TemplateWriter {
    fn write_str(&mut self, s: &str) -> io::Result<()>;
}

impl TemplateWriter for String {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.push_str(s);
        Ok(())
    }
}

/// Adapts any [`io::Write`] (stdout, a file, a socket) to a [`TemplateWriter`].
pub struct IoWriter<W: io::Write>(pub W);

impl<W: io::Write> TemplateWriter for IoWriter<W> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.0.write_all(s.as_bytes())
    }
}

/// One executable piece of a compiled template.
pub trait Node: fmt::Debug + Send + Sync {
    fn execute(&self, frame: &mut Frame, writer: &mut dyn TemplateWriter) -> Result<()>;
}

pub(crate) fn write(frame: &Frame, token: &Token, writer: &mut dyn TemplateWriter, s: &str) -> Result<()> {
    writer
        .write_str(s)
        .map_err(|e| frame.error(ErrorKind::WriteError(e), Some(token)))
}

/// Raw text between tags.
#[derive(Debug)]
pub struct HtmlNode {
    token: Token,
    trim_left: bool,
    trim_right: bool,
}

impl HtmlNode {
    pub fn new(token: Token, trim_left: bool, trim_right: bool) -> Self {
        Self {
            token,
            trim_left,
            trim_right,
        }
    }
}

impl Node for HtmlNode {
    fn execute(&self, frame: &mut Frame, writer: &mut dyn TemplateWriter) -> Result<()> {
        let mut text = self.token.val.as_str();
        if self.trim_left {
            text = text.trim_start_matches(TOKEN_SPACE_CHARS);
        }
        if self.trim_right {
            text = text.trim_end_matches(TOKEN_SPACE_CHARS);
        }
        write(frame, &self.token, writer, text)
    }
}

/// `{{ expr }}`
#[derive(Debug)]
pub struct VariableNode {
    token: Token,
    expr: Expr,
}

impl VariableNode {
    pub fn new(token: Token, expr: Expr) -> Self {
        Self { token, expr }
    }
}

impl Node for VariableNode {
    fn execute(&self, frame: &mut Frame, writer: &mut dyn TemplateWriter) -> Result<()> {
        let value = self.expr.evaluate(frame)?;

        if frame.autoescape && value.is_string() && !value.is_safe() && !self.expr.filter_applied("safe") {
            let escaped = escape_html(&value.to_string());
            return write(frame, &self.token, writer, &escaped);
        }
        write(frame, &self.token, writer, &value.to_string())
    }
}

/// Sequence of nodes executed in order; the root of every template and the
/// body of every block tag.
#[derive(Debug, Default)]
pub struct Wrapper {
    nodes: Vec<Box<dyn Node>>,
}

impl Wrapper {
    pub fn new(nodes: Vec<Box<dyn Node>>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Node for Wrapper {
    fn execute(&self, frame: &mut Frame, writer: &mut dyn TemplateWriter) -> Result<()> {
        for node in &self.nodes {
            node.execute(frame, writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;
    use crate::resolver::{Resolver, Step, StepKind};
    use crate::test_support::frame_with;
    use crate::value::{HostValue, Value};
    use pretty_assertions::assert_eq;

    fn html(val: &str) -> Token {
        Token {
            kind: TokenKind::Html,
            val: val.to_string(),
            line: 1,
            col: 1,
            trim: false,
        }
    }

    fn literal(value: HostValue) -> Expr {
        Expr::Literal {
            token: html(""),
            value,
        }
    }

    #[test]
    fn html_trimming() {
        let mut frame = frame_with(&[]);
        let mut out = String::new();
        HtmlNode::new(html("  \n a \t"), true, false)
            .execute(&mut frame, &mut out)
            .unwrap();
        HtmlNode::new(html("|  b \n"), false, true)
            .execute(&mut frame, &mut out)
            .unwrap();
        assert_eq!(out, "a \t|  b");
    }

    #[test]
    fn variable_node_escapes_untrusted_strings() {
        let mut frame = frame_with(&[("s", Value::safe("<i>").into())]);
        let mut out = String::new();
        VariableNode::new(html(""), literal("<b>".into()))
            .execute(&mut frame, &mut out)
            .unwrap();
        let trusted = Expr::Variable(Resolver::new(html(""), vec![Step::new(StepKind::Ident("s".into()))]));
        VariableNode::new(html(""), trusted)
            .execute(&mut frame, &mut out)
            .unwrap();
        assert_eq!(out, "&lt;b&gt;<i>");
    }

    #[test]
    fn io_writer_failure_is_a_write_error() {
        struct Broken;
        impl io::Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut frame = frame_with(&[]);
        let err = HtmlNode::new(html("x"), false, false)
            .execute(&mut frame, &mut IoWriter(Broken))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::WriteError(_)));
    }
}
