use crate::errors::Result;
use crate::frame::Frame;
use crate::lexer::Token;
use crate::nodes::{Node, TemplateWriter};
use crate::parser::Parser;

/// `{% comment %}...{% endcomment %}`: the body is lexed but never parsed or
/// rendered.
#[derive(Debug)]
pub struct CommentNode;

impl Node for CommentNode {
    fn execute(&self, _: &mut Frame, _: &mut dyn TemplateWriter) -> Result<()> {
        Ok(())
    }
}

pub fn parse(doc: &mut Parser<'_>, _start: &Token, arguments: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    doc.skip_until_tag(&["endcomment"])?;

    if arguments.count() != 0 {
        return Err(arguments.syntax_error("tag 'comment' does not take any argument", None));
    }
    Ok(Box::new(CommentNode))
}
