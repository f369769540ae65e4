use tracing::debug;

use crate::errors::{ErrorKind, Result};
use crate::frame::Frame;
use crate::lexer::Token;
use crate::nodes::{Node, TemplateWriter, Wrapper};
use crate::parser::Parser;

/// Limit on output that renders another `erroronmissingval` block.
pub const MAX_RERENDER_DEPTH: usize = 16;

/// `{% erroronmissingval %}...{% enderroronmissingval %}`
///
/// Renders the body with the strict missing-value policy, then compiles that
/// output as a template of the same set and renders it as well. Any name the
/// body or its output fails to resolve aborts the render with `NoValueFound`.
#[derive(Debug)]
pub struct ErrorOnMissingValNode {
    position: Token,
    body: Wrapper,
}

impl Node for ErrorOnMissingValNode {
    fn execute(&self, frame: &mut Frame, writer: &mut dyn TemplateWriter) -> Result<()> {
        if frame.rerender_depth >= MAX_RERENDER_DEPTH {
            return Err(frame.error(
                ErrorKind::Tag(format!(
                    "erroronmissingval nested deeper than {MAX_RERENDER_DEPTH} levels"
                )),
                Some(&self.position),
            ));
        }
        let mut strict = frame.child();
        strict.allow_missing = false;
        strict.rerender_depth += 1;

        let mut buffer = String::with_capacity(1024);
        self.body.execute(&mut strict, &mut buffer)?;

        debug!(line = self.position.line, "compiling erroronmissingval output");
        let template = frame.template().set().from_string(&buffer)?;
        template.execute_in(&mut strict, writer)
    }
}

pub fn parse(doc: &mut Parser<'_>, start: &Token, _arguments: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    let (body, _, _) = doc.wrap_until_tag(&["enderroronmissingval"])?;
    Ok(Box::new(ErrorOnMissingValNode {
        position: start.clone(),
        body,
    }))
}
