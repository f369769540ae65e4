use std::sync::LazyLock;

use rand::seq::SliceRandom;

use crate::errors::{ErrorKind, Result};
use crate::frame::Frame;
use crate::lexer::{Token, TokenKind};
use crate::nodes::{self, Node, TemplateWriter};
use crate::parser::Parser;

pub const MAX_LOREM_COUNT: i64 = 100_000;

const LOREM_TEXT: &str = "\
Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat.
Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur. Excepteur sint occaecat cupidatat non proident, sunt in culpa qui officia deserunt mollit anim id est laborum.
Sed ut perspiciatis unde omnis iste natus error sit voluptatem accusantium doloremque laudantium, totam rem aperiam, eaque ipsa quae ab illo inventore veritatis et quasi architecto beatae vitae dicta sunt explicabo.
Nemo enim ipsam voluptatem quia voluptas sit aspernatur aut odit aut fugit, sed quia consequuntur magni dolores eos qui ratione voluptatem sequi nesciunt.
Neque porro quisquam est, qui dolorem ipsum quia dolor sit amet, consectetur, adipisci velit, sed quia non numquam eius modi tempora incidunt ut labore et dolore magnam aliquam quaerat voluptatem.";

static PARAGRAPHS: LazyLock<Vec<&'static str>> = LazyLock::new(|| LOREM_TEXT.lines().collect());
static WORDS: LazyLock<Vec<&'static str>> =
    LazyLock::new(|| LOREM_TEXT.split_whitespace().collect());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Words,
    HtmlParagraphs,
    Paragraphs,
}

/// `{% lorem [count] [w|p|b] [random] %}`
#[derive(Debug)]
pub struct LoremNode {
    position: Token,
    count: i64,
    method: Method,
    random: bool,
}

impl LoremNode {
    fn pick(&self, pool: &[&'static str], i: usize) -> &'static str {
        if self.random {
            pool.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
        } else {
            pool[i % pool.len()]
        }
    }

    fn render(&self) -> String {
        let count = usize::try_from(self.count).unwrap_or(0);
        let items = (0..count).map(|i| match self.method {
            Method::Words => self.pick(&WORDS, i).to_string(),
            Method::Paragraphs => self.pick(&PARAGRAPHS, i).to_string(),
            Method::HtmlParagraphs => format!("<p>{}</p>", self.pick(&PARAGRAPHS, i)),
        });
        let sep = if self.method == Method::Words { " " } else { "\n" };
        items.collect::<Vec<_>>().join(sep)
    }
}

impl Node for LoremNode {
    fn execute(&self, frame: &mut Frame, writer: &mut dyn TemplateWriter) -> Result<()> {
        if self.count > MAX_LOREM_COUNT {
            return Err(frame.error(
                ErrorKind::Tag(format!("max count for lorem is {MAX_LOREM_COUNT}")),
                Some(&self.position),
            ));
        }
        nodes::write(frame, &self.position, writer, &self.render())
    }
}

pub fn parse(_doc: &mut Parser<'_>, start: &Token, arguments: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    let mut node = LoremNode {
        position: start.clone(),
        count: 1,
        method: Method::Paragraphs,
        random: false,
    };

    if let Some(count) = arguments.match_kind(TokenKind::Number) {
        node.count = count
            .val
            .parse()
            .map_err(|_| arguments.syntax_error("lorem count is out of range", Some(&count)))?;
    }

    if arguments.peek(TokenKind::Identifier, "random").is_none() {
        if let Some(method) = arguments.match_kind(TokenKind::Identifier) {
            node.method = match method.val.as_str() {
                "w" => Method::Words,
                "p" => Method::HtmlParagraphs,
                "b" => Method::Paragraphs,
                _ => {
                    return Err(arguments
                        .syntax_error("lorem-method must be either 'w', 'p' or 'b'", Some(&method)))
                }
            };
        }
    }

    if arguments.match_one(TokenKind::Identifier, "random").is_some() {
        node.random = true;
    }

    if arguments.remaining() > 0 {
        return Err(arguments.syntax_error("malformed lorem-tag arguments", None));
    }
    Ok(Box::new(node))
}
