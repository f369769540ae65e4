use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::Context;
use crate::errors::{Error, ErrorKind, Result};
use crate::filters::{self, Filter};
use crate::frame::Frame;
use crate::lexer;
use crate::nodes::{IoWriter, Node, TemplateWriter, Wrapper};
use crate::parser::Parser;
use crate::tags::{self, TagParser};

/// Render defaults shared by every template of a [`TemplateSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Escape untrusted string output of `{{ }}`.
    pub autoescape: bool,
    /// Unknown names resolve to nil instead of failing with `NoValueFound`.
    pub allow_missing_values: bool,
    pub banned_filters: Vec<String>,
    pub banned_tags: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            autoescape: true,
            allow_missing_values: false,
            banned_filters: Vec::new(),
            banned_tags: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A family of templates sharing configuration, registries, sandbox
/// deny-lists and globals.
///
/// Built mutably, then shared behind an `Arc`; once shared it can no longer
/// be changed, so bans always apply to every template compiled from it.
#[derive(Debug)]
pub struct TemplateSet {
    name: String,
    config: Config,
    /// Merged beneath the caller's context on every render.
    pub globals: Context,
    filters: filters::Registry,
    tags: tags::Registry,
    banned_filters: HashSet<String>,
    banned_tags: HashSet<String>,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::unrestricted("default", Config::default())
    }
}

impl TemplateSet {
    /// Fails when `config` bans a filter or tag that does not exist.
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self> {
        let mut set = Self::unrestricted(name, config);
        for name in set.config.banned_filters.clone() {
            set.ban_filter(&name)?;
        }
        for name in set.config.banned_tags.clone() {
            set.ban_tag(&name)?;
        }
        Ok(set)
    }

    fn unrestricted(name: impl Into<String>, config: Config) -> Self {
        Self {
            name: name.into(),
            config,
            globals: Context::new(),
            filters: filters::Registry::with_builtins(),
            tags: tags::Registry::with_builtins(),
            banned_filters: HashSet::new(),
            banned_tags: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ban_filter(&mut self, name: &str) -> Result<()> {
        if !self.filters.contains(name) {
            return Err(ErrorKind::Config(format!(
                "filter '{name}' does not exist (therefore cannot be banned)"
            ))
            .into());
        }
        self.banned_filters.insert(name.to_string());
        Ok(())
    }

    pub fn ban_tag(&mut self, name: &str) -> Result<()> {
        if !self.tags.contains(name) {
            return Err(ErrorKind::Config(format!(
                "tag '{name}' does not exist (therefore cannot be banned)"
            ))
            .into());
        }
        self.banned_tags.insert(name.to_string());
        Ok(())
    }

    pub fn register_filter<F: Filter + 'static>(&mut self, filter: F) {
        self.filters.register(filter);
    }

    pub fn register_tag(&mut self, name: impl Into<String>, parser: TagParser) {
        self.tags.register(name, parser);
    }

    pub fn filter(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name)
    }

    pub fn is_filter_banned(&self, name: &str) -> bool {
        self.banned_filters.contains(name)
    }

    pub fn tag(&self, name: &str) -> Option<TagParser> {
        self.tags.get(name)
    }

    pub fn is_tag_banned(&self, name: &str) -> bool {
        self.banned_tags.contains(name)
    }

    pub fn from_string(self: &Arc<Self>, src: &str) -> Result<Template> {
        self.from_named_string("<string>", src)
    }

    /// Compiles `src`; `name` shows up in error messages.
    pub fn from_named_string(self: &Arc<Self>, name: &str, src: &str) -> Result<Template> {
        debug!(set = %self.name, template = name, "compiling template");
        let tokens = lexer::lex(name, src)?;
        let mut parser = Parser::new(name, self, tokens);
        let root = parser.parse_document()?;
        Ok(Template {
            handle: TemplateRef::new(name, Arc::clone(self)),
            root,
        })
    }
}

/// Name plus owning set; what a render needs to know about its template.
#[derive(Clone)]
pub struct TemplateRef {
    name: Arc<str>,
    set: Arc<TemplateSet>,
}

impl TemplateRef {
    pub fn new(name: impl Into<Arc<str>>, set: Arc<TemplateSet>) -> Self {
        Self {
            name: name.into(),
            set,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self) -> &Arc<TemplateSet> {
        &self.set
    }
}

impl fmt::Debug for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRef")
            .field("name", &self.name)
            .field("set", &self.set.name)
            .finish()
    }
}

/// A compiled template. Immutable; render it from as many threads as needed.
#[derive(Debug)]
pub struct Template {
    handle: TemplateRef,
    root: Wrapper,
}

impl Template {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Renders into a new `String`.
    pub fn execute(&self, ctx: &Context) -> Result<String> {
        let mut out = String::new();
        self.execute_writer(ctx, &mut out)?;
        Ok(out)
    }

    /// Renders into `writer`. On failure, whatever was written before the
    /// failing node stays written.
    pub fn execute_writer(&self, ctx: &Context, writer: &mut dyn TemplateWriter) -> Result<()> {
        let public = Context::new();
        for scope in [&self.handle.set.globals, ctx] {
            scope.check_identifiers().map_err(|kind| {
                warn!(template = self.name(), "rejected context: {kind}");
                Error::new(kind)
                    .with_sender("context")
                    .with_template(self.name())
            })?;
            public.update(scope);
        }

        let mut frame = Frame::new(self.handle.clone(), Arc::new(public));
        debug!(template = self.name(), "render start");
        self.execute_in(&mut frame, writer)?;
        debug!(template = self.name(), "render finished");
        Ok(())
    }

    /// Renders into any [`std::io::Write`].
    pub fn execute_io<W: std::io::Write>(&self, ctx: &Context, out: W) -> Result<()> {
        self.execute_writer(ctx, &mut IoWriter(out))
    }

    /// Renders this template's root inside an existing frame.
    pub(crate) fn execute_in(&self, frame: &mut Frame, writer: &mut dyn TemplateWriter) -> Result<()> {
        self.root.execute(frame, writer)
    }
}
