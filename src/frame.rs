use std::sync::Arc;

use tracing::trace;

use crate::context::Context;
use crate::engine::TemplateRef;
use crate::errors::{Error, ErrorKind};
use crate::lexer::Token;
use crate::value::{HostValue, Mapping};

/// Private-context key holding engine metadata (`stencil.version`).
pub const ENGINE_KEY: &str = "stencil";

/// Public-context key that always resolves to nil.
pub const NIL_KEY: &str = "nil";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Scope state of one render path.
///
/// `private` is scratch space owned by this frame (loop variables and the
/// like). `public` is the caller's data and is only read during resolution.
/// `shared` is one context reachable from every frame of the same render,
/// for tags that need to talk to each other.
#[derive(Debug)]
pub struct Frame {
    template: TemplateRef,

    pub allow_missing: bool,
    pub autoescape: bool,
    pub public: Arc<Context>,
    pub private: Context,
    pub shared: Option<Arc<Context>>,
    /// How many `erroronmissingval` re-renders enclose this frame.
    pub(crate) rerender_depth: usize,
}

impl Frame {
    /// Top-level frame of a render.
    pub fn new(template: TemplateRef, public: Arc<Context>) -> Self {
        let private = Context::new();
        let meta: Mapping = [("version", VERSION)].into_iter().collect();
        private.set(ENGINE_KEY, meta);

        public.set(NIL_KEY, HostValue::Nil);

        let config = template.set().config();
        trace!(template = %template.name(), "new top-level frame");
        Self {
            allow_missing: config.allow_missing_values,
            autoescape: config.autoescape,
            template,
            public,
            private,
            shared: Some(Arc::new(Context::new())),
            rerender_depth: 0,
        }
    }

    /// Frame for a nested scope. `private` starts as a copy of the parent's;
    /// `public` and `shared` are the same contexts.
    pub fn child(&self) -> Self {
        Self {
            template: self.template.clone(),
            allow_missing: self.allow_missing,
            autoescape: self.autoescape,
            public: Arc::clone(&self.public),
            private: self.private.snapshot(),
            shared: self.shared.clone(),
            rerender_depth: self.rerender_depth,
        }
    }

    pub fn template(&self) -> &TemplateRef {
        &self.template
    }

    /// Private first, then public. `None` when neither has the name.
    pub fn lookup(&self, name: &str) -> Option<HostValue> {
        self.private.get(name).or_else(|| self.public.get(name))
    }

    /// Attaches the template name and token position to `kind`.
    pub fn error(&self, kind: ErrorKind, token: Option<&Token>) -> Error {
        Error::new(kind)
            .with_sender("execution")
            .with_template(self.template.name())
            .at(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TemplateSet;
    use pretty_assertions::assert_eq;

    fn top_level() -> Frame {
        let set = Arc::new(TemplateSet::default());
        Frame::new(TemplateRef::new("test", set), Arc::new(Context::new()))
    }

    #[test]
    fn top_level_frame_setup() {
        let frame = top_level();
        assert!(frame.public.contains_key(NIL_KEY));
        let meta = frame.private.get(ENGINE_KEY).unwrap();
        match meta {
            HostValue::Map(m) => {
                assert_eq!(m.get_str("version").map(HostValue::to_text), Some(VERSION.into()))
            }
            other => panic!("unexpected metadata {other:?}"),
        }
        assert!(frame.autoescape);
        assert!(!frame.allow_missing);
        assert!(frame.shared.is_some());
    }

    #[test]
    fn child_private_is_a_copy() {
        let parent = top_level();
        parent.private.set("loop", 1);
        let child = parent.child();
        child.private.set("inner", 2);
        parent.private.set("late", 3);

        assert!(child.private.contains_key("loop"));
        assert!(!child.private.contains_key("late"));
        assert!(!parent.private.contains_key("inner"));
    }

    #[test]
    fn child_shares_public_and_shared() {
        let parent = top_level();
        let child = parent.child();
        child.shared.as_ref().unwrap().set("msg", "hi");
        assert!(parent.shared.as_ref().unwrap().contains_key("msg"));
        assert!(Arc::ptr_eq(&parent.public, &child.public));
    }

    #[test]
    fn errors_carry_template_name() {
        let frame = top_level();
        let err = frame.error(ErrorKind::Tag("boom".into()), None);
        assert_eq!(err.template.as_deref(), Some("test"));
        assert_eq!(err.line, 0);
    }
}
