use std::sync::Arc;

use crate::context::Context;
use crate::engine::{TemplateRef, TemplateSet};
use crate::frame::Frame;
use crate::value::HostValue;

/// Top-level frame over a default set with `entries` as the public context.
pub(crate) fn frame_with(entries: &[(&str, HostValue)]) -> Frame {
    let set = Arc::new(TemplateSet::default());
    let public: Context = entries.iter().cloned().collect();
    Frame::new(TemplateRef::new("test", set), Arc::new(public))
}
