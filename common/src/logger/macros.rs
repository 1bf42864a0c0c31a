use tracing::{Level, Span, field};

use super::TraceId;

/// Root span for one feed run (subscription, replay, batch).
///
/// `feed_id` is left empty so callers can record it once the feed is known.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(
        Level::INFO,
        "root",
        name = %name,
        trace_id = %trace_id,
        feed_id = field::Empty
    )
}

/// Child span, inherits the trace id from the current root.
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(Level::INFO, "child", name = %name)
}
