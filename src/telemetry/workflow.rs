//! Workflow event span helpers.
//!
//! One span per event the engine worker processes. The `workflow.state`
//! field starts as the state the event found and is overwritten by
//! [`record_state_transition`].

use tracing::Span;

/// Start a span for one processed event.
///
/// `source` is "alarm", "command" or "message"; `event_id` is the inbound
/// identifier when there is one.
pub fn start_event_span(workflow: &str, source: &str, event_id: Option<&str>, state: &str) -> Span {
    tracing::info_span!(
        "workflow.event",
        "workflow.key" = workflow,
        "workflow.source" = source,
        "workflow.event_id" = event_id.unwrap_or_default(),
        "workflow.state" = state,
    )
}

/// Record a state transition on `span`.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("workflow.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
