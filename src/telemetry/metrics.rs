//! Metric instrument factories for disco-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"disco-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("disco-rs")
}

/// Counter: workflow state transitions.
/// Labels: `workflow`, `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("disco.workflow.state_transitions")
        .with_description("Number of workflow state transitions")
        .build()
}

/// Counter: inbound events dropped because their id was already processed.
/// Labels: `workflow`.
pub fn duplicate_events() -> Counter<u64> {
    meter()
        .u64_counter("disco.workflow.duplicate_events")
        .with_description("Number of duplicate inbound events ignored")
        .build()
}

/// Counter: outbound sends that failed.
/// Labels: `workflow`, `trigger` ("alarm" | "command").
pub fn delivery_failures() -> Counter<u64> {
    meter()
        .u64_counter("disco.outbox.delivery_failures")
        .with_description("Number of failed outbound sends")
        .build()
}

/// Counter: scheduled transitions rearmed for a retry.
/// Labels: `workflow`.
pub fn retries_scheduled() -> Counter<u64> {
    meter()
        .u64_counter("disco.workflow.retries_scheduled")
        .with_description("Number of scheduled retries after a failed send")
        .build()
}

/// Counter: snapshot writes.
/// Labels: `workflow`, `result` ("ok" | "error").
pub fn snapshot_writes() -> Counter<u64> {
    meter()
        .u64_counter("disco.store.snapshot_writes")
        .with_description("Number of snapshot writes")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("disco.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
