//! Integration tests for telemetry initialization and span helpers.

use disco_rs::telemetry::{DEPLOYMENT_ENVIRONMENT, TelemetryConfig};
use opentelemetry::KeyValue;

fn telemetry_config(environment: &str) -> TelemetryConfig {
    TelemetryConfig {
        endpoint: None,
        service_name: "disco-test".to_string(),
        environment: environment.to_string(),
        log_level: "debug".to_string(),
    }
}

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    let config = telemetry_config("dev");
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    if let Ok(guard) = disco_rs::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn resource_is_tagged_with_service_and_environment() {
    let resource = telemetry_config("prod").resource();
    let attribute = |name: &str| {
        resource
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, value)| value.to_string())
    };
    assert_eq!(attribute(DEPLOYMENT_ENVIRONMENT).as_deref(), Some("prod"));
    assert_eq!(attribute("service.name").as_deref(), Some("disco-test"));
    assert_eq!(
        attribute("service.version").as_deref(),
        Some(env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn event_span_creates_and_records_transition() {
    let span = disco_rs::telemetry::workflow::start_event_span(
        "saturday-disco",
        "command",
        Some("m-1"),
        "pending",
    );
    disco_rs::telemetry::workflow::record_state_transition(&span, "pending", "invite_sent");
}

#[test]
fn alarm_span_has_no_event_id() {
    let span = disco_rs::telemetry::workflow::start_event_span(
        "lunchtime-disco",
        "alarm",
        None,
        "pending",
    );
    let _enter = span.enter();
    disco_rs::telemetry::workflow::record_state_transition(&span, "pending", "pending");
}

#[test]
fn metrics_record_without_a_provider() {
    let labels = [KeyValue::new("workflow", "saturday-disco")];
    disco_rs::telemetry::metrics::state_transitions().add(1, &labels);
    disco_rs::telemetry::metrics::duplicate_events().add(1, &labels);
    disco_rs::telemetry::metrics::delivery_failures().add(1, &labels);
    disco_rs::telemetry::metrics::retries_scheduled().add(1, &labels);
    disco_rs::telemetry::metrics::snapshot_writes().add(1, &labels);
    disco_rs::telemetry::metrics::operation_duration_ms()
        .record(1.5, &[KeyValue::new("operation", "outbox.send")]);
}
