//! Integration tests for telemetry initialization and span helpers.

use autoworker::WorkerId;
use autoworker::config::DispatchConfig;
use autoworker::telemetry::{TelemetryConfig, init_telemetry, work};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process, so a second
    // init in the same binary may return Err; that is acceptable.
    let config = TelemetryConfig::from(&DispatchConfig::default());
    assert!(config.endpoint.is_none());
    let _guard = init_telemetry(config);
}

#[test]
fn drain_span_creates_and_records_items() {
    let span = work::start_drain_span(WorkerId::new(), Some("acct-7"));
    work::record_drained(&span, 12);

    let span = work::start_drain_span(WorkerId::new(), None);
    work::record_drained(&span, 0);
}
