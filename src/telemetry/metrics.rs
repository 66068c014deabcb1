//! Metric instrument factories for autoworker.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a configured provider the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("autoworker")
}

/// Counter: work items submitted.
/// Labels: `mode` ("fire_and_forget" | "await").
pub fn items_submitted() -> Counter<u64> {
    meter()
        .u64_counter("autoworker.items.submitted")
        .with_description("Number of work items submitted")
        .build()
}

/// Counter: work items that left the queue and ran.
/// Labels: `result` ("ok" | "error" | "panic" | "abandoned").
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("autoworker.items.processed")
        .with_description("Number of work items processed")
        .build()
}

/// Counter: partitions created on first submission for a key.
pub fn partitions_created() -> Counter<u64> {
    meter()
        .u64_counter("autoworker.partitions.created")
        .with_description("Number of partitions created")
        .build()
}

/// Counter: idle partitions removed by a sweep.
pub fn partitions_reclaimed() -> Counter<u64> {
    meter()
        .u64_counter("autoworker.partitions.reclaimed")
        .with_description("Number of idle partitions reclaimed")
        .build()
}

/// Histogram: time spent in the processing function, in milliseconds.
pub fn item_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("autoworker.item.duration_ms")
        .with_description("Processing function duration in milliseconds")
        .with_unit("ms")
        .build()
}
