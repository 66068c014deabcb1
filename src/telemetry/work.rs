//! Drain-loop span helpers.

use tracing::Span;

use crate::worker::WorkerId;

/// Start the span a drain loop runs inside.
///
/// `worker.items` is declared empty and filled by [`record_drained`] when the
/// loop goes idle.
pub fn start_drain_span(worker_id: WorkerId, partition: Option<&str>) -> Span {
    tracing::debug_span!(
        "worker.drain",
        "worker.id" = %worker_id,
        "worker.partition" = partition.unwrap_or("-"),
        "worker.items" = tracing::field::Empty,
    )
}

/// Record how many items a loop processed before deactivating.
pub fn record_drained(span: &Span, items: u64) {
    span.record("worker.items", items);
}
