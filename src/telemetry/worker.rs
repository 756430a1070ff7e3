//! Worker span helpers.
//!
//! Every dispatcher worker runs inside a span so its log lines carry the
//! pool and worker id.

use tracing::Span;

/// Start a span for one dispatcher worker.
///
/// The `worker.delivered` field is declared empty and filled in by
/// [`record_worker_exit`].
pub fn start_worker_span(pool: &str, worker_id: usize) -> Span {
    tracing::debug_span!(
        "worker.run",
        "worker.pool" = pool,
        "worker.id" = worker_id,
        "worker.delivered" = tracing::field::Empty,
    )
}

/// Record how many items a worker handled and emit its exit event.
pub fn record_worker_exit(span: &Span, delivered: usize, reason: &str) {
    span.record("worker.delivered", delivered);
    span.in_scope(|| {
        tracing::debug!(delivered, reason, "worker stopped");
    });
}
