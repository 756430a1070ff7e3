//! Pools over a finite set of items known up front.

use std::future::Future;

use async_channel::Receiver;
use tokio_util::sync::CancellationToken;

use super::{PoolReport, Source, run_pool};

/// Process every item once across `workers` tasks.
///
/// Items are loaded into a closed channel that the workers drain. Returns
/// after every worker has stopped. Each item reaches `work` exactly once
/// unless a worker panics, in which case that worker's remaining share may
/// be picked up by its siblings or left undone if it was the last one.
/// There is no ordering across workers.
///
/// A `workers` of 0 runs one worker.
pub async fn parallelize<T, I, F, Fut>(workers: usize, items: I, work: F) -> PoolReport
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let source = Source::bounded(preload(items), CancellationToken::new());
    run_pool("parallelize", workers, source, work).await
}

/// Like [`parallelize`], but stops early once `shutdown` is cancelled.
///
/// Each worker checks `shutdown` before taking its next item. An item that
/// is already in `work` runs to completion; items not yet taken are never
/// delivered. The pool never cancels `shutdown` itself, even when the
/// returned future is dropped early.
pub async fn parallelize_until<T, I, F, Fut>(
    shutdown: &CancellationToken,
    workers: usize,
    items: I,
    work: F,
) -> PoolReport
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let source = Source::bounded(preload(items), shutdown.child_token());
    run_pool("parallelize_until", workers, source, work).await
}

/// Load `items` into a channel and close it.
fn preload<T>(items: impl IntoIterator<Item = T>) -> Receiver<T> {
    let (tx, rx) = async_channel::unbounded();
    for item in items {
        // Unbounded with a live receiver: never full, never closed.
        let _ = tx.try_send(item);
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preload_closes_channel_after_items() {
        let rx = preload([1, 2, 3]);
        assert_eq!(rx.len(), 3);
        assert!(rx.is_closed());
        assert_eq!(rx.try_recv(), Ok(1));
    }

    #[test]
    fn preload_of_nothing_is_closed_and_empty() {
        let rx = preload(Vec::<u8>::new());
        assert!(rx.is_empty());
        assert!(rx.is_closed());
    }
}
