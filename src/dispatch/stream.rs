//! Pool over an open-ended stream of items.

use std::future::Future;

use async_channel::Receiver;
use tokio_util::sync::CancellationToken;

use super::{PoolReport, Source, run_pool};

/// Feed items from `source` to `workers` tasks until `shutdown` fires.
///
/// Each worker waits on the next item and on `shutdown` at the same time and
/// stops as soon as shutdown wins. A callback already running is not
/// interrupted. If every sender of `source` is dropped and the channel is
/// empty, workers stop too, since nothing more can arrive.
pub async fn parallelize_stream<T, F, Fut>(
    shutdown: &CancellationToken,
    workers: usize,
    source: Receiver<T>,
    work: F,
) -> PoolReport
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let source = Source::stream(source, shutdown.child_token());
    run_pool("parallelize_stream", workers, source, work).await
}
