//! Worker pools that apply a callback to items from a shared source.
//!
//! Every shape follows the same pattern: spawn N workers as tokio tasks,
//! let each pull from one shared channel until the source is exhausted or
//! shutdown is requested, then join them all before returning.
//!
//! Shutdown is cooperative. It is checked between items (or raced against
//! the next item for streams) and never interrupts a running callback.
//!
//! Dropping a pool future before it finishes (say, under a timeout) stops
//! its workers at their next checkpoint instead of leaving them running.
//!
//! A panic inside the callback ends only the worker that raised it. The
//! panic is logged and counted in [`PoolReport::faulted`]; siblings keep
//! going and the caller never sees it. The faulted item is not retried.

mod bounded;
mod stream;

pub use bounded::{parallelize, parallelize_until};
pub use stream::parallelize_stream;

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info, warn};

use crate::telemetry::worker::{record_worker_exit, start_worker_span};

/// Summary of a finished pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Workers spawned.
    pub workers: usize,
    /// Items handed to the callback, including any that panicked.
    pub delivered: usize,
    /// Workers that ended by panicking.
    pub faulted: usize,
}

/// Where a worker gets its next item from.
struct Source<T> {
    rx: Receiver<T>,
    /// Pool-local token: a child of the caller's token, or a fresh one for
    /// pools without shutdown. Also cancelled when the pool future is dropped.
    shutdown: CancellationToken,
    checkpoint: Checkpoint,
}

#[derive(Clone, Copy)]
enum Checkpoint {
    /// Check shutdown, then pull. For pre-loaded, closed channels.
    BeforePull,
    /// Race shutdown against the next item. For open-ended channels.
    Race,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            shutdown: self.shutdown.clone(),
            checkpoint: self.checkpoint,
        }
    }
}

enum Next<T> {
    Item(T),
    Exhausted,
    Cancelled,
}

impl<T> Source<T> {
    fn bounded(rx: Receiver<T>, shutdown: CancellationToken) -> Self {
        Self {
            rx,
            shutdown,
            checkpoint: Checkpoint::BeforePull,
        }
    }

    fn stream(rx: Receiver<T>, shutdown: CancellationToken) -> Self {
        Self {
            rx,
            shutdown,
            checkpoint: Checkpoint::Race,
        }
    }

    async fn next(&self) -> Next<T> {
        match self.checkpoint {
            Checkpoint::BeforePull => {
                if self.shutdown.is_cancelled() {
                    return Next::Cancelled;
                }
                self.rx.recv().await.map_or(Next::Exhausted, Next::Item)
            }
            Checkpoint::Race => tokio::select! {
                _ = self.shutdown.cancelled() => Next::Cancelled,
                item = self.rx.recv() => item.map_or(Next::Exhausted, Next::Item),
            },
        }
    }
}

/// Spawn `workers` tasks over `source` and wait for all of them.
///
/// If this future is dropped before the join completes, the pool token is
/// cancelled and the workers stop at their next checkpoint.
async fn run_pool<T, F, Fut>(
    pool: &'static str,
    workers: usize,
    source: Source<T>,
    work: F,
) -> PoolReport
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let _stop_on_drop = source.shutdown.clone().drop_guard();
    let workers = workers.max(1);
    let work = Arc::new(work);
    let delivered = Arc::new(AtomicUsize::new(0));

    let handles: Vec<(usize, JoinHandle<()>)> = (0..workers)
        .map(|id| {
            let span = start_worker_span(pool, id);
            let worker = run_worker(
                id,
                source.clone(),
                Arc::clone(&work),
                Arc::clone(&delivered),
            );
            (id, tokio::spawn(worker.instrument(span)))
        })
        .collect();
    // Only the workers hold the source now.
    drop(source);

    let mut faulted = 0;
    for (id, handle) in handles {
        if let Err(e) = handle.await {
            faulted += 1;
            if e.is_panic() {
                let message = panic_message(e.into_panic());
                error!(pool, worker = id, panic = %message, "worker panicked");
            } else {
                warn!(pool, worker = id, error = %e, "worker task cancelled");
            }
        }
    }

    PoolReport {
        workers,
        delivered: delivered.load(Ordering::Relaxed),
        faulted,
    }
}

async fn run_worker<T, F, Fut>(
    id: usize,
    source: Source<T>,
    work: Arc<F>,
    delivered: Arc<AtomicUsize>,
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut handled = 0;
    loop {
        match source.next().await {
            Next::Item(item) => {
                delivered.fetch_add(1, Ordering::Relaxed);
                handled += 1;
                work(item).await;
            }
            Next::Exhausted => {
                record_worker_exit(&Span::current(), handled, "exhausted");
                return;
            }
            Next::Cancelled => {
                info!(worker = id, "shutdown received");
                record_worker_exit(&Span::current(), handled, "shutdown");
                return;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
