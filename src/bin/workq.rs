//! workq CLI — runs the queue and worker pools against synthetic work.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use workq::config::Config;
use workq::dispatch::{PoolReport, parallelize, parallelize_stream, parallelize_until};
use workq::queue::DedupQueue;
use workq::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "workq", about = "Fair, stingy work queue demos")]
struct Cli {
    /// Worker count (overrides WORKQ_WORKERS)
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Simulated time per item, in milliseconds
    #[arg(long, global = true, default_value_t = 5)]
    work_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-add the same keys repeatedly and watch them collapse
    Reconcile {
        /// Distinct keys
        #[arg(long, default_value_t = 10)]
        keys: u32,
        /// How many times every key is re-added
        #[arg(long, default_value_t = 5)]
        rounds: u32,
    },
    /// Process a fixed batch of items
    Batch {
        /// Items 1..=N
        #[arg(long, default_value_t = 20)]
        items: u32,
        /// Request shutdown after this many milliseconds
        #[arg(long)]
        cancel_after_ms: Option<u64>,
    },
    /// Process a generated stream until the deadline
    Stream {
        /// Run time in milliseconds
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_telemetry(config.telemetry())?;

    let workers = cli.workers.unwrap_or(config.workers);
    if workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }
    let work_time = Duration::from_millis(cli.work_ms);

    match cli.command {
        Command::Reconcile { keys, rounds } => {
            cmd_reconcile(workers, work_time, keys, rounds).await
        }
        Command::Batch {
            items,
            cancel_after_ms,
        } => cmd_batch(workers, work_time, items, cancel_after_ms).await,
        Command::Stream { duration_ms } => {
            cmd_stream(workers, work_time, Duration::from_millis(duration_ms)).await
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        token.cancel();
    });
}

async fn cmd_reconcile(
    workers: usize,
    work_time: Duration,
    keys: u32,
    rounds: u32,
) -> anyhow::Result<()> {
    let queue = Arc::new(DedupQueue::<u32>::new());
    let passes = Arc::new(AtomicUsize::new(0));

    let consumers: Vec<_> = (0..workers)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let passes = Arc::clone(&passes);
            tokio::task::spawn_blocking(move || {
                while let Some(key) = queue.get() {
                    debug!(worker = id, key, "reconciling");
                    std::thread::sleep(work_time);
                    passes.fetch_add(1, Ordering::Relaxed);
                    queue.done(&key);
                }
                debug!(worker = id, "queue shut down");
            })
        })
        .collect();

    let ctrl_c = CancellationToken::new();
    cancel_on_ctrl_c(&ctrl_c);

    let mut adds = 0usize;
    for round in 0..rounds {
        if ctrl_c.is_cancelled() {
            break;
        }
        for key in 0..keys {
            queue.add(key);
            adds += 1;
        }
        info!(round, queued = queue.len(), "round added");
        tokio::time::sleep(work_time / 2).await;
    }

    queue.shut_down();
    for consumer in consumers {
        consumer.await?;
    }

    println!(
        "adds issued: {adds}, passes run: {}",
        passes.load(Ordering::Relaxed)
    );
    Ok(())
}

async fn cmd_batch(
    workers: usize,
    work_time: Duration,
    items: u32,
    cancel_after_ms: Option<u64>,
) -> anyhow::Result<()> {
    let work = move |item: u32| async move {
        tokio::time::sleep(work_time).await;
        debug!(item, "processed");
    };

    let report = match cancel_after_ms {
        None => parallelize(workers, 1..=items, work).await,
        Some(ms) => {
            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(&shutdown);
            let deadline = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                deadline.cancel();
            });
            parallelize_until(&shutdown, workers, 1..=items, work).await
        }
    };

    print_report(&report, items as usize);
    Ok(())
}

async fn cmd_stream(workers: usize, work_time: Duration, duration: Duration) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(&shutdown);

    let (tx, rx) = async_channel::bounded(16);
    let generator = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut next = 0u64;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = tx.send(next) => {
                        if sent.is_err() {
                            break;
                        }
                        next += 1;
                    }
                }
            }
            next
        })
    };

    let deadline = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        deadline.cancel();
    });

    let work = move |item: u64| async move {
        tokio::time::sleep(work_time).await;
        debug!(item, "processed");
    };
    let report = parallelize_stream(&shutdown, workers, rx, work).await;
    let generated = generator.await?;

    print_report(&report, generated as usize);
    Ok(())
}

fn print_report(report: &PoolReport, offered: usize) {
    println!(
        "workers: {}, offered: {offered}, delivered: {}, faulted workers: {}",
        report.workers, report.delivered, report.faulted
    );
}
