//! # workq
//!
//! Building blocks for reconciliation-style worker loops.
//!
//! Provides a fair, stingy, deduplicating blocking queue ([`queue`]) and
//! worker pools that apply a callback to a bounded set or an open stream
//! of items with cooperative shutdown ([`dispatch`]).

pub mod config;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod telemetry;

pub use dispatch::{PoolReport, parallelize, parallelize_stream, parallelize_until};
pub use queue::{DedupQueue, WorkQueue};
