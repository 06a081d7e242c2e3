//! Worker pool: work-stealing runtime for per-file counting tasks.
//!
//! # Architecture
//!
//! - **Executor**: fixed worker threads polling spawned futures, with a global
//!   injector and per-worker deques.
//! - **Join**: fan-in combinators that spawn a batch of futures and collect
//!   their outputs in input order.
//!
//! I/O never blocks a worker. A task suspended on a read is resumed by its
//! waker, which re-enqueues it on the pool from the driver thread.

pub mod executor;
pub mod join;
pub mod metrics;
mod task;

pub use executor::{on_worker_thread, PoolHandle, WorkerPool};
pub use join::{when_all, when_all_settled, WhenAll, WhenAllSettled};
pub use metrics::{PoolMetrics, WorkerMetricsLocal};
pub use task::JoinHandle;
