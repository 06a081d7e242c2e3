//! Concurrent per-file line statistics over io_uring.
//!
//! ## Scope
//! Reads a list of files concurrently and reports, per file, the number of
//! newline bytes and of all other bytes, from which the mean line length is
//! derived.
//!
//! ## Key invariants
//! - Buffers handed to the kernel stay owned by the I/O driver until their
//!   completion arrives; shutdown cancels and drains before releasing them.
//! - Each file has exactly one outstanding read, and only the bytes a read
//!   actually returned are scanned.
//! - Results are reported in input order regardless of completion order.
//! - Per-file tasks run on pool workers only; the I/O driver thread just
//!   submits, reaps, and wakes.
//!
//! ## Flow
//! `paths -> open (caller) -> count_file tasks (pool) -> read_at (io_uring) -> WordStats`
//!
//! ## Notable entry points
//! - [`run`] / [`Runtime`]: fan-out/fan-in over a file list.
//! - [`IoContext`] / [`AsyncFile`]: completion-based reads.
//! - [`WorkerPool`], [`when_all`], [`when_all_settled`]: the task runtime.

pub mod accumulate;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod file;
pub mod io_context;
pub mod scheduler;
pub mod stats;

pub use accumulate::count_file;
pub use config::{IoContextConfig, RunConfig, WorkerPoolConfig};
pub use coordinator::{run, FileReport, Runtime};
pub use error::{Error, Result};
pub use file::{AsyncFile, ReadBuf};
pub use io_context::{IoContext, IoScheduler, IoStats};
pub use scheduler::{
    when_all, when_all_settled, JoinHandle, PoolHandle, PoolMetrics, WorkerPool,
};
pub use stats::{WordStats, READ_BUFFER_SIZE};
