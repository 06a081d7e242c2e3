//! Fan-out/fan-in over the input files.
//!
//! ```text
//! caller thread            worker pool                   io driver
//! ─────────────            ───────────                   ─────────
//! open all files
//! block_on(when_all) ───►  count_file(f0) ── read_at ──► io_uring
//!      (waits)             count_file(f1) ── read_at ──►   ...
//!                          ...            ◄── wake ───── CQE
//!      ◄──────────────── Vec<WordStats> in input order
//! ```
//!
//! The [`Runtime`] owns both execution resources. Its pool is declared first
//! so it is dropped first: tasks abandoned on an early failure release their
//! buffers and descriptors before the I/O context drains and closes the ring.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::future::{self, Either};
use tracing::{info, warn};

use crate::accumulate::count_file;
use crate::config::RunConfig;
use crate::error::Result;
use crate::file::AsyncFile;
use crate::io_context::{IoContext, IoStats};
use crate::scheduler::{when_all, when_all_settled, PoolMetrics, WorkerPool};
use crate::stats::WordStats;

/// Outcome for one input file of a keep-going run.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<WordStats>,
}

/// Execution resources for statistics runs.
pub struct Runtime {
    pool: WorkerPool,
    io: IoContext,
    buffer_size: usize,
}

impl Runtime {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let io = IoContext::new(config.io)?;
        let pool = WorkerPool::new(config.pool)?;
        Ok(Self {
            pool,
            io,
            buffer_size: config.buffer_size,
        })
    }

    /// Counts every file; all-or-nothing.
    ///
    /// Files are opened on the calling thread before any task starts, so an
    /// unopenable file fails the run without reading anything. Otherwise the
    /// first failing task decides the error; results are in input order.
    pub fn run<P: AsRef<Path>>(&self, files: &[P]) -> Result<Vec<WordStats>> {
        let started = Instant::now();
        let scheduler = self.io.scheduler();
        let handles = files
            .iter()
            .map(|p| AsyncFile::open_read_only(&scheduler, p))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|err| warn!(error = %err, "open failed"))?;

        let buffer_size = self.buffer_size;
        let jobs = handles.into_iter().map(move |f| count_file(f, buffer_size));
        let pool = self.pool.handle();
        let out = self
            .pool
            .block_on(async move { when_all(&pool, jobs).await })
            .and_then(|r| r);

        match &out {
            Ok(stats) => info!(
                files = stats.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run complete"
            ),
            Err(err) => warn!(error = %err, "run failed"),
        }
        out
    }

    /// Counts every file and reports each outcome separately.
    ///
    /// An unopenable or unreadable file fails only its own report. The outer
    /// error is reserved for the pool itself going away.
    pub fn run_settled<P: AsRef<Path>>(&self, files: &[P]) -> Result<Vec<FileReport>> {
        let started = Instant::now();
        let scheduler = self.io.scheduler();
        let buffer_size = self.buffer_size;

        let paths: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let jobs: Vec<_> = paths
            .iter()
            .map(|p| match AsyncFile::open_read_only(&scheduler, p) {
                Ok(f) => Either::Left(count_file(f, buffer_size)),
                Err(err) => Either::Right(future::ready(Err(err))),
            })
            .collect();

        let pool = self.pool.handle();
        let results = self
            .pool
            .block_on(async move { when_all_settled(&pool, jobs).await })?;

        let reports: Vec<FileReport> = paths
            .into_iter()
            .zip(results)
            .map(|(path, result)| FileReport { path, result })
            .collect();

        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        if failed > 0 {
            warn!(files = reports.len(), failed, "run finished with failures");
        } else {
            info!(
                files = reports.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run complete"
            );
        }
        Ok(reports)
    }

    /// Current I/O counters.
    pub fn io_stats(&self) -> IoStats {
        self.io.stats()
    }

    /// Tears down the pool, then the I/O context.
    pub fn shutdown(self) -> (PoolMetrics, IoStats) {
        let Runtime { pool, mut io, .. } = self;
        let pool_metrics = pool.shutdown();
        let io_stats = io.shutdown();
        (pool_metrics, io_stats)
    }
}

/// Counts `files` with a fresh runtime built from `config`.
///
/// The runtime is torn down before returning on every path.
pub fn run<P: AsRef<Path>>(files: &[P], config: RunConfig) -> Result<Vec<WordStats>> {
    let runtime = Runtime::new(config)?;
    let out = runtime.run(files);
    runtime.shutdown();
    out
}
