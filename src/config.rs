//! Configuration for the I/O context, worker pool, and a full run.
//!
//! All defaults are conservative. Values usually come from the CLI, so
//! `validate()` reports problems as [`Error::Config`] instead of panicking.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::stats::READ_BUFFER_SIZE;

/// Default number of submission queue entries.
pub const DEFAULT_RING_ENTRIES: u32 = 256;
/// Smallest ring accepted. One slot is reserved for the driver wakeup read.
pub const MIN_RING_ENTRIES: u32 = 8;
/// Largest ring the kernel accepts without `IORING_SETUP_CLAMP`.
pub const MAX_RING_ENTRIES: u32 = 32_768;

/// io_uring context configuration.
#[derive(Clone, Copy, Debug)]
pub struct IoContextConfig {
    /// Submission queue entries. Must be a power of two.
    pub ring_entries: u32,
}

impl Default for IoContextConfig {
    fn default() -> Self {
        Self {
            ring_entries: DEFAULT_RING_ENTRIES,
        }
    }
}

impl IoContextConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.ring_entries.is_power_of_two() {
            return Err(Error::Config(format!(
                "ring_entries must be a power of two, got {}",
                self.ring_entries
            )));
        }
        if !(MIN_RING_ENTRIES..=MAX_RING_ENTRIES).contains(&self.ring_entries) {
            return Err(Error::Config(format!(
                "ring_entries must be in {MIN_RING_ENTRIES}..={MAX_RING_ENTRIES}, got {}",
                self.ring_entries
            )));
        }
        Ok(())
    }
}

/// Worker pool configuration.
///
/// | Knob         | Workload Sensitivity                 |
/// |--------------|--------------------------------------|
/// | workers      | CPU count, number of files in flight |
/// | spin_iters   | Latency between I/O completions      |
/// | park_timeout | Frequency of external wakeups        |
#[derive(Clone, Copy, Debug)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub workers: usize,

    /// Spin iterations before yielding/parking.
    ///
    /// Higher = better latency for bursty completions.
    /// Lower = less CPU waste while every task waits on I/O.
    pub spin_iters: u32,

    /// Park timeout after spinning.
    pub park_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            spin_iters: 64,
            park_timeout: Duration::from_millis(1),
        }
    }
}

impl WorkerPoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be >= 1".into()));
        }
        if self.park_timeout.is_zero() {
            return Err(Error::Config("park_timeout must be > 0".into()));
        }
        Ok(())
    }
}

/// Configuration for one statistics run.
#[derive(Clone, Copy, Debug)]
pub struct RunConfig {
    pub io: IoContextConfig,
    pub pool: WorkerPoolConfig,
    /// Bytes requested per read.
    pub buffer_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            io: IoContextConfig::default(),
            pool: WorkerPoolConfig::default(),
            buffer_size: READ_BUFFER_SIZE,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        self.io.validate()?;
        self.pool.validate()?;
        validate_buffer_size(self.buffer_size)
    }
}

/// A read buffer must hold at least one byte, or every read looks like end
/// of file, and its length must fit in an SQE's `u32` length field.
pub fn validate_buffer_size(buffer_size: usize) -> Result<()> {
    if buffer_size == 0 {
        return Err(Error::Config("buffer_size must be >= 1".into()));
    }
    if u32::try_from(buffer_size).is_err() {
        return Err(Error::Config(format!(
            "buffer_size must fit in u32, got {buffer_size}"
        )));
    }
    Ok(())
}
