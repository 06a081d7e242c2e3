//! Error type shared by the I/O context, worker pool, and coordinator.
//!
//! File-level failures carry the offending path so the CLI can name the file
//! when it reports the first failure of a run.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Top-level error for a statistics run.
#[derive(Error, Debug)]
pub enum Error {
    /// The file could not be opened (missing, permission denied, bad path).
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read completed with an error reported by the kernel.
    #[error("failed to read {} at offset {offset}: {source}", path.display())]
    Read {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// The io_uring backend or its driver thread could not be set up.
    #[error("io_uring context unavailable: {0}")]
    ContextInit(#[source] io::Error),

    /// An operation was submitted after shutdown began, or was still pending
    /// when the context was torn down.
    #[error("io_uring context is shut down")]
    ContextShutdown,

    /// A worker pool thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] io::Error),

    /// Work was submitted to a worker pool that is shutting down.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// A task panicked on a worker thread.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Path of the file this error refers to, if it is a file-level error.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Open { path, .. } | Error::Read { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Underlying OS error kind for file-level errors.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Open { source, .. }
            | Error::Read { source, .. }
            | Error::ContextInit(source) => Some(source.kind()),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
