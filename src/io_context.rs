//! io_uring completion context with a dedicated driver thread.
//!
//! # Architecture
//!
//! ```text
//!   worker threads                         driver thread
//!   ──────────────                         ─────────────
//!   IoScheduler::submit_read ──► channel ──► backlog ──► SQ ──► kernel
//!            │                                                    │
//!            └── write(eventfd) ──► armed eventfd read ◄── CQ ◄───┘
//!                                        │
//!                                        ▼
//!                           oneshot reply ──► task waker ──► worker pool
//! ```
//!
//! - Only the driver thread touches the ring.
//! - Submitters wake the driver by bumping an eventfd that the driver keeps a
//!   read armed on, so the driver can block in `submit_and_wait` without
//!   missing new work or a stop request.
//! - Each read owns its buffer and an `Arc<File>` until its CQE is reaped.
//!
//! # Shutdown
//!
//! `accepting` is cleared first, so no read can be issued once shutdown has
//! begun. The driver then cancels everything still in flight and keeps
//! reaping until the kernel has released every buffer before it exits.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel as chan;
use futures::channel::oneshot;
use io_uring::{opcode, types, IoUring};
use tracing::{debug, trace, warn};

use crate::config::IoContextConfig;
use crate::error::{Error, Result};
use crate::file::ReadBuf;

/// `user_data` of the eventfd wakeup read.
const WAKE_TOKEN: u64 = u64::MAX;
/// `user_data` of cancellation requests issued during shutdown.
const CANCEL_TOKEN: u64 = u64::MAX - 1;
/// Consecutive failed waits tolerated while draining before buffers are leaked.
const DRAIN_WAIT_RETRIES: u32 = 16;

/// A positional read handed to the driver thread.
pub(crate) struct ReadRequest {
    pub(crate) file: Arc<File>,
    pub(crate) offset: u64,
    pub(crate) buf: ReadBuf,
    pub(crate) reply: oneshot::Sender<ReadCompletion>,
}

/// Result of a read, with the buffer handed back to the submitter.
pub(crate) struct ReadCompletion {
    pub(crate) result: io::Result<usize>,
    pub(crate) buf: ReadBuf,
}

/// Counters for operations seen by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Reads accepted by the scheduler.
    pub submitted: u64,
    /// Reads that completed successfully (including end of file).
    pub completed: u64,
    /// Reads that completed with an OS error.
    pub failed: u64,
}

struct Shared {
    accepting: AtomicBool,
    stop: AtomicBool,
    wake_fd: OwnedFd,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn wake(&self) {
        let one: u64 = 1;
        // SAFETY: writes 8 bytes from a live u64 to an eventfd we own.
        let rc = unsafe {
            libc::write(
                self.wake_fd.as_raw_fd(),
                (&one as *const u64).cast::<libc::c_void>(),
                std::mem::size_of::<u64>(),
            )
        };
        if rc < 0 {
            trace!(error = %io::Error::last_os_error(), "eventfd wake failed");
        }
    }

    fn stats(&self) -> IoStats {
        IoStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handle used to start asynchronous reads on an [`IoContext`].
///
/// `Clone`, `Send` and `Sync`; any thread may submit.
#[derive(Clone)]
pub struct IoScheduler {
    tx: chan::Sender<ReadRequest>,
    shared: Arc<Shared>,
}

impl IoScheduler {
    /// Hands a read to the driver thread.
    ///
    /// Fails with [`Error::ContextShutdown`] once shutdown has begun.
    pub(crate) fn submit_read(&self, req: ReadRequest) -> Result<()> {
        if !self.shared.accepting.load(Ordering::Acquire) {
            return Err(Error::ContextShutdown);
        }
        self.tx.send(req).map_err(|_| Error::ContextShutdown)?;
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.wake();
        Ok(())
    }

    /// True until the owning context starts shutting down.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }
}

impl fmt::Debug for IoScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoScheduler")
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

/// io_uring context that owns the ring and its driver thread.
///
/// Constructed once per run; dropping it stops and joins the driver.
pub struct IoContext {
    scheduler: IoScheduler,
    driver: Option<JoinHandle<()>>,
}

impl IoContext {
    /// Sets up the ring and starts the driver thread.
    ///
    /// Fails with [`Error::ContextInit`] if io_uring is unavailable.
    pub fn new(config: IoContextConfig) -> Result<Self> {
        config.validate()?;

        let ring = IoUring::new(config.ring_entries).map_err(Error::ContextInit)?;

        // SAFETY: eventfd has no memory-safety preconditions.
        let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if raw < 0 {
            return Err(Error::ContextInit(io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let wake_fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let shared = Arc::new(Shared {
            accepting: AtomicBool::new(true),
            stop: AtomicBool::new(false),
            wake_fd,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let (tx, rx) = chan::unbounded();
        let driver = Driver {
            ring,
            rx,
            shared: Arc::clone(&shared),
            backlog: VecDeque::new(),
            in_flight: HashMap::new(),
            max_in_flight: (config.ring_entries - 1) as usize,
            next_id: 1,
            wake_buf: Box::new(0),
            wake_armed: false,
            stopping: false,
            reaped: Vec::with_capacity(config.ring_entries as usize),
        };

        let ring_entries = config.ring_entries;
        let handle = thread::Builder::new()
            .name("wordstats-io-driver".into())
            .spawn(move || {
                debug!(ring_entries, "io driver started");
                driver.run();
            })
            .map_err(Error::ContextInit)?;

        Ok(Self {
            scheduler: IoScheduler { tx, shared },
            driver: Some(handle),
        })
    }

    /// Scheduler handle for starting reads against this context.
    pub fn scheduler(&self) -> IoScheduler {
        self.scheduler.clone()
    }

    pub fn stats(&self) -> IoStats {
        self.scheduler.shared.stats()
    }

    /// Stops accepting reads, stops the driver, and joins it.
    ///
    /// Idempotent. Reads still pending resolve to [`Error::ContextShutdown`].
    pub fn shutdown(&mut self) -> IoStats {
        let shared = &self.scheduler.shared;
        shared.accepting.store(false, Ordering::Release);
        shared.stop.store(true, Ordering::Release);
        shared.wake();

        if let Some(handle) = self.driver.take() {
            if handle.join().is_err() {
                warn!("io driver thread panicked");
            }
        }
        shared.stats()
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Driver
// ============================================================================

struct Driver {
    ring: IoUring,
    rx: chan::Receiver<ReadRequest>,
    shared: Arc<Shared>,
    /// Requests received but not yet pushed to the SQ.
    backlog: VecDeque<ReadRequest>,
    /// Requests owned by the kernel, keyed by `user_data`.
    in_flight: HashMap<u64, ReadRequest>,
    max_in_flight: usize,
    next_id: u64,
    wake_buf: Box<u64>,
    wake_armed: bool,
    stopping: bool,
    reaped: Vec<(u64, i32)>,
}

impl Driver {
    fn run(mut self) {
        loop {
            self.arm_wake();
            if self.shared.stop.load(Ordering::Acquire) {
                break;
            }
            self.drain_channel();
            self.push_backlog();

            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(err) if is_transient(&err) => {}
                Err(err) => {
                    warn!(error = %err, "io_uring submit failed; stopping driver");
                    self.shared.accepting.store(false, Ordering::Release);
                    break;
                }
            }
            self.reap();
        }

        self.stopping = true;
        self.drain_in_flight();
        let stats = self.shared.stats();
        debug!(
            submitted = stats.submitted,
            completed = stats.completed,
            failed = stats.failed,
            abandoned = self.backlog.len() + self.rx.len(),
            "io driver stopped"
        );
    }

    /// Keeps one read outstanding on the eventfd so submitters can wake us.
    fn arm_wake(&mut self) {
        if self.wake_armed || self.stopping {
            return;
        }
        let ptr = (&mut *self.wake_buf as *mut u64).cast::<u8>();
        let entry = opcode::Read::new(
            types::Fd(self.shared.wake_fd.as_raw_fd()),
            ptr,
            std::mem::size_of::<u64>() as u32,
        )
        .build()
        .user_data(WAKE_TOKEN);

        // SAFETY: `wake_buf` is heap-allocated, owned by the driver, and is not
        // released until the wake read has been reaped (see `drain_in_flight`).
        if unsafe { self.ring.submission().push(&entry) }.is_ok() {
            self.wake_armed = true;
        }
    }

    fn drain_channel(&mut self) {
        self.backlog.extend(self.rx.try_iter());
    }

    fn push_backlog(&mut self) {
        while self.in_flight.len() < self.max_in_flight {
            let Some(mut req) = self.backlog.pop_front() else {
                break;
            };

            let id = self.next_id;
            // Larger buffers are filled in several short reads.
            let len = u32::try_from(req.buf.capacity()).unwrap_or(u32::MAX);
            let entry = opcode::Read::new(
                types::Fd(req.file.as_raw_fd()),
                req.buf.as_mut_ptr(),
                len,
            )
            .offset(req.offset)
            .build()
            .user_data(id);

            // SAFETY: the buffer and file are kept alive in `in_flight` until
            // the matching CQE is reaped.
            if unsafe { self.ring.submission().push(&entry) }.is_err() {
                self.backlog.push_front(req);
                break;
            }
            self.next_id += 1;
            if self.next_id >= CANCEL_TOKEN {
                self.next_id = 1;
            }
            self.in_flight.insert(id, req);
        }
    }

    fn reap(&mut self) {
        let mut reaped = std::mem::take(&mut self.reaped);
        reaped.extend(
            self.ring
                .completion()
                .map(|cqe| (cqe.user_data(), cqe.result())),
        );
        for &(user_data, res) in &reaped {
            self.complete(user_data, res);
        }
        reaped.clear();
        self.reaped = reaped;
    }

    fn complete(&mut self, user_data: u64, res: i32) {
        match user_data {
            WAKE_TOKEN => self.wake_armed = false,
            CANCEL_TOKEN => {}
            id => {
                let Some(req) = self.in_flight.remove(&id) else {
                    warn!(user_data = id, "completion for unknown operation");
                    return;
                };
                if self.stopping && res == -libc::ECANCELED {
                    // Dropping the reply resolves the waiter to ContextShutdown.
                    return;
                }

                let result = if res < 0 {
                    self.shared.failed.fetch_add(1, Ordering::Relaxed);
                    Err(io::Error::from_raw_os_error(-res))
                } else {
                    self.shared.completed.fetch_add(1, Ordering::Relaxed);
                    Ok(res as usize)
                };
                trace!(user_data = id, offset = req.offset, res, "read completed");

                let ReadRequest { buf, reply, .. } = req;
                let _ = reply.send(ReadCompletion { result, buf });
            }
        }
    }

    /// Cancels every outstanding operation and reaps until the kernel has
    /// released all buffers.
    fn drain_in_flight(&mut self) {
        let mut to_cancel: Vec<u64> = self.in_flight.keys().copied().collect();
        if self.wake_armed {
            // The wake read may still be unsubmitted; completing it through the
            // eventfd avoids racing a cancel against its submission.
            self.shared.wake();
        }

        let mut failed_waits = 0u32;
        while !self.in_flight.is_empty() || self.wake_armed {
            while let Some(&target) = to_cancel.last() {
                let entry = opcode::AsyncCancel::new(target)
                    .build()
                    .user_data(CANCEL_TOKEN);
                // SAFETY: cancel entries reference no memory.
                if unsafe { self.ring.submission().push(&entry) }.is_err() {
                    break;
                }
                to_cancel.pop();
            }

            match self.ring.submit_and_wait(1) {
                Ok(_) => failed_waits = 0,
                Err(err) if is_transient(&err) => {}
                Err(err) => {
                    failed_waits += 1;
                    if failed_waits >= DRAIN_WAIT_RETRIES {
                        warn!(
                            error = %err,
                            in_flight = self.in_flight.len(),
                            "cannot drain io_uring; leaking in-flight buffers"
                        );
                        self.leak_in_flight();
                        return;
                    }
                }
            }
            self.reap();
        }
    }

    /// Leaks buffers the kernel may still write to.
    fn leak_in_flight(&mut self) {
        for (_, req) in self.in_flight.drain() {
            std::mem::forget(req);
        }
        if self.wake_armed {
            std::mem::forget(std::mem::replace(&mut self.wake_buf, Box::new(0)));
            self.wake_armed = false;
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINTR) | Some(libc::EAGAIN) | Some(libc::EBUSY)
    )
}
