//! Work-Stealing Worker Pool
//!
//! # Architecture
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────┐
//!                    │                    WorkerPool                     │
//!                    │                                                   │
//!  spawn / wakeups ──┼────► Injector ──────┬────────────────────────────┤
//!  (any thread)      │      (Crossbeam)    │                            │
//!                    │                     ▼                            │
//!                    │     ┌──────────────────────────────────────┐     │
//!                    │     │  Worker 0   │  Worker 1   │ Worker N │     │
//!                    │     │  ┌───────┐  │  ┌───────┐  │ ┌──────┐ │     │
//!                    │     │  │ Deque │◄─┼─►│ Deque │◄─┼►│Deque │ │     │
//!                    │     │  │ (LIFO)│  │  │ (LIFO)│  │ │(LIFO)│ │     │
//!                    │     │  └───────┘  │  └───────┘  │ └──────┘ │     │
//!                    │     └──────────────────────────────────────┘     │
//!                    │          Shared: accepting, done, unparkers       │
//!                    └───────────────────────────────────────────────────┘
//! ```
//!
//! - N worker threads, each with a Chase-Lev deque fed by batch steals from
//!   the global injector, plus FIFO stealing from siblings.
//! - Tasks are futures. Wakers push the task back onto the injector, which is
//!   how I/O completions resume tasks on worker threads.
//! - Tiered idle strategy: spin → yield → park.
//!
//! # Correctness Invariants
//!
//! - **No spawn after shutdown**: `accepting` is cleared before workers stop;
//!   spawns fail with [`Error::PoolShutdown`] and wakeups drop the task.
//! - **No lost wakeups**: every injector push is followed by an unpark.
//! - **Panic isolation**: a panicking task is dropped; its `JoinHandle`
//!   resolves to an error and the worker keeps running.
//!
//! # Not Guaranteed
//!
//! - Draining: shutdown abandons queued and suspended tasks. Callers that need
//!   results await them (see [`WorkerPool::block_on`]) before shutting down.

use std::cell::Cell;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle as ThreadHandle};

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use crossbeam_utils::sync::{Parker, Unparker};
use futures::channel::oneshot;
use futures::FutureExt;
use tracing::{debug, warn};

use super::metrics::{PoolMetrics, WorkerMetricsLocal};
use super::task::{catch_panic, JoinHandle, Task};
use crate::config::WorkerPoolConfig;
use crate::error::{Error, Result};

thread_local! {
    /// True on threads owned by a worker pool.
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True if the calling thread is a pool worker.
pub fn on_worker_thread() -> bool {
    ON_WORKER.with(Cell::get)
}

// ============================================================================
// Shared state
// ============================================================================

/// State shared between the pool owner, handles, tasks, and workers.
///
/// # Invariants
///
/// - `stealers.len() == unparkers.len() == config.workers`
/// - `accepting` and `done` are monotonic: once cleared/set, never reverted.
pub(crate) struct Shared {
    /// Global queue for spawns and wakeups from any thread.
    injector: Injector<Arc<Task>>,

    /// `stealers[i]` steals from worker `i`'s local deque.
    stealers: Vec<Stealer<Arc<Task>>>,

    accepting: AtomicBool,

    /// Stop flag. Once true, workers exit their main loop.
    done: AtomicBool,

    unparkers: Vec<Unparker>,

    /// Round-robin counter for wakeups.
    next_unpark: AtomicUsize,

    tasks_spawned: AtomicU64,
}

impl Shared {
    /// Queues a task that was woken or freshly spawned.
    pub(crate) fn schedule(&self, task: Arc<Task>) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        self.injector.push(task);
        self.unpark_one();
    }

    fn unpark_one(&self) {
        let n = self.unparkers.len();
        if n == 0 {
            return;
        }
        let idx = self.next_unpark.fetch_add(1, Ordering::Relaxed) % n;
        self.unparkers[idx].unpark();
    }

    fn unpark_all(&self) {
        for u in &self.unparkers {
            u.unpark();
        }
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }
}

// ============================================================================
// PoolHandle
// ============================================================================

/// Scheduler handle for a [`WorkerPool`].
///
/// `Clone`, `Send` and `Sync`. Keeps the pool's shared state alive but not
/// its threads; spawning after the owner shuts down fails.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    /// Spawns `fut` onto the pool.
    ///
    /// The task runs on worker threads only. A panic inside `fut` is caught
    /// and reported through the returned handle.
    pub fn spawn<F>(&self, fut: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.shared.is_accepting() {
            return Err(Error::PoolShutdown);
        }

        let (tx, rx) = oneshot::channel();
        let wrapped = async move {
            let out = catch_panic(fut).await;
            let _ = tx.send(out);
        };

        let task = Task::new(wrapped.boxed(), Arc::downgrade(&self.shared));
        self.shared.tasks_spawned.fetch_add(1, Ordering::Relaxed);
        self.shared.schedule(task);
        Ok(JoinHandle::new(rx))
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.is_accepting()
    }

    pub fn workers(&self) -> usize {
        self.shared.stealers.len()
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("workers", &self.workers())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

// ============================================================================
// WorkerPool
// ============================================================================

/// Fixed-size pool of worker threads that poll spawned futures.
///
/// # Lifecycle
///
/// 1. Create with `WorkerPool::new(config)`; workers park until work arrives.
/// 2. Spawn via [`PoolHandle::spawn`] or run to completion with
///    [`WorkerPool::block_on`].
/// 3. Call `shutdown()` (or drop) to stop and join the workers.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Vec<ThreadHandle<WorkerMetricsLocal>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Result<Self> {
        config.validate()?;

        let mut locals = Vec::with_capacity(config.workers);
        let mut stealers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let w = Worker::new_lifo();
            stealers.push(w.stealer());
            locals.push(w);
        }

        let mut parkers = Vec::with_capacity(config.workers);
        let mut unparkers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let p = Parker::new();
            unparkers.push(p.unparker().clone());
            parkers.push(p);
        }

        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers,
            accepting: AtomicBool::new(true),
            done: AtomicBool::new(false),
            unparkers,
            next_unpark: AtomicUsize::new(0),
            tasks_spawned: AtomicU64::new(0),
        });

        let mut pool = Self {
            shared,
            threads: Vec::with_capacity(config.workers),
        };

        for (worker_id, (local, parker)) in locals.into_iter().zip(parkers).enumerate() {
            let mut ctx = WorkerCtx {
                worker_id,
                local,
                parker,
                shared: Arc::clone(&pool.shared),
                metrics: WorkerMetricsLocal::default(),
            };
            let spawned = thread::Builder::new()
                .name(format!("wordstats-worker-{worker_id}"))
                .spawn(move || {
                    ON_WORKER.with(|c| c.set(true));
                    worker_loop(config, &mut ctx);
                    ON_WORKER.with(|c| c.set(false));
                    ctx.metrics
                });
            match spawned {
                Ok(th) => pool.threads.push(th),
                // Dropping `pool` stops the workers spawned so far.
                Err(err) => return Err(Error::WorkerSpawn(err)),
            }
        }

        debug!(workers = config.workers, "worker pool started");
        Ok(pool)
    }

    /// Scheduler handle for spawning onto this pool.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs `fut` on the pool and blocks the calling thread until it finishes.
    ///
    /// Everything `fut` does runs on worker threads; the caller only waits.
    /// Must not be called from a worker thread.
    pub fn block_on<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        debug_assert!(
            !on_worker_thread(),
            "block_on called from a worker thread would stall it"
        );
        let handle = self.handle().spawn(fut)?;
        futures::executor::block_on(handle)
    }

    /// Stops accepting work, stops the workers, and joins them.
    ///
    /// Tasks still queued or suspended are abandoned.
    pub fn shutdown(mut self) -> PoolMetrics {
        self.stop()
    }

    fn stop(&mut self) -> PoolMetrics {
        self.shared.accepting.store(false, Ordering::Release);
        self.shared.done.store(true, Ordering::Release);
        self.shared.unpark_all();

        let mut snapshot = PoolMetrics {
            tasks_spawned: self.shared.tasks_spawned.load(Ordering::Relaxed),
            ..PoolMetrics::default()
        };
        for th in self.threads.drain(..) {
            match th.join() {
                Ok(m) => snapshot.merge_worker(&m),
                Err(_) => warn!("worker thread panicked"),
            }
        }

        // Drop abandoned tasks so their futures (and file handles) are released.
        loop {
            match self.shared.injector.steal() {
                Steal::Success(task) => drop(task),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
        for stealer in &self.shared.stealers {
            loop {
                match stealer.steal() {
                    Steal::Success(task) => drop(task),
                    Steal::Retry => continue,
                    Steal::Empty => break,
                }
            }
        }

        debug!(
            tasks_spawned = snapshot.tasks_spawned,
            tasks_completed = snapshot.tasks_completed,
            polls = snapshot.polls,
            "worker pool stopped"
        );
        snapshot
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

// ============================================================================
// Worker loop
// ============================================================================

struct WorkerCtx {
    worker_id: usize,
    local: Worker<Arc<Task>>,
    parker: Parker,
    shared: Arc<Shared>,
    metrics: WorkerMetricsLocal,
}

impl WorkerCtx {
    /// Local deque first, then a batch from the injector, then siblings.
    fn find_task(&mut self) -> Option<Arc<Task>> {
        if let Some(task) = self.local.pop() {
            return Some(task);
        }

        loop {
            match self.shared.injector.steal_batch_and_pop(&self.local) {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }

        let n = self.shared.stealers.len();
        for i in 1..n {
            let victim = (self.worker_id + i) % n;
            self.metrics.steal_attempts = self.metrics.steal_attempts.saturating_add(1);
            if let Steal::Success(task) = self.shared.stealers[victim].steal() {
                self.metrics.steal_successes = self.metrics.steal_successes.saturating_add(1);
                return Some(task);
            }
        }
        None
    }
}

/// Main worker loop: run tasks until the pool is stopped.
fn worker_loop(cfg: WorkerPoolConfig, ctx: &mut WorkerCtx) {
    let mut idle = TieredIdle::new();

    while !ctx.shared.done.load(Ordering::Acquire) {
        match ctx.find_task() {
            Some(task) => {
                idle.on_work();
                task.run(&mut ctx.metrics);
            }
            None => {
                if idle.on_idle(&cfg) {
                    ctx.metrics.parks = ctx.metrics.parks.saturating_add(1);
                    ctx.parker.park_timeout(cfg.park_timeout);
                }
            }
        }
    }
}

/// Spin → occasional yield → park with timeout.
struct TieredIdle {
    idle_rounds: u32,
}

impl TieredIdle {
    fn new() -> Self {
        Self { idle_rounds: 0 }
    }

    fn on_work(&mut self) {
        self.idle_rounds = 0;
    }

    /// Returns true when the caller should park.
    fn on_idle(&mut self, cfg: &WorkerPoolConfig) -> bool {
        self.idle_rounds = self.idle_rounds.saturating_add(1);

        if self.idle_rounds <= cfg.spin_iters {
            std::hint::spin_loop();
            return false;
        }

        if (self.idle_rounds & 0xF) == 0 {
            thread::yield_now();
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
