//! Worker pool counters.
//!
//! Each worker keeps a [`WorkerMetricsLocal`] with no cross-thread contention;
//! the pool merges them into a [`PoolMetrics`] snapshot when it is joined.

/// Per-worker counters, owned by the worker thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkerMetricsLocal {
    /// Task polls (a task is polled once per wakeup).
    pub polls: u64,
    /// Tasks that ran to completion on this worker.
    pub tasks_completed: u64,
    /// Tasks whose poll panicked.
    pub panics: u64,
    pub steal_attempts: u64,
    pub steal_successes: u64,
    /// Times this worker parked after spinning.
    pub parks: u64,
}

/// Aggregated pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    pub workers: usize,
    pub tasks_spawned: u64,
    pub tasks_completed: u64,
    pub polls: u64,
    pub panics: u64,
    pub steal_attempts: u64,
    pub steal_successes: u64,
    pub parks: u64,
}

impl PoolMetrics {
    pub fn merge_worker(&mut self, m: &WorkerMetricsLocal) {
        self.workers += 1;
        self.tasks_completed = self.tasks_completed.saturating_add(m.tasks_completed);
        self.polls = self.polls.saturating_add(m.polls);
        self.panics = self.panics.saturating_add(m.panics);
        self.steal_attempts = self.steal_attempts.saturating_add(m.steal_attempts);
        self.steal_successes = self.steal_successes.saturating_add(m.steal_successes);
        self.parks = self.parks.saturating_add(m.parks);
    }
}
