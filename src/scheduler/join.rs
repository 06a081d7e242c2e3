//! Fan-in over a dynamic set of tasks.
//!
//! [`when_all`] spawns every job onto the pool and resolves once all of them
//! succeed, or as soon as the first one fails. [`when_all_settled`] waits for
//! every job and reports each outcome.
//!
//! # Invariants
//!
//! - Outputs are index-aligned with the input jobs regardless of completion
//!   order.
//! - `remaining` counts jobs that have not reported; it reaches zero exactly
//!   once.
//! - Only the first failure is kept as the join's error. Jobs still running
//!   after that keep going; their outputs are dropped with the shared state.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use super::executor::PoolHandle;
use super::task::catch_panic;
use crate::error::Result;

struct JoinState<T> {
    slots: Vec<Option<Result<T>>>,
    remaining: usize,
    /// Index of the first job that reported a failure.
    first_failure: Option<usize>,
    waker: Option<Waker>,
    finished: bool,
}

impl<T> JoinState<T> {
    fn new(n: usize) -> Self {
        Self {
            slots: (0..n).map(|_| None).collect(),
            remaining: n,
            first_failure: None,
            waker: None,
            finished: false,
        }
    }

    fn record(&mut self, index: usize, outcome: Result<T>) {
        if outcome.is_err() && self.first_failure.is_none() {
            self.first_failure = Some(index);
        }
        self.slots[index] = Some(outcome);
        self.remaining -= 1;

        if self.remaining == 0 || self.first_failure == Some(index) {
            if let Some(w) = self.waker.take() {
                w.wake();
            }
        }
    }

    fn register(&mut self, cx: &Context<'_>) {
        match &self.waker {
            Some(w) if w.will_wake(cx.waker()) => {}
            _ => self.waker = Some(cx.waker().clone()),
        }
    }

    fn take_all(&mut self) -> Vec<Result<T>> {
        self.finished = true;
        std::mem::take(&mut self.slots)
            .into_iter()
            .flatten()
            .collect()
    }
}

type SharedState<T> = Arc<Mutex<JoinState<T>>>;

fn lock<T>(state: &SharedState<T>) -> MutexGuard<'_, JoinState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawns each job with a reporter that records its outcome at `index`.
fn spawn_all<I, F, T>(pool: &PoolHandle, jobs: I) -> SharedState<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let jobs: Vec<F> = jobs.into_iter().collect();
    let state = Arc::new(Mutex::new(JoinState::new(jobs.len())));

    for (index, job) in jobs.into_iter().enumerate() {
        let reporter = Arc::clone(&state);
        let spawned = pool.spawn(async move {
            let outcome = catch_panic(job).await.and_then(|r| r);
            lock(&reporter).record(index, outcome);
        });
        if let Err(err) = spawned {
            lock(&state).record(index, Err(err));
        }
    }
    state
}

/// Future returned by [`when_all`].
#[must_use = "futures do nothing unless polled"]
pub struct WhenAll<T> {
    state: SharedState<T>,
}

/// Runs every job concurrently on `pool`; all-or-nothing.
///
/// Resolves to the outputs in input order, or to the first failure observed.
pub fn when_all<I, F, T>(pool: &PoolHandle, jobs: I) -> WhenAll<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    WhenAll {
        state: spawn_all(pool, jobs),
    }
}

impl<T> Future for WhenAll<T> {
    type Output = Result<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut st = lock(&self.state);
        assert!(!st.finished, "WhenAll polled after completion");

        if let Some(index) = st.first_failure {
            st.finished = true;
            return match st.slots[index].take() {
                Some(Err(err)) => Poll::Ready(Err(err)),
                _ => unreachable!("first_failure points at a failed slot"),
            };
        }
        if st.remaining == 0 {
            let values = st.take_all().into_iter().collect::<Result<Vec<T>>>();
            return Poll::Ready(values);
        }

        st.register(cx);
        Poll::Pending
    }
}

/// Future returned by [`when_all_settled`].
#[must_use = "futures do nothing unless polled"]
pub struct WhenAllSettled<T> {
    state: SharedState<T>,
}

/// Runs every job concurrently on `pool` and waits for all of them.
///
/// Each output slot holds that job's own result; one failure does not cut
/// the others short.
pub fn when_all_settled<I, F, T>(pool: &PoolHandle, jobs: I) -> WhenAllSettled<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    WhenAllSettled {
        state: spawn_all(pool, jobs),
    }
}

impl<T> Future for WhenAllSettled<T> {
    type Output = Vec<Result<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut st = lock(&self.state);
        assert!(!st.finished, "WhenAllSettled polled after completion");

        if st.remaining == 0 {
            return Poll::Ready(st.take_all());
        }
        st.register(cx);
        Poll::Pending
    }
}
