//! Spawned tasks and their join handles.
//!
//! A [`Task`] wraps a boxed future. Its waker re-enqueues the task on the
//! pool's injector, so whichever thread completes an operation (usually the
//! io_uring driver) hands the continuation back to a worker thread.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use futures::FutureExt;
use tracing::warn;

use super::executor::Shared;
use super::metrics::WorkerMetricsLocal;
use crate::error::{Error, Result};

/// A spawned future plus its scheduling state.
///
/// # Invariants
///
/// - `scheduled` is true while the task sits in a run queue; a wake while it
///   is already queued is a no-op.
/// - The future slot is `None` once the future has completed or panicked.
pub(crate) struct Task {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    scheduled: AtomicBool,
    pool: Weak<Shared>,
}

impl Task {
    /// Creates a task that is already marked as scheduled.
    pub(super) fn new(future: BoxFuture<'static, ()>, pool: Weak<Shared>) -> Arc<Self> {
        Arc::new(Self {
            future: Mutex::new(Some(future)),
            scheduled: AtomicBool::new(true),
            pool,
        })
    }

    /// Polls the task once on the current worker.
    ///
    /// `scheduled` is cleared before polling so a wake that races with the
    /// poll queues the task again instead of being lost.
    pub(super) fn run(self: &Arc<Self>, metrics: &mut WorkerMetricsLocal) {
        self.scheduled.store(false, Ordering::Release);

        let mut slot = self.future.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut future) = slot.take() else {
            // Spurious wakeup after completion.
            return;
        };

        metrics.polls = metrics.polls.saturating_add(1);
        let waker = waker_ref(self);
        let mut cx = Context::from_waker(&waker);

        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => *slot = Some(future),
            Ok(Poll::Ready(())) => {
                metrics.tasks_completed = metrics.tasks_completed.saturating_add(1);
            }
            Err(payload) => {
                metrics.panics = metrics.panics.saturating_add(1);
                warn!(panic = %panic_message(&*payload), "task panicked outside its join guard");
            }
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if arc_self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        // Wakeups after the pool is gone abandon the task.
        if let Some(shared) = arc_self.pool.upgrade() {
            shared.schedule(Arc::clone(arc_self));
        }
    }
}

/// Handle to the output of a spawned task.
///
/// Resolves to `Err(TaskPanicked)` if the task panicked and to
/// `Err(PoolShutdown)` if it was abandoned by a shutting-down pool.
#[must_use = "dropping a JoinHandle detaches the task"]
pub struct JoinHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> JoinHandle<T> {
    pub(super) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { rx }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(out)) => Poll::Ready(out),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::PoolShutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs `fut`, converting a panic into [`Error::TaskPanicked`].
pub(crate) async fn catch_panic<F: Future>(fut: F) -> Result<F::Output> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| Error::TaskPanicked(panic_message(&*payload)))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
