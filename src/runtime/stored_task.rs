//! Stored task future.
//!
//! `LocalStoredTask` wraps a type-erased, non-`Send` future producing the
//! task's erased outcome. `CaptureUnwind` converts a panic inside the
//! routine into `TaskError::Panicked` so a panicking task finishes like any
//! other failed task instead of unwinding through the scheduler.

use crate::tracing_compat::trace;
use crate::types::{Outcome, PanicPayload, TaskError, TaskId};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A type-erased future stored in a task record.
pub struct LocalStoredTask {
    future: Pin<Box<dyn Future<Output = Outcome<()>>>>,
    task_id: TaskId,
    poll_count: u64,
}

impl LocalStoredTask {
    /// Creates a stored task from a future.
    pub fn new<F>(future: F, task_id: TaskId) -> Self
    where
        F: Future<Output = Outcome<()>> + 'static,
    {
        Self {
            future: Box::pin(future),
            task_id,
            poll_count: 0,
        }
    }

    /// Polls the stored task.
    pub fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Outcome<()>> {
        self.poll_count += 1;
        let task_id = self.task_id;
        let poll_number = self.poll_count;
        trace!(task_id = ?task_id, poll_number, "task poll started");

        let result = self.future.as_mut().poll(cx);

        let poll_result = if result.is_ready() { "Ready" } else { "Pending" };
        trace!(task_id = ?task_id, poll_number, poll_result, "task poll completed");
        let _ = (task_id, poll_number, poll_result);
        result
    }

    /// Returns the number of times this task has been polled.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }
}

impl std::fmt::Debug for LocalStoredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStoredTask")
            .field("task_id", &self.task_id)
            .field("poll_count", &self.poll_count)
            .finish_non_exhaustive()
    }
}

/// Future adapter that catches panics raised while polling.
pub(crate) struct CaptureUnwind<F> {
    inner: Pin<Box<F>>,
    site: &'static Location<'static>,
}

impl<F> CaptureUnwind<F> {
    pub(crate) fn new(inner: F, site: &'static Location<'static>) -> Self {
        Self {
            inner: Box::pin(inner),
            site,
        }
    }
}

impl<F, T> Future for CaptureUnwind<F>
where
    F: Future<Output = Result<T, TaskError>>,
{
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let site = self.site;
        let inner = &mut self.inner;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(poll) => poll,
            Err(payload) => Poll::Ready(Err(TaskError::Panicked(PanicPayload::from_unwind(
                payload.as_ref(),
                site,
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_waker() -> Waker {
        Waker::from(Arc::new(NoopWaker))
    }

    #[test]
    fn stored_task_counts_polls() {
        init_test_logging();
        crate::test_phase!("stored_task_counts_polls");

        let mut task = LocalStoredTask::new(async { Outcome::Value(()) }, TaskId::new_for_test(1));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let result = task.poll(&mut cx);
        crate::assert_with_log!(result.is_ready(), "ready on first poll", true, result.is_ready());
        assert_eq!(task.poll_count(), 1);
        crate::test_complete!("stored_task_counts_polls");
    }

    #[test]
    fn capture_unwind_converts_panic() {
        init_test_logging();
        let mut fut = CaptureUnwind::new(
            async {
                if true {
                    panic!("routine blew up");
                }
                Ok::<(), TaskError>(())
            },
            Location::caller(),
        );
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let Poll::Ready(Err(TaskError::Panicked(payload))) = Pin::new(&mut fut).poll(&mut cx)
        else {
            panic!("expected a captured panic");
        };
        assert_eq!(payload.message(), "routine blew up");
    }
}
