//! Wake queue.
//!
//! Waking a task pushes its id onto a lock-free queue; `wake` never polls.
//! The scheduler pops ids between callbacks and turns each into a
//! resumption. Ids may repeat: a task already queued for resumption is
//! skipped by the scheduler, so the queue keeps no set of its own.

use crate::types::TaskId;
use crossbeam_queue::SegQueue;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Ids of woken tasks, in wake order.
#[derive(Debug, Default)]
pub struct WakeQueue {
    woken: SegQueue<TaskId>,
}

impl WakeQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A waker that enqueues `task`.
    #[must_use]
    pub fn waker(self: &Arc<Self>, task: TaskId) -> Waker {
        Waker::from(Arc::new(TaskWaker {
            queue: Arc::clone(self),
            task,
        }))
    }

    /// Takes the earliest woken id.
    pub fn pop(&self) -> Option<TaskId> {
        self.woken.pop()
    }

    /// Returns true when no wake is waiting to be collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.woken.is_empty()
    }
}

struct TaskWaker {
    queue: Arc<WakeQueue>,
    task: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.woken.push(self.task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakes_pop_in_wake_order() {
        let queue = Arc::new(WakeQueue::new());
        let (a, b) = (TaskId::new_for_test(4), TaskId::new_for_test(9));
        let wake_b = queue.waker(b);
        let wake_a = queue.waker(a);

        wake_b.wake_by_ref();
        wake_a.wake_by_ref();
        wake_b.wake();

        assert!(!queue.is_empty());
        let popped: Vec<TaskId> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(popped, vec![b, a, b]);
        assert!(queue.is_empty());
    }

    #[test]
    fn wakes_from_another_thread_are_collected() {
        let queue = Arc::new(WakeQueue::new());
        let waker = queue.waker(TaskId::new_for_test(1));
        std::thread::spawn(move || waker.wake()).join().unwrap();
        assert_eq!(queue.pop(), Some(TaskId::new_for_test(1)));
    }
}
