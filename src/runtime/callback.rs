//! Deferred work: cancellable callback handles, the FIFO ready queue, and the
//! simulator callback registration table.

use crate::error::{Error, Result};
use crate::runtime::scheduler::Scheduler;
use crate::types::CallbackId;
use core::fmt;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

/// A unit of work run synchronously by the scheduling loop.
pub type Work = Box<dyn FnOnce(&Scheduler) -> Result<()>>;

struct HandleInner {
    label: &'static str,
    cancelled: Cell<bool>,
    executed: Cell<bool>,
    work: RefCell<Option<Work>>,
}

/// A reference to scheduled work.
///
/// Clones refer to the same work item. The work runs at most once; the
/// cancelled flag is checked immediately before it runs.
#[derive(Clone)]
pub struct CallbackHandle {
    inner: Rc<HandleInner>,
}

impl CallbackHandle {
    pub(crate) fn new(label: &'static str, work: Work) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                label,
                cancelled: Cell::new(false),
                executed: Cell::new(false),
                work: RefCell::new(Some(work)),
            }),
        }
    }

    /// Cancels the work. Idempotent, and a no-op once the work has run.
    pub fn cancel(&self) {
        if self.inner.executed.get() {
            return;
        }
        self.inner.cancelled.set(true);
        let dropped = self.inner.work.borrow_mut().take();
        drop(dropped);
    }

    /// Returns true if the work was cancelled before it ran.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    /// Returns true if the work has run.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.inner.executed.get()
    }

    /// Returns the label given at scheduling time.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    /// Runs the work unless it was cancelled.
    pub(crate) fn run(&self, sched: &Scheduler) -> Result<()> {
        if self.inner.cancelled.get() {
            return Ok(());
        }
        let work = self.inner.work.borrow_mut().take();
        self.inner.executed.set(true);
        work.map_or(Ok(()), |work| work(sched))
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("label", &self.inner.label)
            .field("cancelled", &self.inner.cancelled.get())
            .field("executed", &self.inner.executed.get())
            .finish()
    }
}

/// FIFO queue of ready work.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    queue: VecDeque<CallbackHandle>,
}

impl ReadyQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, handle: CallbackHandle) {
        self.queue.push_back(handle);
    }

    pub(crate) fn pop(&mut self) -> Option<CallbackHandle> {
        self.queue.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Callbacks registered with the event source, keyed by id.
///
/// Every id is issued once. An id is armed from registration until it either
/// fires or is cancelled; a fire for a cancelled id is stale and ignored, a
/// fire for an id that already fired is a scheduler bug.
#[derive(Default)]
pub(crate) struct CallbackTable {
    next: u64,
    armed: HashMap<CallbackId, Work>,
    cancelled: HashSet<CallbackId>,
}

impl CallbackTable {
    pub(crate) fn register(&mut self, work: Work) -> CallbackId {
        let id = CallbackId::from_raw(self.next);
        self.next += 1;
        self.armed.insert(id, work);
        id
    }

    /// Drops a registration the event source refused.
    pub(crate) fn discard(&mut self, id: CallbackId) {
        self.armed.remove(&id);
    }

    /// Cancels an armed callback. Returns false if it was not armed.
    pub(crate) fn cancel(&mut self, id: CallbackId) -> bool {
        if self.armed.remove(&id).is_some() {
            self.cancelled.insert(id);
            true
        } else {
            false
        }
    }

    /// Takes the work for a fired callback.
    ///
    /// Returns `Ok(None)` for a stale fire of a cancelled callback.
    pub(crate) fn take_fired(&mut self, id: CallbackId) -> Result<Option<Work>> {
        if let Some(work) = self.armed.remove(&id) {
            return Ok(Some(work));
        }
        if self.cancelled.contains(&id) {
            return Ok(None);
        }
        if id.as_u64() < self.next {
            Err(Error::internal(format!("callback {id} fired twice without re-arming"))
                .with_callback(id))
        } else {
            Err(Error::internal(format!("callback {id} was never issued")).with_callback(id))
        }
    }

    pub(crate) fn armed_len(&self) -> usize {
        self.armed.len()
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("next", &self.next)
            .field("armed", &self.armed.len())
            .field("cancelled", &self.cancelled.len())
            .finish()
    }
}
