//! Host-side event flag.

use crate::error::Result;
use crate::runtime::scheduler::Scheduler;
use crate::trigger::{Fanout, Fire, Trigger};
use crate::types::Outcome;
use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

struct EventInner<T> {
    name: String,
    value: RefCell<Option<T>>,
    pending: RefCell<Option<Fire<T>>>,
    fanout: Fanout<T>,
}

/// A flag set and cleared by host code, carrying a value.
///
/// Awaiting a set event completes on the next resumption with its value;
/// awaiting a clear event waits for the next [`Event::set`]. Clones share
/// the same flag, so a BFM export can set an event a task is waiting on.
pub struct Event<T: Clone + 'static = ()> {
    inner: Rc<EventInner<T>>,
}

impl<T: Clone + 'static> Event<T> {
    /// Creates a clear event.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(EventInner {
                name: name.into(),
                value: RefCell::new(None),
                pending: RefCell::new(None),
                fanout: Fanout::new(),
            }),
        }
    }

    /// Sets the event, waking every awaiter with `value`.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = Some(value.clone());
        let pending = self.inner.pending.borrow_mut().take();
        if let Some(fire) = pending {
            fire.fire(Outcome::Value(value));
        }
    }

    /// Clears the event. Awaiters already woken keep their value.
    pub fn clear(&self) {
        *self.inner.value.borrow_mut() = None;
    }

    /// Returns true if the event is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Returns the value of a set event.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// The event's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<T: Clone + 'static> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Trigger for Event<T> {
    type Output = T;

    fn fanout(&self) -> &Fanout<T> {
        &self.inner.fanout
    }

    fn arm(&self, _sched: &Scheduler, fire: Fire<T>) -> Result<()> {
        let current = self.inner.value.borrow().clone();
        match current {
            Some(value) => {
                fire.fire(Outcome::Value(value));
            }
            None => *self.inner.pending.borrow_mut() = Some(fire),
        }
        Ok(())
    }

    fn disarm(&self, _sched: &Scheduler) {
        self.inner.pending.borrow_mut().take();
    }

    fn describe(&self) -> String {
        format!("Event({})", self.inner.name)
    }
}

impl<T: Clone + 'static> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.inner.name)
            .field("set", &self.is_set())
            .finish()
    }
}
