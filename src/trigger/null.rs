//! Yield to the ready queue.

use crate::error::Result;
use crate::runtime::callback::CallbackHandle;
use crate::runtime::scheduler::Scheduler;
use crate::trigger::{Fanout, Fire, Trigger};
use std::cell::RefCell;

/// Fires on the next pass through the ready queue.
///
/// Awaiting it lets every piece of work already queued run first.
#[derive(Debug, Default)]
pub struct NullTrigger {
    pending: RefCell<Option<CallbackHandle>>,
    fanout: Fanout<()>,
}

impl NullTrigger {
    /// Creates a null trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Trigger for NullTrigger {
    type Output = ();

    fn fanout(&self) -> &Fanout<()> {
        &self.fanout
    }

    fn arm(&self, sched: &Scheduler, fire: Fire<()>) -> Result<()> {
        let handle = sched.schedule(move |_| {
            fire.fire_value(());
            Ok(())
        });
        *self.pending.borrow_mut() = Some(handle);
        Ok(())
    }

    fn disarm(&self, _sched: &Scheduler) {
        if let Some(handle) = self.pending.borrow_mut().take() {
            handle.cancel();
        }
    }

    fn describe(&self) -> String {
        "NullTrigger".to_string()
    }
}
