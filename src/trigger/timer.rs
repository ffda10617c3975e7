//! Simulation-time delay.

use crate::error::Result;
use crate::runtime::scheduler::Scheduler;
use crate::sim::CallbackRequest;
use crate::trigger::{Fanout, Fire, Trigger};
use crate::types::{CallbackId, SimTime};
use std::cell::Cell;

/// Fires after `ticks` simulator ticks, delivering the time it fired at.
///
/// Each arm cycle registers a fresh callback with the event source, so a
/// timer may be awaited again after it fires.
#[derive(Debug)]
pub struct Timer {
    ticks: u64,
    registered: Cell<Option<CallbackId>>,
    fanout: Fanout<SimTime>,
}

impl Timer {
    /// Creates a timer for `ticks` simulator ticks.
    #[must_use]
    pub fn new(ticks: u64) -> Self {
        Self {
            ticks,
            registered: Cell::new(None),
            fanout: Fanout::new(),
        }
    }

    /// The delay in ticks.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Trigger for Timer {
    type Output = SimTime;

    fn fanout(&self) -> &Fanout<SimTime> {
        &self.fanout
    }

    fn arm(&self, sched: &Scheduler, fire: Fire<SimTime>) -> Result<()> {
        let id = sched.register_callback(CallbackRequest::Timer { ticks: self.ticks }, move |s| {
            fire.fire_value(s.now());
            Ok(())
        })?;
        self.registered.set(Some(id));
        Ok(())
    }

    fn disarm(&self, sched: &Scheduler) {
        if let Some(id) = self.registered.take() {
            sched.cancel_callback(id);
        }
    }

    fn describe(&self) -> String {
        format!("Timer({} ticks)", self.ticks)
    }
}
