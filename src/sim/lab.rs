//! Deterministic lab simulator.
//!
//! `LabSimulator` stands in for a real simulator in tests. It keeps timers on
//! a [`VirtualTimerWheel`] and, as virtual time advances, posts each expired
//! callback into the scheduler's inbox exactly as a simulator would.

use crate::error::Result;
use crate::runtime::scheduler::Scheduler;
use crate::sim::wheel::VirtualTimerWheel;
use crate::sim::{CallbackRequest, EventSource, SimPort};
use crate::tracing_compat::trace;
use crate::types::{CallbackId, SimTime};
use std::cell::RefCell;
use std::rc::Rc;

/// A virtual-time simulator posting into a [`SimPort`].
#[derive(Debug)]
pub struct LabSimulator {
    wheel: RefCell<VirtualTimerWheel>,
    port: SimPort,
}

impl LabSimulator {
    /// Creates a simulator posting into `port`.
    #[must_use]
    pub fn new(port: SimPort) -> Rc<Self> {
        Rc::new(Self {
            wheel: RefCell::new(VirtualTimerWheel::new()),
            port,
        })
    }

    /// Creates a simulator and attaches it to `sched`.
    #[must_use]
    pub fn attach(sched: &Scheduler) -> Rc<Self> {
        let sim = Self::new(sched.port());
        sched.set_event_source(Rc::clone(&sim) as Rc<dyn EventSource>);
        sim
    }

    /// Advances to the next deadline and posts the callbacks due then.
    ///
    /// Returns the number of callbacks posted; zero when no timer is pending.
    pub fn advance(&self) -> usize {
        let expired = self.wheel.borrow_mut().advance_to_next();
        for timer in &expired {
            trace!(callback_id = ?timer.callback, deadline = %timer.deadline, "lab timer expired");
            self.port.fire(timer.callback);
        }
        expired.len()
    }

    /// Advances to `target`, posting every callback due by then in order.
    pub fn advance_to(&self, target: SimTime) -> usize {
        let expired = self.wheel.borrow_mut().advance_to(target);
        for timer in &expired {
            self.port.fire(timer.callback);
        }
        expired.len()
    }

    /// Runs the scheduler, advancing time whenever it goes idle, until no
    /// work and no timer is left.
    pub fn run_until_idle(&self, sched: &Scheduler) -> Result<()> {
        loop {
            sched.run()?;
            if self.advance() == 0 {
                return Ok(());
            }
        }
    }

    /// Like [`run_until_idle`](Self::run_until_idle) but stops once the next
    /// deadline lies beyond `limit`. Time is left at `limit` or earlier.
    pub fn run_until(&self, sched: &Scheduler, limit: SimTime) -> Result<()> {
        loop {
            sched.run()?;
            let next = self.wheel.borrow().next_deadline();
            match next {
                Some(deadline) if deadline <= limit => {
                    self.advance();
                }
                _ => return Ok(()),
            }
        }
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.wheel.borrow().len()
    }
}

impl EventSource for LabSimulator {
    fn now(&self) -> SimTime {
        self.wheel.borrow().now()
    }

    fn register(&self, id: CallbackId, request: CallbackRequest) -> Result<()> {
        match request {
            CallbackRequest::Timer { ticks } => {
                let deadline = self.wheel.borrow_mut().insert(ticks, id);
                trace!(callback_id = ?id, deadline = %deadline, "lab timer armed");
                let _ = deadline;
            }
        }
        Ok(())
    }

    fn cancel(&self, id: CallbackId) {
        self.wheel.borrow_mut().cancel(id);
    }
}
