//! Triggers: conditions a task can await.
//!
//! A trigger is armed once per cycle, by its first awaiter, and hands the
//! outcome to every awaiter through its [`Fanout`]. Arming receives a
//! [`Fire`], the single-use right to complete that cycle. Disarming happens
//! when every awaiter has gone away before the fire; a trigger must then
//! release whatever it registered, and a `Fire` it already handed out becomes
//! stale.
//!
//! Provided triggers:
//!
//! - [`Timer`]: fires after a number of simulator ticks
//! - [`Event`]: a host-side flag set by code, carrying a value
//! - [`Join`]: fires with a task's final outcome
//! - [`NullTrigger`]: fires on the next pass through the ready queue

pub mod event;
pub mod fanout;
pub mod join;
pub mod null;
pub mod timer;

pub use event::Event;
pub use fanout::{Fanout, Fire, SubscriptionKey};
pub use join::Join;
pub use null::NullTrigger;
pub use timer::Timer;

use crate::error::Result;
use crate::runtime::scheduler::Scheduler;

/// A condition a task can await with [`Cx::wait`](crate::cx::Cx::wait).
pub trait Trigger {
    /// Value delivered when the trigger fires.
    type Output: Clone + 'static;

    /// The trigger's awaiter list.
    fn fanout(&self) -> &Fanout<Self::Output>;

    /// Starts a cycle. The trigger calls `fire` exactly once when its
    /// condition holds, which may be immediately.
    fn arm(&self, sched: &Scheduler, fire: Fire<Self::Output>) -> Result<()>;

    /// Abandons the current cycle. Safe to call when never armed or already
    /// fired.
    fn disarm(&self, sched: &Scheduler);

    /// Human-readable description for diagnostics.
    fn describe(&self) -> String;
}
