//! Per-trigger awaiter list.
//!
//! The first subscriber arms the trigger; later subscribers join the armed
//! cycle. Firing delivers a clone of the outcome to every subscriber still
//! waiting, in subscription order, and wakes them. When the last waiting
//! subscriber leaves before the fire, the trigger must be disarmed.

use crate::error::Result;
use crate::runtime::scheduler::Scheduler;
use crate::trigger::Trigger;
use crate::types::Outcome;
use core::fmt;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::task::Waker;

/// Identifies one subscription within a fanout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey(u64);

struct Subscriber<T> {
    key: SubscriptionKey,
    waker: Waker,
    delivered: Option<Outcome<T>>,
}

struct FanoutInner<T> {
    cycle: u64,
    armed: bool,
    next_key: u64,
    subscribers: Vec<Subscriber<T>>,
}

/// The awaiters of one trigger.
pub struct Fanout<T> {
    inner: Rc<RefCell<FanoutInner<T>>>,
}

impl<T: Clone + 'static> Fanout<T> {
    /// Creates an empty, disarmed fanout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(FanoutInner {
                cycle: 0,
                armed: false,
                next_key: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Adds an awaiter, arming `trigger` if this starts a new cycle.
    ///
    /// The trigger may fire synchronously from inside `arm`; the new
    /// subscriber is already registered and receives that outcome.
    pub fn subscribe<G>(&self, trigger: &G, sched: &Scheduler, waker: Waker) -> Result<SubscriptionKey>
    where
        G: Trigger<Output = T> + ?Sized,
    {
        let (key, arm_cycle) = {
            let mut inner = self.inner.borrow_mut();
            let key = SubscriptionKey(inner.next_key);
            inner.next_key += 1;
            inner.subscribers.push(Subscriber {
                key,
                waker,
                delivered: None,
            });
            if inner.armed {
                (key, None)
            } else {
                inner.armed = true;
                inner.cycle += 1;
                (key, Some(inner.cycle))
            }
        };

        if let Some(cycle) = arm_cycle {
            let fire = Fire {
                fanout: Rc::downgrade(&self.inner),
                cycle,
            };
            if let Err(err) = trigger.arm(sched, fire) {
                let mut inner = self.inner.borrow_mut();
                inner.subscribers.retain(|s| s.key != key);
                if inner.cycle == cycle {
                    inner.armed = false;
                }
                return Err(err);
            }
        }
        Ok(key)
    }

    /// Takes the delivered outcome for `key`, or refreshes its waker.
    pub fn take_delivery(&self, key: SubscriptionKey, waker: &Waker) -> Option<Outcome<T>> {
        let mut inner = self.inner.borrow_mut();
        let index = inner.subscribers.iter().position(|s| s.key == key)?;
        if inner.subscribers[index].delivered.is_some() {
            return inner.subscribers.remove(index).delivered;
        }
        let subscriber = &mut inner.subscribers[index];
        if !subscriber.waker.will_wake(waker) {
            subscriber.waker = waker.clone();
        }
        None
    }

    /// Removes an awaiter. Returns true if the trigger must now be disarmed.
    pub fn unsubscribe(&self, key: SubscriptionKey) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(index) = inner.subscribers.iter().position(|s| s.key == key) else {
            return false;
        };
        let removed = inner.subscribers.remove(index);
        if removed.delivered.is_some() || !inner.armed {
            return false;
        }
        if inner.subscribers.iter().any(|s| s.delivered.is_none()) {
            return false;
        }
        inner.armed = false;
        true
    }

    /// Returns true while an arm cycle is outstanding.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.borrow().armed
    }

    /// Number of awaiters still waiting for the current cycle.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.delivered.is_none())
            .count()
    }
}

impl<T: Clone + 'static> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Fanout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Fanout")
            .field("cycle", &inner.cycle)
            .field("armed", &inner.armed)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

/// The right to fire one arm cycle of a trigger.
///
/// Consumed on use. A `Fire` whose cycle was disarmed, or whose fanout is
/// gone, does nothing.
pub struct Fire<T> {
    fanout: Weak<RefCell<FanoutInner<T>>>,
    cycle: u64,
}

impl<T: Clone> Fire<T> {
    /// Delivers `outcome` to every waiting subscriber and wakes them.
    ///
    /// Returns false if this fire was stale.
    pub fn fire(self, outcome: Outcome<T>) -> bool {
        let Some(inner) = self.fanout.upgrade() else {
            return false;
        };
        let wakers: Vec<Waker> = {
            let mut inner = inner.borrow_mut();
            if !inner.armed || inner.cycle != self.cycle {
                return false;
            }
            inner.armed = false;
            inner
                .subscribers
                .iter_mut()
                .filter(|s| s.delivered.is_none())
                .map(|s| {
                    s.delivered = Some(outcome.clone());
                    s.waker.clone()
                })
                .collect()
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Fires with a value.
    pub fn fire_value(self, value: T) -> bool {
        self.fire(Outcome::Value(value))
    }

    /// Returns true if firing now would still deliver.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.fanout
            .upgrade()
            .is_some_and(|inner| {
                let inner = inner.borrow();
                inner.armed && inner.cycle == self.cycle
            })
    }
}

impl<T> fmt::Debug for Fire<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fire").field("cycle", &self.cycle).finish()
    }
}
