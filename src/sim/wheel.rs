//! Virtual time wheel for the lab simulator.
//!
//! Timers are kept in a min-heap keyed on (deadline, registration sequence),
//! so expiry is deterministic: earliest deadline first, and among equal
//! deadlines the order they were registered in. Pending callbacks are also
//! indexed by id, so cancel and `len` are constant time. A cancelled entry
//! stays in the heap until it reaches the top, where it is dropped.

use crate::types::{CallbackId, SimTime};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug)]
struct VirtualTimer {
    deadline: SimTime,
    seq: u64,
    callback: CallbackId,
}

impl Eq for VirtualTimer {}

impl PartialEq for VirtualTimer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for VirtualTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap ordering: earliest deadline first, then lowest seq
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for VirtualTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A timer that reached its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredTimer {
    /// When the timer was due.
    pub deadline: SimTime,
    /// The callback to post.
    pub callback: CallbackId,
}

/// Deadline-ordered timer storage on virtual ticks.
#[derive(Debug, Default)]
pub struct VirtualTimerWheel {
    heap: BinaryHeap<VirtualTimer>,
    /// Registration sequence of each pending callback. A heap entry whose
    /// sequence differs is stale. The heap top is never stale.
    live: HashMap<CallbackId, u64>,
    now: SimTime,
    next_seq: u64,
}

impl VirtualTimerWheel {
    /// Creates a wheel at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    #[must_use]
    pub const fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules `callback` to expire `ticks` from now.
    ///
    /// Replaces any pending registration of the same callback.
    pub fn insert(&mut self, ticks: u64, callback: CallbackId) -> SimTime {
        let deadline = self.now.saturating_add(ticks);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(callback, seq);
        self.heap.push(VirtualTimer {
            deadline,
            seq,
            callback,
        });
        self.prune();
        deadline
    }

    /// Cancels a pending timer. Unknown callbacks are ignored.
    pub fn cancel(&mut self, callback: CallbackId) {
        if self.live.remove(&callback).is_some() {
            self.prune();
        }
    }

    /// Returns the deadline of the next pending timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<SimTime> {
        self.heap.peek().map(|t| t.deadline)
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no timer is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Advances to `target`, returning every timer due by then in order.
    ///
    /// Time never moves backwards; a `target` in the past returns nothing.
    pub fn advance_to(&mut self, target: SimTime) -> Vec<ExpiredTimer> {
        if target < self.now {
            return Vec::new();
        }
        let mut expired = Vec::new();
        while self.heap.peek().is_some_and(|t| t.deadline <= target) {
            let Some(timer) = self.heap.pop() else { break };
            if self.is_live(&timer) {
                self.live.remove(&timer.callback);
                expired.push(ExpiredTimer {
                    deadline: timer.deadline,
                    callback: timer.callback,
                });
            }
        }
        self.prune();
        self.now = target;
        expired
    }

    /// Advances to the next deadline, returning the timers due then.
    pub fn advance_to_next(&mut self) -> Vec<ExpiredTimer> {
        match self.next_deadline() {
            Some(deadline) => self.advance_to(deadline),
            None => Vec::new(),
        }
    }

    fn is_live(&self, timer: &VirtualTimer) -> bool {
        self.live.get(&timer.callback) == Some(&timer.seq)
    }

    fn prune(&mut self) {
        while self.heap.peek().is_some_and(|t| !self.is_live(t)) {
            self.heap.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cb(n: u64) -> CallbackId {
        CallbackId::from_raw(n)
    }

    #[test]
    fn expires_by_deadline_then_registration() {
        let mut wheel = VirtualTimerWheel::new();
        wheel.insert(200, cb(0));
        wheel.insert(100, cb(1));
        wheel.insert(100, cb(2));
        wheel.insert(200, cb(3));

        let order: Vec<_> = wheel
            .advance_to(SimTime::from_ticks(300))
            .into_iter()
            .map(|e| e.callback)
            .collect();
        assert_eq!(order, vec![cb(1), cb(2), cb(0), cb(3)]);
        assert_eq!(wheel.now(), SimTime::from_ticks(300));
    }

    #[test]
    fn advance_to_next_steps_one_deadline() {
        let mut wheel = VirtualTimerWheel::new();
        wheel.insert(10, cb(0));
        wheel.insert(5, cb(1));

        let first = wheel.advance_to_next();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].callback, cb(1));
        assert_eq!(wheel.now(), SimTime::from_ticks(5));

        let second = wheel.advance_to_next();
        assert_eq!(second[0].deadline, SimTime::from_ticks(10));
        assert!(wheel.advance_to_next().is_empty());
        assert_eq!(wheel.now(), SimTime::from_ticks(10));
    }

    #[test]
    fn cancelled_timers_are_skipped() {
        let mut wheel = VirtualTimerWheel::new();
        wheel.insert(50, cb(0));
        wheel.insert(100, cb(1));
        wheel.cancel(cb(0));
        assert_eq!(wheel.next_deadline(), Some(SimTime::from_ticks(100)));
        assert_eq!(wheel.len(), 1);

        let expired = wheel.advance_to(SimTime::from_ticks(100));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].callback, cb(1));
        assert!(wheel.is_empty());
    }

    #[test]
    fn cancelling_everything_empties_the_heap() {
        let mut wheel = VirtualTimerWheel::new();
        for n in 0..100 {
            wheel.insert(n + 1, cb(n));
        }
        for n in (0..100).rev() {
            wheel.cancel(cb(n));
        }
        wheel.cancel(cb(500));
        assert!(wheel.is_empty());
        assert!(wheel.heap.is_empty());
        assert_eq!(wheel.next_deadline(), None);
        assert!(wheel.advance_to(SimTime::from_ticks(1_000)).is_empty());
    }

    #[test]
    fn late_cancelled_entries_do_not_linger() {
        let mut wheel = VirtualTimerWheel::new();
        wheel.insert(5, cb(0));
        wheel.insert(500, cb(1));
        wheel.cancel(cb(1));
        assert_eq!(wheel.advance_to_next().len(), 1);
        assert!(wheel.heap.is_empty());
        assert!(wheel.live.is_empty());
    }

    #[test]
    fn reinsert_replaces_the_pending_registration() {
        let mut wheel = VirtualTimerWheel::new();
        wheel.insert(10, cb(0));
        wheel.insert(30, cb(0));
        assert_eq!(wheel.len(), 1);
        assert_eq!(wheel.next_deadline(), Some(SimTime::from_ticks(30)));

        let expired = wheel.advance_to(SimTime::from_ticks(50));
        assert_eq!(
            expired,
            vec![ExpiredTimer {
                deadline: SimTime::from_ticks(30),
                callback: cb(0),
            }]
        );
    }

    #[test]
    fn past_target_is_noop() {
        let mut wheel = VirtualTimerWheel::new();
        wheel.insert(10, cb(0));
        wheel.advance_to(SimTime::from_ticks(20));
        assert!(wheel.advance_to(SimTime::from_ticks(5)).is_empty());
        assert_eq!(wheel.now(), SimTime::from_ticks(20));
    }
}
