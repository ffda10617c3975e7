//! The simulator boundary.
//!
//! A simulator talks to the scheduler in two directions:
//!
//! - **Inbound**: it posts [`SimEvent`]s into a [`SimPort`]. The port is a
//!   lock-free queue, so posting is safe from any thread and never runs host
//!   code synchronously. The scheduler is the single consumer.
//! - **Outbound**: the scheduler asks an [`EventSource`] to arm or cancel
//!   callbacks. When an armed callback fires, the simulator posts
//!   [`SimEvent::Callback`] with the id it was handed.
//!
//! [`lab`] provides a deterministic virtual-time simulator for tests, and
//! [`lab_bfm`] models the generated simulator-side BFM glue.

pub mod lab;
pub mod lab_bfm;
pub mod wheel;

pub use lab::LabSimulator;
pub use lab_bfm::{LabBfmBackend, PendingMsg};
pub use wheel::VirtualTimerWheel;

use crate::error::Result;
use crate::types::{CallbackId, SimTime};
use core::fmt;
use crossbeam_queue::SegQueue;
use std::sync::Arc;

/// What a callback registration asks the simulator to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallbackRequest {
    /// Fire after the given number of simulator ticks.
    Timer {
        /// Delay from the current simulation time.
        ticks: u64,
    },
}

/// The simulator's callback registration interface.
pub trait EventSource {
    /// Current simulation time.
    fn now(&self) -> SimTime;

    /// Arms a callback. When it fires, the simulator posts
    /// `SimEvent::Callback(id)`.
    fn register(&self, id: CallbackId, request: CallbackRequest) -> Result<()>;

    /// Cancels an armed callback. Unknown or already-fired ids are ignored.
    fn cancel(&self, id: CallbackId);
}

/// Receives inbound BFM calls on the scheduling thread.
pub trait CallTarget {
    /// Dispatches one call.
    fn dispatch_call(&self, call: &BfmCall) -> Result<()>;
}

/// Severity of a simulator notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoticeLevel {
    /// Informational.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// The simulator reported an error.
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A notice forwarded from the simulator to the loaded entry module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimNotice {
    /// Severity.
    pub level: NoticeLevel,
    /// Free-form message.
    pub message: String,
}

/// An inbound call on a BFM export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfmCall {
    /// Target instance id.
    pub bfm_id: usize,
    /// Index into the instance type's export table.
    pub method_id: usize,
    /// Raw parameter words.
    pub params: Vec<u64>,
}

/// An event posted by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A registered callback fired.
    Callback(CallbackId),
    /// The simulator called a BFM export.
    Call(BfmCall),
    /// The simulator reported a notice.
    Notice(SimNotice),
}

/// Inbox handle the simulator posts events into.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct SimPort {
    queue: Arc<SegQueue<SimEvent>>,
}

impl SimPort {
    /// Creates an empty port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts an event.
    pub fn post(&self, event: SimEvent) {
        self.queue.push(event);
    }

    /// Posts a callback fire.
    pub fn fire(&self, id: CallbackId) {
        self.post(SimEvent::Callback(id));
    }

    /// Posts a BFM export call.
    pub fn call(&self, bfm_id: usize, method_id: usize, params: Vec<u64>) {
        self.post(SimEvent::Call(BfmCall {
            bfm_id,
            method_id,
            params,
        }));
    }

    /// Posts a simulator notice.
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.post(SimEvent::Notice(SimNotice {
            level,
            message: message.into(),
        }));
    }

    pub(crate) fn pop(&self) -> Option<SimEvent> {
        self.queue.pop()
    }

    /// Returns true if nothing is waiting to be consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of events waiting to be consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl fmt::Debug for SimPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimPort")
            .field("pending", &self.queue.len())
            .finish()
    }
}
