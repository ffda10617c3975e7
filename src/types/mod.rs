//! Core types for cosync.
//!
//! - [`id`]: task and callback identifiers, simulation time
//! - [`outcome`]: the captured value-or-error carried across suspension

pub mod id;
pub mod outcome;

pub use id::{CallbackId, SimTime, TaskId};
pub use outcome::{capture, Outcome, PanicPayload, TaskError};
