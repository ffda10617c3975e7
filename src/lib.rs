//! cosync: cooperative scheduler and BFM dispatch core for HDL co-simulation.
//!
//! # Overview
//!
//! Test logic is written as `async` routines ("tasks") that wait on events
//! produced by an external discrete-event simulator. A single-threaded
//! scheduler resumes them as the simulator reports callbacks. Generated
//! simulator-side procedures call typed methods on host-side drivers
//! ("bus functional models", BFMs), and drivers call back into the simulator
//! the same way.
//!
//! # Core Guarantees
//!
//! - **FIFO execution**: ready work runs in the order it was scheduled, including
//!   work appended while the queue drains
//! - **Replayable outcomes**: an error keeps its raise site when it is delivered into
//!   a suspended task, and gains the site it was resumed at
//! - **Cooperative kill**: a killed task sees `Err(TaskError::Killed)` at its pending
//!   wait and runs its own cleanup to completion
//! - **No re-entrant delivery**: the simulator posts into an inbox; host code only
//!   runs from [`Scheduler::run`]
//! - **Fail-fast registration**: bad entry points, class paths, and ids are reported
//!   where they are used, naming the offending identifier
//!
//! # Module Structure
//!
//! - [`types`]: Identifiers, simulation time, and [`Outcome`]
//! - [`record`]: Internal task records
//! - [`runtime`]: The scheduler, its configuration, and task handles
//! - [`cx`]: The per-task capability context
//! - [`trigger`]: The trigger contract and the provided triggers
//! - [`sim`]: The simulator boundary and the deterministic lab simulator
//! - [`bfm`]: BFM registration, dispatch, and parameter marshaling
//! - [`entry`]: Entry-point resolution
//! - [`harness`]: The per-run context object
//! - [`error`]: Error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(dead_code)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod bfm;
pub mod cx;
pub mod entry;
pub mod error;
pub mod harness;
pub mod record;
pub mod runtime;
pub mod sim;
pub mod tracing_compat;
pub mod trigger;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use bfm::{Bfm, BfmContext, BfmRegistry, BfmTypeBuilder, MethodDecl, ParamType, ParamValue};
pub use cx::Cx;
pub use entry::{EntryModule, EntryPoint, EntryRegistry};
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use harness::{Harness, HarnessConfig};
pub use runtime::{CallbackHandle, Scheduler, SchedulerConfig, TaskHandle};
pub use sim::{LabSimulator, SimPort};
pub use trigger::{Event, Join, NullTrigger, Timer, Trigger};
pub use types::{capture, CallbackId, Outcome, PanicPayload, SimTime, TaskError, TaskId};
