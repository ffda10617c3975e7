//! Runtime state and scheduling.
//!
//! This module contains the core runtime machinery:
//!
//! - [`config`]: Scheduler configuration
//! - [`env_config`]: Environment variable and TOML overrides
//! - [`scheduler`]: The single-threaded cooperative event loop
//! - [`callback`]: Cancellable deferred work and the simulator callback table
//! - [`stored_task`]: Type-erased future storage
//! - [`task_handle`]: TaskHandle for querying, joining, and killing tasks
//! - [`waker`]: Waker implementation with deduplication
//!
//! # Quick Start
//!
//! ```ignore
//! use cosync::runtime::{Scheduler, SchedulerConfig};
//! use cosync::sim::LabSimulator;
//! use cosync::trigger::Timer;
//!
//! let sched = Scheduler::new(SchedulerConfig::default());
//! let sim = LabSimulator::attach(&sched);
//! let task = sched.spawn("blink", |cx| async move {
//!     cx.wait(&Timer::new(10)).await?;
//!     Ok(cx.now())
//! });
//! sim.run_until_idle(&sched)?;
//! assert!(task.is_finished());
//! ```

pub mod callback;
pub mod config;
pub mod env_config;
pub mod scheduler;
pub mod stored_task;
pub mod task_handle;
pub mod waker;

pub use callback::CallbackHandle;
pub use config::SchedulerConfig;
pub use scheduler::{NoticeHandler, Scheduler};
pub use task_handle::TaskHandle;
