//! Internal records owned by the scheduler.

pub mod task;

pub use task::{KillAction, TaskRecord, TaskState};
