//! Capability context.
//!
//! The [`Cx`] type is the token a task routine receives at spawn. Everything
//! a routine does to the scheduler (waiting on triggers, spawning children,
//! reading simulation time, observing a kill) flows through it.

pub mod cx;

pub use cx::{Cx, Wait};
