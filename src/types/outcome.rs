//! Two-valued outcome type carried across suspension points.
//!
//! An [`Outcome`] is what a trigger delivers to a waiting task, and what a
//! finished task leaves behind:
//!
//! - `Value(T)`: the operation produced a value
//! - `Error(TaskError)`: the operation failed, was killed, or panicked
//!
//! Outcomes are built where an operation completes (see [`capture`]) and
//! replayed later, on a different call stack, with [`Outcome::resume`]. A
//! replayed [`Error`] keeps its raise site and gains the resumption site, so
//! its traceback reads origin-first.

use crate::error::{Error, ErrorKind};
use core::fmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe, Location};

/// Payload from a caught panic.
#[derive(Debug, Clone)]
pub struct PanicPayload {
    message: String,
    site: &'static Location<'static>,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            site: Location::caller(),
        }
    }

    pub(crate) fn from_unwind(
        payload: &(dyn Any + Send),
        site: &'static Location<'static>,
    ) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message, site }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns where the panic was caught.
    #[must_use]
    pub fn site(&self) -> &'static Location<'static> {
        self.site
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// Why a task routine did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The task was killed; delivered in place of the awaited outcome.
    #[error("task killed")]
    Killed,
    /// An ordinary error raised by test logic.
    #[error(transparent)]
    Failed(#[from] Error),
    /// The routine panicked.
    #[error("{0}")]
    Panicked(PanicPayload),
}

impl TaskError {
    /// Returns true for the cancellation signal.
    #[must_use]
    pub const fn is_killed(&self) -> bool {
        matches!(self, Self::Killed)
    }

    /// Returns the underlying error for `Failed`.
    #[must_use]
    pub const fn as_failure(&self) -> Option<&Error> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TaskError> for Error {
    #[track_caller]
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Killed => Self::new(ErrorKind::Killed),
            TaskError::Failed(e) => e,
            TaskError::Panicked(p) => Self::new(ErrorKind::Panicked).with_message(p.message),
        }
    }
}

/// A captured value or error, replayable into a suspended routine.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The operation produced a value.
    Value(T),
    /// The operation failed.
    Error(TaskError),
}

impl<T> Outcome<T> {
    /// Returns true if this outcome is `Value`.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if this outcome is `Error`.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns true if this outcome is the cancellation signal.
    #[must_use]
    pub const fn is_killed(&self) -> bool {
        matches!(self, Self::Error(TaskError::Killed))
    }

    /// Returns the value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    /// Returns the error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&TaskError> {
        match self {
            Self::Value(_) => None,
            Self::Error(e) => Some(e),
        }
    }

    /// Maps the value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Value(v) => Outcome::Value(f(v)),
            Self::Error(e) => Outcome::Error(e),
        }
    }

    /// Drops the value, keeping whether and how the operation failed.
    pub(crate) fn erased(&self) -> Outcome<()> {
        match self {
            Self::Value(_) => Outcome::Value(()),
            Self::Error(e) => Outcome::Error(e.clone()),
        }
    }

    /// Converts into a `Result` without recording a resumption site.
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(e) => Err(e),
        }
    }

    /// Replays the outcome at the caller's location.
    ///
    /// A value is returned as-is. A captured [`Error`] is re-raised with the
    /// caller appended to its traceback.
    #[track_caller]
    pub fn resume(self) -> Result<T, TaskError> {
        self.resume_at(Location::caller())
    }

    pub(crate) fn resume_at(self, site: &'static Location<'static>) -> Result<T, TaskError> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(TaskError::Failed(mut e)) => {
                e.record_resume(site);
                Err(TaskError::Failed(e))
            }
            Self::Error(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, TaskError>> for Outcome<T> {
    fn from(result: Result<T, TaskError>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(e) => Self::Error(e),
        }
    }
}

/// Runs `op` immediately and captures what it produced.
///
/// `Ok` becomes `Value`, `Err` becomes `Error`, and a panic is caught and
/// becomes `Error(TaskError::Panicked)` recording the capture site. An `op`
/// that never returns never returns here either; callers bound it themselves.
#[track_caller]
pub fn capture<T, E, F>(op: F) -> Outcome<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<TaskError>,
{
    let site = Location::caller();
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => Outcome::Value(value),
        Ok(Err(err)) => Outcome::Error(err.into()),
        Err(payload) => Outcome::Error(TaskError::Panicked(PanicPayload::from_unwind(
            payload.as_ref(),
            site,
        ))),
    }
}
