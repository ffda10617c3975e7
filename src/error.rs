//! Error types and error handling strategy for cosync.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors remember where they were raised, and every place they were
//!   replayed into a suspended task afterwards
//! - Scheduler bugs are classified separately from test failures so that a
//!   broken invariant is never mistaken for an ordinary assertion
//!
//! # Error Categories
//!
//! - **Test**: failures raised by test logic; delivered to the owning task
//! - **Cancellation**: a task was killed
//! - **Internal**: a scheduler invariant was violated (bug); always fatal
//! - **Registration**: bad entry points, unknown classes, out-of-range BFM or
//!   method ids, naming conflicts, marshaling and configuration errors;
//!   fail-fast at the point of misuse

use core::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::types::{CallbackId, TaskId};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Test ===
    /// A test assertion failed.
    TestFailure,
    /// User-provided error.
    User,

    // === Cancellation ===
    /// The task was killed before it could complete.
    Killed,
    /// A panic was captured inside a task.
    Panicked,

    // === Registration / resolution ===
    /// A method was registered outside its owning class, or a name was reused.
    NamingConflict,
    /// A BFM class path was registered twice.
    DuplicateType,
    /// An entry point, module, function, or class path could not be resolved.
    Resolution,
    /// A BFM id or method id does not exist.
    OutOfRange,
    /// A parameter could not be marshaled across the simulator boundary.
    Marshal,
    /// A configuration value was missing or malformed.
    Config,

    // === Internal ===
    /// Scheduler invariant violated (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::TestFailure | Self::User | Self::Panicked => ErrorCategory::Test,
            Self::Killed => ErrorCategory::Cancellation,
            Self::NamingConflict
            | Self::DuplicateType
            | Self::Resolution
            | Self::OutOfRange
            | Self::Marshal
            | Self::Config => ErrorCategory::Registration,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns true if an error of this kind must terminate the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Internal | ErrorCategory::Registration
        )
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Failures raised by test logic.
    Test,
    /// Task cancellation.
    Cancellation,
    /// Registration and resolution failures.
    Registration,
    /// Scheduler bugs.
    Internal,
}

/// Diagnostic context for an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The task where the error originated.
    pub task_id: Option<TaskId>,
    /// The BFM instance involved.
    pub bfm_id: Option<usize>,
    /// The simulator callback involved.
    pub callback_id: Option<CallbackId>,
}

/// The main error type for cosync operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
    /// Raise site first, then every resumption site in order.
    trace: Vec<&'static Location<'static>>,
}

impl Error {
    /// Creates a new error with the given kind, recording the caller as the
    /// raise site.
    #[must_use]
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext::default(),
            trace: vec![Location::caller()],
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this error must terminate the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Returns true if this error represents a killed task.
    #[must_use]
    pub const fn is_killed(&self) -> bool {
        matches!(self.kind, ErrorKind::Killed)
    }

    /// Returns true if this is a scheduler bug.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self.kind, ErrorKind::Internal)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds structured context to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        self.context = ctx;
        self
    }

    /// Tags the error with the task it belongs to.
    #[must_use]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.context.task_id = Some(task);
        self
    }

    /// Tags the error with a BFM instance id.
    #[must_use]
    pub fn with_bfm(mut self, bfm_id: usize) -> Self {
        self.context.bfm_id = Some(bfm_id);
        self
    }

    /// Tags the error with a simulator callback id.
    #[must_use]
    pub fn with_callback(mut self, id: CallbackId) -> Self {
        self.context.callback_id = Some(id);
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error context.
    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Returns the location the error was raised at.
    #[must_use]
    pub fn origin(&self) -> &'static Location<'static> {
        self.trace[0]
    }

    /// Returns the raise site followed by every site the error was replayed at.
    #[must_use]
    pub fn traceback(&self) -> &[&'static Location<'static>] {
        &self.trace
    }

    /// Records that the error was re-raised at `site`.
    pub(crate) fn record_resume(&mut self, site: &'static Location<'static>) {
        self.trace.push(site);
    }

    /// Creates a test failure.
    #[must_use]
    #[track_caller]
    pub fn test_failure(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TestFailure).with_message(detail)
    }

    /// Creates a user error.
    #[must_use]
    #[track_caller]
    pub fn user(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(detail)
    }

    /// Creates an internal error (scheduler bug).
    #[must_use]
    #[track_caller]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Creates a naming conflict error.
    #[must_use]
    #[track_caller]
    pub fn naming_conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NamingConflict).with_message(detail)
    }

    /// Creates a resolution error.
    #[must_use]
    #[track_caller]
    pub fn resolution(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution).with_message(detail)
    }

    /// Creates an out-of-range error for an id lookup.
    #[must_use]
    #[track_caller]
    pub fn out_of_range(what: &str, id: usize, len: usize) -> Self {
        Self::new(ErrorKind::OutOfRange)
            .with_message(format!("{what} {id} out of range (have {len})"))
    }

    /// Creates a configuration error.
    #[must_use]
    #[track_caller]
    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// A specialized Result type for cosync operations.
pub type Result<T> = core::result::Result<T, Error>;
