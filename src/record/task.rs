//! Task record for the scheduler.
//!
//! The record holds a task's lifecycle state and its stored future. The
//! future is taken out of the record while it is being polled so that code
//! running inside the task may freely look up other records.

use crate::error::{Error, Result};
use crate::runtime::stored_task::LocalStoredTask;
use crate::types::{Outcome, TaskId};
use smallvec::SmallVec;

/// The state of a task in its lifecycle.
#[derive(Debug, Clone)]
pub enum TaskState {
    /// Spawned but never polled.
    Created,
    /// Being polled.
    Started,
    /// Waiting on a trigger.
    Suspended,
    /// Kill requested. `delivered` becomes true once the pending wait has
    /// observed it; the routine may still be running cleanup.
    Killed {
        /// Whether the routine has seen the kill.
        delivered: bool,
    },
    /// Terminal state.
    Finished(Outcome<()>),
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// Returns true if a kill was requested.
    #[must_use]
    pub const fn is_killed(&self) -> bool {
        matches!(self, Self::Killed { .. })
    }

    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Suspended => "suspended",
            Self::Killed { .. } => "killed",
            Self::Finished(_) => "finished",
        }
    }
}

/// What the scheduler must do after a kill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillAction {
    /// Already killed or finished.
    Noop,
    /// Never ran: finish with `Killed` without polling.
    FinishNow,
    /// Resume the task so its pending wait observes the kill.
    DeliverOnResume,
}

/// Internal record for a task.
pub struct TaskRecord {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Name given at spawn.
    pub name: String,
    /// The spawning task, if any.
    pub parent: Option<TaskId>,
    /// Tasks spawned by this task.
    pub children: SmallVec<[TaskId; 4]>,
    /// Current state.
    pub state: TaskState,
    /// Description of the trigger currently awaited.
    pub waiting: Option<String>,
    future: Option<LocalStoredTask>,
    abort: Option<Box<dyn FnOnce()>>,
    polling: bool,
}

impl TaskRecord {
    /// Creates a record in the `Created` state.
    pub(crate) fn new(
        id: TaskId,
        name: String,
        parent: Option<TaskId>,
        future: LocalStoredTask,
        abort: Box<dyn FnOnce()>,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            children: SmallVec::new(),
            state: TaskState::Created,
            waiting: None,
            future: Some(future),
            abort: Some(abort),
            polling: false,
        }
    }

    /// Takes the future out for polling and moves to `Started`.
    ///
    /// A kill that is pending or already delivered is kept; the routine
    /// observes it at its next wait.
    pub(crate) fn begin_poll(&mut self) -> Result<LocalStoredTask> {
        if self.polling {
            return Err(
                Error::internal(format!("task {} resumed while it is being polled", self.id))
                    .with_task(self.id),
            );
        }
        let future = self.future.take().ok_or_else(|| {
            Error::internal(format!("task {} has no future to poll", self.id)).with_task(self.id)
        })?;
        self.polling = true;
        self.abort = None;
        if !self.state.is_killed() {
            self.state = TaskState::Started;
        }
        Ok(future)
    }

    /// Puts the future back after a `Pending` poll.
    pub(crate) fn suspend(&mut self, future: LocalStoredTask) {
        self.polling = false;
        self.future = Some(future);
        if !self.state.is_killed() {
            self.state = TaskState::Suspended;
        }
    }

    /// Records a kill request.
    pub(crate) fn request_kill(&mut self) -> KillAction {
        match self.state {
            TaskState::Created => KillAction::FinishNow,
            TaskState::Started | TaskState::Suspended => {
                self.state = TaskState::Killed { delivered: false };
                KillAction::DeliverOnResume
            }
            TaskState::Killed { .. } | TaskState::Finished(_) => KillAction::Noop,
        }
    }

    /// Consumes an undelivered kill. Returns true exactly once per kill.
    pub(crate) fn take_kill(&mut self) -> bool {
        if matches!(self.state, TaskState::Killed { delivered: false }) {
            self.state = TaskState::Killed { delivered: true };
            true
        } else {
            false
        }
    }

    /// Moves to `Finished`, returning whatever must be dropped or run outside
    /// any scheduler borrow.
    pub(crate) fn finish(
        &mut self,
        outcome: Outcome<()>,
    ) -> (Option<LocalStoredTask>, Option<Box<dyn FnOnce()>>) {
        self.polling = false;
        self.waiting = None;
        self.state = TaskState::Finished(outcome);
        (self.future.take(), self.abort.take())
    }

    /// Returns true while the future is out for polling.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling
    }
}

impl std::fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("waiting", &self.waiting)
            .finish_non_exhaustive()
    }
}
