//! TaskHandle for observing and controlling a spawned task.
//!
//! The handle does not own the task; the scheduler does. Dropping the handle
//! leaves the task running. The handle can query the task's state, read its
//! result once it has finished, kill it, or produce a [`Join`] trigger that
//! another task can await.

use crate::record::TaskState;
use crate::runtime::scheduler::{Core, Scheduler};
use crate::trigger::{Fanout, Fire, Join};
use crate::types::{Outcome, TaskError, TaskId};
use core::fmt;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Typed completion slot shared by a task, its handles, and its joiners.
pub(crate) struct TaskCell<T: Clone + 'static> {
    outcome: RefCell<Option<Outcome<T>>>,
    pending: RefCell<Option<Fire<Outcome<T>>>>,
    fanout: Fanout<Outcome<T>>,
}

impl<T: Clone + 'static> TaskCell<T> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            outcome: RefCell::new(None),
            pending: RefCell::new(None),
            fanout: Fanout::new(),
        })
    }

    /// Stores the final outcome and fires an armed join. Later calls are
    /// ignored.
    pub(crate) fn complete(&self, outcome: Outcome<T>) {
        {
            let mut slot = self.outcome.borrow_mut();
            if slot.is_some() {
                return;
            }
            *slot = Some(outcome.clone());
        }
        let pending = self.pending.borrow_mut().take();
        if let Some(fire) = pending {
            fire.fire(Outcome::Value(outcome));
        }
    }

    pub(crate) fn outcome(&self) -> Option<Outcome<T>> {
        self.outcome.borrow().clone()
    }

    pub(crate) fn erased(&self) -> Option<Outcome<()>> {
        self.outcome.borrow().as_ref().map(Outcome::erased)
    }

    pub(crate) fn fanout(&self) -> &Fanout<Outcome<T>> {
        &self.fanout
    }

    /// Arms a join cycle, firing at once if the task already finished.
    pub(crate) fn arm_join(&self, fire: Fire<Outcome<T>>) {
        let finished = self.outcome();
        match finished {
            Some(outcome) => {
                fire.fire(Outcome::Value(outcome));
            }
            None => *self.pending.borrow_mut() = Some(fire),
        }
    }

    pub(crate) fn disarm_join(&self) {
        self.pending.borrow_mut().take();
    }
}

/// A handle to a spawned task.
pub struct TaskHandle<T: Clone + 'static> {
    id: TaskId,
    name: String,
    cell: Rc<TaskCell<T>>,
    core: Weak<Core>,
}

impl<T: Clone + 'static> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, name: String, cell: Rc<TaskCell<T>>, core: Weak<Core>) -> Self {
        Self {
            id,
            name,
            cell,
            core,
        }
    }

    /// Returns the task ID.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the name given at spawn.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task's current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        if let Some(outcome) = self.cell.erased() {
            return TaskState::Finished(outcome);
        }
        self.scheduler()
            .and_then(|s| s.task_state(self.id))
            .unwrap_or(TaskState::Finished(Outcome::Error(TaskError::Killed)))
    }

    /// Returns true once the task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cell.outcome.borrow().is_some()
    }

    /// Returns the final outcome of a finished task.
    #[must_use]
    pub fn result(&self) -> Option<Outcome<T>> {
        self.cell.outcome()
    }

    /// Kills the task. See [`Scheduler::kill`].
    pub fn kill(&self) {
        if let Some(sched) = self.scheduler() {
            sched.kill(self.id);
        }
    }

    /// Returns a trigger that fires with the task's final outcome.
    #[must_use]
    pub fn join(&self) -> Join<T> {
        Join::new(self.id, Rc::clone(&self.cell))
    }

    /// Describes the trigger the task is waiting on, if any.
    #[must_use]
    pub fn waiting_on(&self) -> Option<String> {
        self.scheduler().and_then(|s| s.task_waiting(self.id))
    }

    /// Returns the tasks this task has spawned, while it is live.
    #[must_use]
    pub fn children(&self) -> Vec<TaskId> {
        self.scheduler()
            .map(|s| s.task_children(self.id))
            .unwrap_or_default()
    }

    fn scheduler(&self) -> Option<Scheduler> {
        self.core.upgrade().map(Scheduler::from_core)
    }
}

impl<T: Clone + 'static> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            cell: Rc::clone(&self.cell),
            core: Weak::clone(&self.core),
        }
    }
}

impl<T: Clone + 'static> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
