//! Await another task's completion.

use crate::error::Result;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::task_handle::TaskCell;
use crate::trigger::{Fanout, Fire, Trigger};
use crate::types::{Outcome, TaskId};
use std::rc::Rc;

/// Fires with a task's final outcome.
///
/// The awaiter receives the joined task's outcome as a value, so a joined
/// task that failed or was killed is told apart from the awaiter itself
/// being killed. Created by [`TaskHandle::join`](crate::runtime::TaskHandle::join).
pub struct Join<T: Clone + 'static> {
    task: TaskId,
    cell: Rc<TaskCell<T>>,
}

impl<T: Clone + 'static> Join<T> {
    pub(crate) fn new(task: TaskId, cell: Rc<TaskCell<T>>) -> Self {
        Self { task, cell }
    }

    /// The joined task.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }
}

impl<T: Clone + 'static> Trigger for Join<T> {
    type Output = Outcome<T>;

    fn fanout(&self) -> &Fanout<Outcome<T>> {
        self.cell.fanout()
    }

    fn arm(&self, _sched: &Scheduler, fire: Fire<Outcome<T>>) -> Result<()> {
        self.cell.arm_join(fire);
        Ok(())
    }

    fn disarm(&self, _sched: &Scheduler) {
        self.cell.disarm_join();
    }

    fn describe(&self) -> String {
        format!("Join({})", self.task)
    }
}

impl<T: Clone + 'static> std::fmt::Debug for Join<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Join").field("task", &self.task).finish()
    }
}
