//! The capability context type.
//!
//! A `Cx` identifies the task it was handed to and holds a weak reference to
//! the scheduler, so a context captured in a routine never keeps the
//! scheduler alive.
//!
//! # Waiting
//!
//! [`Cx::wait`] returns a [`Wait`] future. On first poll it subscribes to the
//! trigger, arming it if no other task already has. When the trigger fires
//! the outcome is replayed at the `wait` call site: a captured error comes
//! back with that site appended to its traceback.
//!
//! If the task is killed while waiting, the next poll returns
//! `Err(TaskError::Killed)` instead of the trigger's outcome and drops the
//! subscription. Dropping a pending `Wait` also drops its subscription;
//! the trigger is disarmed when no awaiter is left.

use crate::error::Error;
use crate::runtime::scheduler::{Core, Scheduler};
use crate::runtime::task_handle::TaskHandle;
use crate::tracing_compat::debug;
use crate::trigger::{SubscriptionKey, Trigger};
use crate::types::{SimTime, TaskError, TaskId};
use core::fmt;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::rc::Weak;
use std::task::{Context, Poll};

/// The capability context of one task.
#[derive(Clone)]
pub struct Cx {
    core: Weak<Core>,
    task: TaskId,
}

impl Cx {
    pub(crate) fn new(core: Weak<Core>, task: TaskId) -> Self {
        Self { core, task }
    }

    /// Returns the ID of the task this context belongs to.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Waits for `trigger` to fire.
    #[track_caller]
    pub fn wait<'a, G>(&self, trigger: &'a G) -> Wait<'a, G>
    where
        G: Trigger + ?Sized,
    {
        Wait {
            trigger,
            core: Weak::clone(&self.core),
            task: self.task,
            key: None,
            site: Location::caller(),
            finished: false,
        }
    }

    /// Spawns a child task. The parent/child relation is recorded.
    #[track_caller]
    pub fn spawn<F, Fut, T>(
        &self,
        name: impl Into<String>,
        routine: F,
    ) -> Result<TaskHandle<T>, TaskError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, TaskError>> + 'static,
        T: Clone + 'static,
    {
        let site = Location::caller();
        let sched = self.scheduler()?;
        Ok(sched.spawn_task(name.into(), Some(self.task), site, routine))
    }

    /// Returns a handle to the scheduler running this task.
    pub fn scheduler(&self) -> Result<Scheduler, TaskError> {
        self.core
            .upgrade()
            .map(Scheduler::from_core)
            .ok_or_else(|| TaskError::Failed(Error::internal("scheduler dropped")))
    }

    /// Current simulation time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.core
            .upgrade()
            .map_or(SimTime::ZERO, |core| Scheduler::from_core(core).now())
    }

    /// Returns true if a kill is pending and has not been observed yet.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| Scheduler::from_core(core).kill_requested(self.task))
    }

    /// Observes a pending kill without waiting.
    ///
    /// Returns `Err(TaskError::Killed)` once per kill, like a pending wait
    /// would. Lets a routine that runs long between waits stop early.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        let killed = self
            .core
            .upgrade()
            .is_some_and(|core| Scheduler::from_core(core).take_kill(self.task));
        if killed {
            debug!(task_id = ?self.task, "kill observed at checkpoint");
            Err(TaskError::Killed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx").field("task", &self.task).finish()
    }
}

/// Future returned by [`Cx::wait`].
#[must_use = "futures do nothing unless awaited"]
pub struct Wait<'a, G: Trigger + ?Sized> {
    trigger: &'a G,
    core: Weak<Core>,
    task: TaskId,
    key: Option<SubscriptionKey>,
    site: &'static Location<'static>,
    finished: bool,
}

impl<G: Trigger + ?Sized> Wait<'_, G> {
    fn release(&mut self, sched: &Scheduler) {
        if let Some(key) = self.key.take() {
            if self.trigger.fanout().unsubscribe(key) {
                self.trigger.disarm(sched);
            }
            sched.set_waiting(self.task, None);
        }
    }
}

impl<G: Trigger + ?Sized> Future for Wait<'_, G> {
    type Output = Result<G::Output, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Err(TaskError::Failed(Error::internal(
                "wait polled after completion",
            ))));
        }
        let Some(core) = this.core.upgrade() else {
            this.finished = true;
            return Poll::Ready(Err(TaskError::Failed(Error::internal(
                "scheduler dropped while a task was waiting",
            ))));
        };
        let sched = Scheduler::from_core(core);

        if sched.take_kill(this.task) {
            this.release(&sched);
            this.finished = true;
            debug!(task_id = ?this.task, trigger = %this.trigger.describe(), "kill delivered");
            return Poll::Ready(Err(TaskError::Killed));
        }

        let key = if let Some(key) = this.key {
            key
        } else {
            let fanout = this.trigger.fanout();
            match fanout.subscribe(this.trigger, &sched, cx.waker().clone()) {
                Ok(key) => {
                    this.key = Some(key);
                    sched.set_waiting(this.task, Some(this.trigger.describe()));
                    key
                }
                Err(err) => {
                    this.finished = true;
                    return Poll::Ready(Err(TaskError::Failed(err.with_task(this.task))));
                }
            }
        };

        match this.trigger.fanout().take_delivery(key, cx.waker()) {
            Some(outcome) => {
                this.key = None;
                this.finished = true;
                sched.set_waiting(this.task, None);
                Poll::Ready(outcome.resume_at(this.site))
            }
            None => Poll::Pending,
        }
    }
}

impl<G: Trigger + ?Sized> Drop for Wait<'_, G> {
    fn drop(&mut self) {
        if self.key.is_none() {
            return;
        }
        if let Some(core) = self.core.upgrade() {
            self.release(&Scheduler::from_core(core));
        }
    }
}

impl<G: Trigger + ?Sized> fmt::Debug for Wait<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("trigger", &self.trigger.describe())
            .field("task", &self.task)
            .field("subscribed", &self.key.is_some())
            .finish()
    }
}
