//! Single-threaded cooperative scheduler.
//!
//! The scheduler owns every task record, the FIFO ready queue, and the table
//! of callbacks registered with the simulator. It is driven by [`Scheduler::run`]:
//!
//! 1. Drain the simulator inbox. Each fired callback, BFM call, or notice
//!    becomes ready work.
//! 2. Drain the ready queue, one handle at a time. Work appended while
//!    draining runs in the same pass. Tasks woken by a handle are queued for
//!    resumption, in wake order, before the next handle runs.
//! 3. Repeat until both the inbox and the ready queue are empty.
//!
//! Task resumptions are deduplicated: a task woken several times before it
//! runs is polled once.
//!
//! # Fatal errors
//!
//! An error returned by ready work is fatal. `run()` logs it, returns it, and
//! halts the scheduler; every later `run()` returns the same error. Failures
//! raised by test logic never take this path: they finish the owning task.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::record::{KillAction, TaskRecord, TaskState};
use crate::runtime::callback::{CallbackHandle, CallbackTable, ReadyQueue, Work};
use crate::runtime::config::SchedulerConfig;
use crate::runtime::stored_task::{CaptureUnwind, LocalStoredTask};
use crate::runtime::task_handle::{TaskCell, TaskHandle};
use crate::runtime::waker::WakeQueue;
use crate::sim::{BfmCall, CallTarget, CallbackRequest, EventSource, SimEvent, SimNotice, SimPort};
use crate::tracing_compat::{debug, error, trace, warn};
use crate::types::{CallbackId, Outcome, SimTime, TaskError, TaskId};
use core::fmt;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::Location;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Handler for simulator notices.
pub type NoticeHandler = Rc<dyn Fn(&Scheduler, &SimNotice) -> Result<()>>;

pub(crate) struct Core {
    config: SchedulerConfig,
    ready: RefCell<ReadyQueue>,
    callbacks: RefCell<CallbackTable>,
    tasks: RefCell<HashMap<TaskId, TaskRecord>>,
    resume_pending: RefCell<HashSet<TaskId>>,
    wakes: Arc<WakeQueue>,
    port: SimPort,
    source: RefCell<Option<Rc<dyn EventSource>>>,
    call_target: RefCell<Option<Weak<dyn CallTarget>>>,
    notice_handler: RefCell<Option<NoticeHandler>>,
    next_task: Cell<u64>,
    steps: Cell<u64>,
    running: Cell<bool>,
    halted: RefCell<Option<Error>>,
}

/// Handle to the scheduler. Clones share the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    core: Rc<Core>,
}

impl Scheduler {
    /// Creates a scheduler with its own simulator inbox.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let capacity = config.initial_queue_capacity;
        Self {
            core: Rc::new(Core {
                config,
                ready: RefCell::new(ReadyQueue::with_capacity(capacity)),
                callbacks: RefCell::new(CallbackTable::default()),
                tasks: RefCell::new(HashMap::new()),
                resume_pending: RefCell::new(HashSet::new()),
                wakes: Arc::new(WakeQueue::new()),
                port: SimPort::new(),
                source: RefCell::new(None),
                call_target: RefCell::new(None),
                notice_handler: RefCell::new(None),
                next_task: Cell::new(0),
                steps: Cell::new(0),
                running: Cell::new(false),
                halted: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn from_core(core: Rc<Core>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<Core> {
        Rc::downgrade(&self.core)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    /// Returns the inbox the simulator posts into.
    #[must_use]
    pub fn port(&self) -> SimPort {
        self.core.port.clone()
    }

    /// Attaches the simulator's callback registration interface.
    pub fn set_event_source(&self, source: Rc<dyn EventSource>) {
        *self.core.source.borrow_mut() = Some(source);
    }

    /// Routes inbound BFM calls to `target`.
    pub fn set_call_target(&self, target: Weak<dyn CallTarget>) {
        *self.core.call_target.borrow_mut() = Some(target);
    }

    /// Installs the handler for simulator notices.
    pub fn set_notice_handler(&self, handler: NoticeHandler) {
        *self.core.notice_handler.borrow_mut() = Some(handler);
    }

    /// Appends work to the ready queue.
    pub fn schedule<F>(&self, work: F) -> CallbackHandle
    where
        F: FnOnce(&Self) -> Result<()> + 'static,
    {
        self.schedule_labeled("work", Box::new(work))
    }

    pub(crate) fn schedule_labeled(&self, label: &'static str, work: Work) -> CallbackHandle {
        let handle = CallbackHandle::new(label, work);
        self.core.ready.borrow_mut().push(handle.clone());
        handle
    }

    /// Spawns a task.
    ///
    /// `routine` is called immediately to build the task's future; the body
    /// first runs when the scheduler reaches the task's first resumption.
    #[track_caller]
    pub fn spawn<F, Fut, T>(&self, name: impl Into<String>, routine: F) -> TaskHandle<T>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = core::result::Result<T, TaskError>> + 'static,
        T: Clone + 'static,
    {
        self.spawn_task(name.into(), None, Location::caller(), routine)
    }

    pub(crate) fn spawn_task<F, Fut, T>(
        &self,
        name: String,
        parent: Option<TaskId>,
        site: &'static Location<'static>,
        routine: F,
    ) -> TaskHandle<T>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = core::result::Result<T, TaskError>> + 'static,
        T: Clone + 'static,
    {
        let id = TaskId::from_raw(self.core.next_task.get());
        self.core.next_task.set(id.as_u64() + 1);

        let cell = TaskCell::<T>::new();
        let body = CaptureUnwind::new(routine(Cx::new(self.downgrade(), id)), site);
        let completion = Rc::clone(&cell);
        let future = async move {
            let outcome = Outcome::from(body.await);
            let summary = outcome.erased();
            completion.complete(outcome);
            summary
        };
        let abort_cell = Rc::clone(&cell);
        let record = TaskRecord::new(
            id,
            name.clone(),
            parent,
            LocalStoredTask::new(future, id),
            Box::new(move || abort_cell.complete(Outcome::Error(TaskError::Killed))),
        );

        {
            let mut tasks = self.core.tasks.borrow_mut();
            if let Some(parent) = parent.and_then(|p| tasks.get_mut(&p)) {
                parent.children.push(id);
            }
            tasks.insert(id, record);
        }
        debug!(task_id = ?id, name = %name, parent = ?parent, "task spawned");
        self.schedule_resume(id);
        TaskHandle::new(id, name, cell, self.downgrade())
    }

    /// Runs until the inbox and the ready queue are both empty.
    ///
    /// A nested call made while already running returns `Ok(())` at once;
    /// the outer loop picks up whatever the caller added.
    pub fn run(&self) -> Result<()> {
        if let Some(err) = self.core.halted.borrow().as_ref() {
            return Err(err.clone());
        }
        if self.core.running.replace(true) {
            trace!("nested run() ignored");
            return Ok(());
        }
        let result = self.drain();
        self.core.running.set(false);
        if let Err(err) = &result {
            error!(error = %err, origin = %err.origin(), "scheduler halted");
            *self.core.halted.borrow_mut() = Some(err.clone());
        }
        result
    }

    fn drain(&self) -> Result<()> {
        let mut executed = 0u64;
        loop {
            while let Some(event) = self.core.port.pop() {
                self.accept(event)?;
            }
            loop {
                self.collect_woken();
                let next = self.core.ready.borrow_mut().pop();
                let Some(handle) = next else { break };
                self.count_step(&mut executed)?;
                handle.run(self)?;
            }
            if self.core.port.is_empty() && self.core.wakes.is_empty() {
                return Ok(());
            }
        }
    }

    fn count_step(&self, executed: &mut u64) -> Result<()> {
        *executed += 1;
        self.core.steps.set(self.core.steps.get() + 1);
        match self.core.config.max_steps_per_run {
            Some(max) if *executed > max => Err(Error::internal(format!(
                "run() exceeded {max} callbacks without going idle"
            ))),
            _ => Ok(()),
        }
    }

    fn accept(&self, event: SimEvent) -> Result<()> {
        match event {
            SimEvent::Callback(id) => {
                let work = self.core.callbacks.borrow_mut().take_fired(id)?;
                if let Some(work) = work {
                    trace!(callback_id = ?id, "callback fired");
                    self.schedule_labeled("callback", work);
                } else {
                    trace!(callback_id = ?id, "stale callback ignored");
                }
            }
            SimEvent::Call(call) => {
                trace!(bfm_id = call.bfm_id, method_id = call.method_id, "bfm call received");
                self.schedule_labeled("bfm-call", Box::new(move |sched| sched.route_call(&call)));
            }
            SimEvent::Notice(notice) => {
                self.schedule_labeled("notice", Box::new(move |sched| sched.deliver_notice(&notice)));
            }
        }
        Ok(())
    }

    fn route_call(&self, call: &BfmCall) -> Result<()> {
        let target = self
            .core
            .call_target
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade);
        let Some(target) = target else {
            return Err(Error::resolution(format!(
                "call on BFM {} method {} with no registry attached",
                call.bfm_id, call.method_id
            ))
            .with_bfm(call.bfm_id));
        };
        target.dispatch_call(call)
    }

    fn deliver_notice(&self, notice: &SimNotice) -> Result<()> {
        let handler = self.core.notice_handler.borrow().clone();
        match handler {
            Some(handler) => handler(self, notice),
            None => {
                debug!(level = %notice.level, message = %notice.message, "simulator notice dropped");
                Ok(())
            }
        }
    }

    fn collect_woken(&self) {
        while let Some(id) = self.core.wakes.pop() {
            self.schedule_resume(id);
        }
    }

    fn schedule_resume(&self, id: TaskId) {
        if !self.core.resume_pending.borrow_mut().insert(id) {
            return;
        }
        self.schedule_labeled("resume", Box::new(move |sched| sched.poll_task(id)));
    }

    fn poll_task(&self, id: TaskId) -> Result<()> {
        self.core.resume_pending.borrow_mut().remove(&id);
        let mut future = {
            let mut tasks = self.core.tasks.borrow_mut();
            let Some(record) = tasks.get_mut(&id) else {
                trace!(task_id = ?id, "resume of finished task ignored");
                return Ok(());
            };
            record.begin_poll()?
        };

        let waker = self.core.wakes.waker(id);
        let mut cx = Context::from_waker(&waker);
        match future.poll(&mut cx) {
            Poll::Pending => {
                if let Some(record) = self.core.tasks.borrow_mut().get_mut(&id) {
                    trace!(task_id = ?id, waiting = ?record.waiting, "task suspended");
                    record.suspend(future);
                }
                Ok(())
            }
            Poll::Ready(outcome) => {
                drop(future);
                self.finish_task(id, outcome);
                Ok(())
            }
        }
    }

    fn finish_task(&self, id: TaskId, outcome: Outcome<()>) {
        let record = self.core.tasks.borrow_mut().remove(&id);
        let Some(mut record) = record else { return };
        match &outcome {
            Outcome::Value(()) => {
                debug!(task_id = ?id, name = %record.name, "task finished");
            }
            Outcome::Error(TaskError::Killed) => {
                debug!(task_id = ?id, name = %record.name, "task finished after kill");
            }
            Outcome::Error(err) => {
                warn!(task_id = ?id, name = %record.name, error = %err, "task finished with error");
            }
        }
        let (future, abort) = record.finish(outcome);
        drop(future);
        if let Some(abort) = abort {
            abort();
        }
    }

    /// Kills a task.
    ///
    /// A task that never ran finishes immediately with `Killed`. A started
    /// task is resumed so that its pending wait returns `Err(Killed)`; its
    /// cleanup then runs normally. Killing a finished task does nothing.
    pub fn kill(&self, id: TaskId) {
        let action = self
            .core
            .tasks
            .borrow_mut()
            .get_mut(&id)
            .map_or(KillAction::Noop, TaskRecord::request_kill);
        match action {
            KillAction::Noop => {
                trace!(task_id = ?id, "kill ignored");
            }
            KillAction::DeliverOnResume => {
                debug!(task_id = ?id, "kill requested");
                self.schedule_resume(id);
            }
            KillAction::FinishNow => {
                debug!(task_id = ?id, "task killed before it started");
                self.finish_task(id, Outcome::Error(TaskError::Killed));
            }
        }
    }

    pub(crate) fn take_kill(&self, id: TaskId) -> bool {
        self.core
            .tasks
            .borrow_mut()
            .get_mut(&id)
            .is_some_and(TaskRecord::take_kill)
    }

    pub(crate) fn kill_requested(&self, id: TaskId) -> bool {
        self.core
            .tasks
            .borrow()
            .get(&id)
            .is_some_and(|record| matches!(record.state, TaskState::Killed { delivered: false }))
    }

    pub(crate) fn set_waiting(&self, id: TaskId, waiting: Option<String>) {
        if let Some(record) = self.core.tasks.borrow_mut().get_mut(&id) {
            record.waiting = waiting;
        }
    }

    /// Returns the state of a live task, or `None` once it has finished.
    #[must_use]
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.core.tasks.borrow().get(&id).map(|r| r.state.clone())
    }

    /// Returns what a live task is waiting on.
    #[must_use]
    pub fn task_waiting(&self, id: TaskId) -> Option<String> {
        self.core.tasks.borrow().get(&id).and_then(|r| r.waiting.clone())
    }

    /// Returns the children a live task has spawned.
    #[must_use]
    pub fn task_children(&self, id: TaskId) -> Vec<TaskId> {
        self.core
            .tasks
            .borrow()
            .get(&id)
            .map(|r| r.children.to_vec())
            .unwrap_or_default()
    }

    /// Returns the parent of a live task.
    #[must_use]
    pub fn task_parent(&self, id: TaskId) -> Option<TaskId> {
        self.core.tasks.borrow().get(&id).and_then(|r| r.parent)
    }

    /// Registers a simulator callback that schedules `work` when it fires.
    pub fn register_callback<F>(&self, request: CallbackRequest, work: F) -> Result<CallbackId>
    where
        F: FnOnce(&Self) -> Result<()> + 'static,
    {
        let source = self
            .core
            .source
            .borrow()
            .clone()
            .ok_or_else(|| Error::config("no event source attached to the scheduler"))?;
        let id = self.core.callbacks.borrow_mut().register(Box::new(work));
        if let Err(err) = source.register(id, request) {
            self.core.callbacks.borrow_mut().discard(id);
            return Err(err.with_callback(id));
        }
        trace!(callback_id = ?id, request = ?request, "callback registered");
        Ok(id)
    }

    /// Cancels an armed simulator callback. Returns false if it was not armed.
    pub fn cancel_callback(&self, id: CallbackId) -> bool {
        let cancelled = self.core.callbacks.borrow_mut().cancel(id);
        if cancelled {
            let source = self.core.source.borrow().clone();
            if let Some(source) = source {
                source.cancel(id);
            }
            trace!(callback_id = ?id, "callback cancelled");
        }
        cancelled
    }

    /// Current simulation time, or zero with no event source attached.
    #[must_use]
    pub fn now(&self) -> SimTime {
        let source = self.core.source.borrow().clone();
        source.map_or(SimTime::ZERO, |s| s.now())
    }

    /// Total callbacks executed over the scheduler's lifetime.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.core.steps.get()
    }

    /// Number of tasks that have not finished.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        self.core.tasks.borrow().len()
    }

    /// Number of callbacks armed with the simulator.
    #[must_use]
    pub fn armed_callbacks(&self) -> usize {
        self.core.callbacks.borrow().armed_len()
    }

    /// Returns true if nothing is waiting to run.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.core.ready.borrow().is_empty()
            && self.core.port.is_empty()
            && self.core.wakes.is_empty()
    }

    /// Returns the error that halted the scheduler, if any.
    #[must_use]
    pub fn halted(&self) -> Option<Error> {
        self.core.halted.borrow().clone()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("ready", &self.core.ready.borrow().len())
            .field("tasks", &self.core.tasks.borrow().len())
            .field("callbacks", &*self.core.callbacks.borrow())
            .field("steps", &self.core.steps.get())
            .field("halted", &self.core.halted.borrow().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crate::types::CallbackId;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn schedule_runs_in_fifo_order() {
        init_test("schedule_runs_in_fifo_order");
        let sched = Scheduler::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 1..=3 {
            let log = Rc::clone(&log);
            sched.schedule(move |s| {
                log.borrow_mut().push(n);
                if n == 3 {
                    let log = Rc::clone(&log);
                    s.schedule(move |_| {
                        log.borrow_mut().push(4);
                        Ok(())
                    });
                }
                Ok(())
            });
        }
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2, 3, 4]);
        assert!(sched.is_idle());
        assert_eq!(sched.steps(), 4);
        crate::test_complete!("schedule_runs_in_fifo_order");
    }

    #[test]
    fn cancelled_handle_never_runs() {
        init_test("cancelled_handle_never_runs");
        let sched = Scheduler::default();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let handle = sched.schedule(move |_| {
            flag.set(true);
            Ok(())
        });
        handle.cancel();
        sched.run().unwrap();
        assert!(!ran.get());
        assert!(!handle.is_executed());
    }

    #[test]
    fn cancel_after_run_is_a_noop() {
        init_test("cancel_after_run_is_a_noop");
        let sched = Scheduler::default();
        let runs = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&runs);
        let handle = sched.schedule(move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });
        sched.run().unwrap();

        handle.cancel();
        handle.cancel();
        sched.run().unwrap();

        assert_eq!(runs.get(), 1);
        assert!(handle.is_executed());
        assert!(!handle.is_cancelled());
        assert!(sched.halted().is_none());
        crate::test_complete!("cancel_after_run_is_a_noop");
    }

    #[test]
    fn repeated_wakes_resume_once() {
        init_test("repeated_wakes_resume_once");
        let sched = Scheduler::default();
        let polls = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&polls);
        let task = sched.spawn("double-wake", move |_cx| async move {
            std::future::poll_fn(|cx| {
                counter.set(counter.get() + 1);
                if counter.get() == 1 {
                    cx.waker().wake_by_ref();
                    cx.waker().wake_by_ref();
                    cx.waker().clone().wake();
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            })
            .await;
            Ok(())
        });
        sched.run().unwrap();

        assert_eq!(polls.get(), 2);
        assert_eq!(sched.steps(), 2);
        assert!(task.is_finished());
        assert!(sched.is_idle());
    }

    #[test]
    fn nested_run_returns_immediately() {
        init_test("nested_run_returns_immediately");
        let sched = Scheduler::default();
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = Rc::clone(&order);
        sched.schedule(move |s| {
            let inner = Rc::clone(&outer);
            s.schedule(move |_| {
                inner.borrow_mut().push("queued");
                Ok(())
            });
            s.run()?;
            outer.borrow_mut().push("after nested run");
            Ok(())
        });
        sched.run().unwrap();
        assert_eq!(*order.borrow(), vec!["after nested run", "queued"]);
    }

    #[test]
    fn internal_error_halts() {
        init_test("internal_error_halts");
        let sched = Scheduler::default();
        sched.port().fire(CallbackId::from_raw(0));
        let err = sched.run().unwrap_err();
        assert!(err.is_internal());
        let again = sched.run().unwrap_err();
        assert_eq!(again.message(), err.message());
        assert!(sched.halted().is_some());
    }

    #[test]
    fn runaway_guard_trips() {
        init_test("runaway_guard_trips");
        let sched = Scheduler::new(SchedulerConfig::new().max_steps_per_run(5));
        fn forever(s: &Scheduler) -> Result<()> {
            s.schedule(forever);
            Ok(())
        }
        sched.schedule(forever);
        let err = sched.run().unwrap_err();
        assert!(err.is_internal());
        assert_eq!(sched.steps(), 6);
    }

    #[test]
    fn register_without_source_is_config_error() {
        let sched = Scheduler::default();
        let err = sched
            .register_callback(CallbackRequest::Timer { ticks: 1 }, |_| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn notice_without_handler_is_dropped() {
        let sched = Scheduler::default();
        sched
            .port()
            .notify(crate::sim::NoticeLevel::Info, "simulation started");
        sched.run().unwrap();
        assert!(sched.is_idle());
    }
}
