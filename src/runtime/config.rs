//! Scheduler configuration.

/// Default bound on callbacks executed by a single `run()`.
pub const DEFAULT_MAX_STEPS_PER_RUN: u64 = 1_000_000;

/// Default initial capacity of the ready queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Configuration for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum callbacks one `run()` may execute before it is treated as a
    /// runaway loop. `None` disables the guard.
    pub max_steps_per_run: Option<u64>,
    /// Initial capacity of the ready queue.
    pub initial_queue_capacity: usize,
}

impl SchedulerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_steps_per_run: Some(DEFAULT_MAX_STEPS_PER_RUN),
            initial_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the runaway guard.
    #[must_use]
    pub const fn max_steps_per_run(mut self, steps: u64) -> Self {
        self.max_steps_per_run = Some(steps);
        self
    }

    /// Disables the runaway guard.
    #[must_use]
    pub const fn no_step_limit(mut self) -> Self {
        self.max_steps_per_run = None;
        self
    }

    /// Sets the initial ready-queue capacity.
    #[must_use]
    pub const fn initial_queue_capacity(mut self, capacity: usize) -> Self {
        self.initial_queue_capacity = capacity;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
