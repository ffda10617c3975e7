//! The per-run context object.
//!
//! A [`Harness`] is built once when the simulator loads the host library. It
//! owns the scheduler and the BFM registry, wires inbound BFM calls from the
//! scheduler to the registry, and runs the bootstrap named by the entry
//! point. Nothing is global: several harnesses can coexist in one process.

use crate::bfm::{BfmBackend, BfmRegistry};
use crate::entry::{EntryPoint, EntryRegistry};
use crate::error::{Error, Result};
use crate::runtime::config::SchedulerConfig;
use crate::runtime::env_config::{apply_env_overrides, ENV_ENTRY_POINT};
use crate::runtime::scheduler::Scheduler;
use crate::sim::{CallTarget, EventSource, SimPort};
use crate::tracing_compat::info;
use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

/// Configuration for a [`Harness`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Entry point to boot, as `"<module>:<dotted.function.path>"`.
    pub entry_point: Option<String>,
}

impl HarnessConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Defaults, then the TOML file at `path`, then environment overrides.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self> {
        use crate::runtime::env_config::{apply_toml_config, parse_toml_file};
        let mut config = Self::default();
        apply_toml_config(&mut config, &parse_toml_file(path)?);
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Sets the entry point.
    #[must_use]
    pub fn entry_point(mut self, spec: impl Into<String>) -> Self {
        self.entry_point = Some(spec.into());
        self
    }

    /// Sets the scheduler configuration.
    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }
}

/// Scheduler, BFM registry, and loaded entry point for one run.
pub struct Harness {
    config: HarnessConfig,
    scheduler: Scheduler,
    bfms: Rc<BfmRegistry>,
    entry: RefCell<Option<EntryPoint>>,
}

impl Harness {
    /// Builds a harness. Inbound BFM calls are routed to its registry.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        let scheduler = Scheduler::new(config.scheduler.clone());
        let bfms = Rc::new(BfmRegistry::new());
        let target: Rc<dyn CallTarget> = bfms.clone();
        scheduler.set_call_target(Rc::downgrade(&target));
        Self {
            config,
            scheduler,
            bfms,
            entry: RefCell::new(None),
        }
    }

    /// The configuration the harness was built with.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The BFM registry.
    #[must_use]
    pub fn bfms(&self) -> &Rc<BfmRegistry> {
        &self.bfms
    }

    /// The inbox the simulator posts into.
    #[must_use]
    pub fn port(&self) -> SimPort {
        self.scheduler.port()
    }

    /// Attaches the simulator's callback registration interface.
    pub fn attach_simulator(&self, source: Rc<dyn EventSource>) {
        self.scheduler.set_event_source(source);
    }

    /// Discovers BFM instances through `backend`.
    pub fn instantiate_bfms(&self, backend: Rc<dyn BfmBackend>) -> Result<()> {
        self.bfms.instantiate(backend, &self.scheduler)
    }

    /// Installs the entry point's notice handler and runs its bootstrap.
    pub fn start(&self, entry: EntryPoint) -> Result<()> {
        info!(entry_point = %entry.spec(), "starting");
        self.scheduler.set_notice_handler(Rc::clone(entry.sim_event()));
        let bootstrap = Rc::clone(entry.bootstrap());
        *self.entry.borrow_mut() = Some(entry);
        bootstrap(self)
    }

    /// Resolves the configured entry point in `registry` and starts it.
    pub fn boot(&self, registry: &EntryRegistry) -> Result<()> {
        let spec = self.config.entry_point.as_deref().ok_or_else(|| {
            Error::config(format!("no entry point configured; set {ENV_ENTRY_POINT}"))
        })?;
        let entry = registry.resolve(spec)?;
        self.start(entry)
    }

    /// The entry point that was started, if any.
    #[must_use]
    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entry.borrow().clone()
    }

    /// Drives the scheduler until it is idle.
    pub fn run(&self) -> Result<()> {
        self.scheduler.run()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(HarnessConfig::default())
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("scheduler", &self.scheduler)
            .field("bfms", &self.bfms)
            .field("entry", &self.entry.borrow())
            .finish_non_exhaustive()
    }
}
