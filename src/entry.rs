//! Entry-point resolution.
//!
//! The simulator process names its bootstrap with a string of the form
//! `"<module>:<dotted.function.path>"`, normally taken from
//! `COSYNC_ENTRY_POINT`. Modules are registered up front in an
//! [`EntryRegistry`]; resolution is a table lookup.
//!
//! A module must provide a `sim_event` handler, which receives simulator
//! notices. Its absence is reported when the entry point is resolved, not
//! when the first notice arrives.

use crate::error::{Error, Result};
use crate::harness::Harness;
use crate::runtime::env_config::{read_env, ENV_ENTRY_POINT};
use crate::runtime::scheduler::{NoticeHandler, Scheduler};
use crate::sim::SimNotice;
use crate::tracing_compat::debug;
use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

/// A bootstrap function: spawns the root tasks of a test.
pub type Bootstrap = Rc<dyn Fn(&Harness) -> Result<()>>;

/// A named set of bootstrap functions plus its notice handler.
pub struct EntryModule {
    name: String,
    functions: HashMap<String, Bootstrap>,
    sim_event: Option<NoticeHandler>,
}

impl EntryModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
            sim_event: None,
        }
    }

    /// Adds a bootstrap under a dotted path such as `"tests.smoke"`.
    #[must_use]
    pub fn function<F>(mut self, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Harness) -> Result<()> + 'static,
    {
        self.functions.insert(path.into(), Rc::new(f));
        self
    }

    /// Sets the handler for simulator notices.
    #[must_use]
    pub fn sim_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Scheduler, &SimNotice) -> Result<()> + 'static,
    {
        self.sim_event = Some(Rc::new(handler));
        self
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for EntryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("EntryModule")
            .field("name", &self.name)
            .field("functions", &functions)
            .field("sim_event", &self.sim_event.is_some())
            .finish()
    }
}

/// A resolved entry point.
#[derive(Clone)]
pub struct EntryPoint {
    spec: String,
    module: String,
    function: String,
    bootstrap: Bootstrap,
    sim_event: NoticeHandler,
}

impl EntryPoint {
    /// The string it was resolved from.
    #[must_use]
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Module name.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Dotted function path.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    pub(crate) fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }

    pub(crate) fn sim_event(&self) -> &NoticeHandler {
        &self.sim_event
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Modules available for entry-point resolution.
#[derive(Debug, Default)]
pub struct EntryRegistry {
    modules: HashMap<String, EntryModule>,
}

impl EntryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module. Module names must be unique.
    pub fn register(&mut self, module: EntryModule) -> Result<()> {
        if self.modules.contains_key(&module.name) {
            return Err(Error::naming_conflict(format!(
                "entry module `{}` registered twice",
                module.name
            )));
        }
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    /// Resolves `"<module>:<dotted.function.path>"`.
    ///
    /// Every failure is a `Resolution` error whose message quotes `spec`.
    pub fn resolve(&self, spec: &str) -> Result<EntryPoint> {
        let Some((module_name, function)) = spec.split_once(':') else {
            return Err(Error::resolution(format!(
                "entry point `{spec}` is not of the form `<module>:<function>`"
            )));
        };
        let (module_name, function) = (module_name.trim(), function.trim());
        if module_name.is_empty() || function.is_empty() {
            return Err(Error::resolution(format!(
                "entry point `{spec}` has an empty module or function"
            )));
        }
        let module = self.modules.get(module_name).ok_or_else(|| {
            Error::resolution(format!(
                "entry point `{spec}`: no module named `{module_name}`"
            ))
        })?;
        let bootstrap = module.functions.get(function).cloned().ok_or_else(|| {
            Error::resolution(format!(
                "entry point `{spec}`: module `{module_name}` has no function `{function}`"
            ))
        })?;
        let sim_event = module.sim_event.clone().ok_or_else(|| {
            Error::resolution(format!(
                "entry point `{spec}`: module `{module_name}` has no sim_event handler"
            ))
        })?;
        debug!(entry_point = %spec, "entry point resolved");
        Ok(EntryPoint {
            spec: spec.to_string(),
            module: module_name.to_string(),
            function: function.to_string(),
            bootstrap,
            sim_event,
        })
    }

    /// Resolves the entry point named by `COSYNC_ENTRY_POINT`.
    pub fn load_from_env(&self) -> Result<EntryPoint> {
        let spec = read_env(ENV_ENTRY_POINT)
            .ok_or_else(|| Error::config(format!("{ENV_ENTRY_POINT} is not set")))?;
        self.resolve(&spec)
    }
}
