//! Registry of BFM classes and their live instances.
//!
//! Classes are registered explicitly at the start of a run with
//! [`BfmRegistry::register_type`]. Instances are discovered late, from the
//! simulator glue, by [`BfmRegistry::instantiate`]; each gets the next id in
//! discovery order and keeps it for the life of the process.
//!
//! Inbound calls arrive as `(bfm_id, method_id, raw words)` and are routed by
//! [`BfmRegistry::dispatch`]. Exports run synchronously on the scheduling
//! thread; they may set events or spawn tasks but never suspend.

use super::backend::BfmBackend;
use super::param::{pack_all, unpack_all, ParamKind, ParamValue};
use super::type_info::{split_class_path, BfmTypeInfo, Direction, MethodDecl, MethodInfo, ParamInfo};
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::scheduler::Scheduler;
use crate::sim::{BfmCall, CallTarget};
use crate::tracing_compat::{debug, info, trace};
use core::fmt;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A host-side driver class.
pub trait Bfm: Sized + 'static {
    /// Declares the class's import and export tables.
    fn describe(builder: &mut BfmTypeBuilder<Self>);

    /// Builds the driver for one discovered instance.
    fn construct(ctx: BfmContext) -> Result<Self>;
}

type ExportFn<B> = Box<dyn Fn(&mut B, &[ParamValue]) -> Result<()>>;
type Invoke = Box<dyn Fn(usize, &[ParamValue]) -> Result<()>>;

/// Collects the method tables of one class.
///
/// The first invalid declaration is remembered and reported by
/// [`BfmRegistry::register_type`]; later declarations are ignored.
pub struct BfmTypeBuilder<B> {
    info: BfmTypeInfo,
    exports: Vec<ExportFn<B>>,
    error: Option<Error>,
}

impl<B: 'static> BfmTypeBuilder<B> {
    fn new(info: BfmTypeInfo) -> Self {
        Self {
            info,
            exports: Vec::new(),
            error: None,
        }
    }

    /// Declares a method the host calls on the simulator.
    pub fn import(&mut self, decl: MethodDecl) -> &mut Self {
        self.declare(decl, Direction::Import);
        self
    }

    /// Declares a method the simulator calls on the host.
    pub fn export<F>(&mut self, decl: MethodDecl, handler: F) -> &mut Self
    where
        F: Fn(&mut B, &[ParamValue]) -> Result<()> + 'static,
    {
        if self.declare(decl, Direction::Export) {
            self.exports.push(Box::new(handler));
        }
        self
    }

    fn declare(&mut self, decl: MethodDecl, direction: Direction) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self.method_info(decl, direction) {
            Ok(method) => {
                match direction {
                    Direction::Import => self.info.imports.push(method),
                    Direction::Export => self.info.exports.push(method),
                }
                true
            }
            Err(err) => {
                self.error = Some(err);
                false
            }
        }
    }

    fn method_info(&self, decl: MethodDecl, direction: Direction) -> Result<MethodInfo> {
        let qualified = decl.qualified_name;
        let Some((owner, name)) = qualified.rsplit_once('.') else {
            return Err(Error::naming_conflict(format!(
                "method `{qualified}` is not qualified by its class `{}`",
                self.info.type_name
            )));
        };
        if owner != self.info.type_name && owner != self.info.class_path {
            return Err(Error::naming_conflict(format!(
                "method `{qualified}` does not belong to class `{}`",
                self.info.type_name
            )));
        }
        let table = match direction {
            Direction::Import => &self.info.imports,
            Direction::Export => &self.info.exports,
        };
        if name.is_empty() || table.iter().any(|m| m.name == name) {
            return Err(Error::naming_conflict(format!(
                "method `{qualified}` declared twice in `{}`",
                self.info.class_path
            )));
        }
        let params = decl
            .params
            .into_iter()
            .map(|(param, ty)| {
                let kind = ty.kind().map_err(|e| {
                    let detail = format!("parameter `{param}` of `{qualified}`: {e}");
                    Error::from(e).with_message(detail)
                })?;
                Ok(ParamInfo { name: param, kind })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MethodInfo {
            id: table.len(),
            name: name.to_string(),
            qualified_name: qualified,
            params,
            direction,
        })
    }
}

impl<B> fmt::Debug for BfmTypeBuilder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BfmTypeBuilder")
            .field("info", &self.info)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// What a driver gets at construction: its identity and a way to call the
/// simulator side.
#[derive(Clone)]
pub struct BfmContext {
    scheduler: Scheduler,
    backend: Rc<dyn BfmBackend>,
    bfm_id: usize,
    instance_name: String,
    type_info: Rc<BfmTypeInfo>,
}

impl BfmContext {
    /// The scheduler, for spawning tasks from exports.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// This instance's id.
    #[must_use]
    pub const fn bfm_id(&self) -> usize {
        self.bfm_id
    }

    /// Hierarchical instance name.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// The class's method tables.
    #[must_use]
    pub fn type_info(&self) -> &BfmTypeInfo {
        &self.type_info
    }

    /// Sends an import call to the simulator side.
    ///
    /// `method` is the short name from the import table. Parameters are
    /// range-checked and packed before anything is sent.
    pub fn call_import(&self, method: &str, params: &[ParamValue]) -> Result<()> {
        let info = self.type_info.import(method).ok_or_else(|| {
            Error::resolution(format!(
                "class `{}` has no import `{method}`",
                self.type_info.class_path
            ))
            .with_bfm(self.bfm_id)
        })?;
        let kinds: Vec<ParamKind> = info.kinds();
        let words = pack_all(params, &kinds).map_err(|e| Error::from(e).with_bfm(self.bfm_id))?;
        trace!(bfm_id = self.bfm_id, method = %info.qualified_name, "import call");
        self.backend.send_msg(self.bfm_id, info.id, &words)
    }
}

impl fmt::Debug for BfmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BfmContext")
            .field("bfm_id", &self.bfm_id)
            .field("instance_name", &self.instance_name)
            .field("class_path", &self.type_info.class_path)
            .finish_non_exhaustive()
    }
}

/// A live BFM instance.
pub struct BfmInfo {
    id: usize,
    instance_name: String,
    type_name: String,
    type_info: Rc<BfmTypeInfo>,
    object: Rc<dyn Any>,
    invoke: Invoke,
}

impl BfmInfo {
    /// Position in the live table.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Hierarchical instance name.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Type name declared by the simulator side.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Class path of the host driver.
    #[must_use]
    pub fn class_path(&self) -> &str {
        &self.type_info.class_path
    }

    /// The class's method tables.
    #[must_use]
    pub fn type_info(&self) -> &BfmTypeInfo {
        &self.type_info
    }

    /// The driver object, if it is a `B`.
    #[must_use]
    pub fn downcast<B: Bfm>(&self) -> Option<Rc<RefCell<B>>> {
        Rc::clone(&self.object).downcast::<RefCell<B>>().ok()
    }
}

impl fmt::Debug for BfmInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BfmInfo")
            .field("id", &self.id)
            .field("instance_name", &self.instance_name)
            .field("type_name", &self.type_name)
            .field("class_path", &self.type_info.class_path)
            .finish_non_exhaustive()
    }
}

struct RegisteredType {
    info: Rc<BfmTypeInfo>,
    construct: Box<dyn Fn(BfmContext) -> Result<(Rc<dyn Any>, Invoke)>>,
}

/// Classes and live instances.
#[derive(Default)]
pub struct BfmRegistry {
    types: RefCell<Vec<Rc<RegisteredType>>>,
    live: RefCell<Vec<Rc<BfmInfo>>>,
    initialized: Cell<bool>,
}

impl BfmRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers driver class `B` under `class_path`.
    pub fn register_type<B: Bfm>(&self, class_path: &str) -> Result<()> {
        split_class_path(class_path)?;
        if self.lookup(class_path).is_some() {
            return Err(Error::new(ErrorKind::DuplicateType)
                .with_message(format!("class `{class_path}` is already registered")));
        }

        let mut builder = BfmTypeBuilder::<B>::new(BfmTypeInfo::new(class_path)?);
        B::describe(&mut builder);
        if let Some(err) = builder.error {
            return Err(err);
        }
        let info = Rc::new(builder.info);
        let exports = Rc::new(builder.exports);
        info!(
            class_path,
            imports = info.imports.len(),
            exports = info.exports.len(),
            "bfm type registered"
        );

        let construct = Box::new(move |ctx: BfmContext| -> Result<(Rc<dyn Any>, Invoke)> {
            let object = Rc::new(RefCell::new(B::construct(ctx)?));
            let target = Rc::clone(&object);
            let exports = Rc::clone(&exports);
            let invoke: Invoke = Box::new(move |method_id, values| {
                let handler = exports.get(method_id).ok_or_else(|| {
                    Error::out_of_range("method id", method_id, exports.len())
                })?;
                let mut driver = target.try_borrow_mut().map_err(|_| {
                    Error::internal("export called while the same driver is already executing")
                })?;
                handler(&mut driver, values)
            });
            Ok((object as Rc<dyn Any>, invoke))
        });
        self.types.borrow_mut().push(Rc::new(RegisteredType {
            info,
            construct,
        }));
        Ok(())
    }

    fn lookup(&self, class_path: &str) -> Option<Rc<RegisteredType>> {
        self.types
            .borrow()
            .iter()
            .find(|t| t.info.class_path == class_path)
            .cloned()
    }

    /// Discovers and constructs every instance the backend reports.
    ///
    /// Ids are assigned in discovery order. Nothing is committed unless every
    /// instance resolves and constructs. A second call is a no-op.
    pub fn instantiate(&self, backend: Rc<dyn BfmBackend>, scheduler: &Scheduler) -> Result<()> {
        if self.initialized.get() {
            debug!("bfm registry already initialized");
            return Ok(());
        }
        let count = backend.instance_count();
        let mut staged = Vec::with_capacity(count);
        for index in 0..count {
            let desc = backend.instance_info(index)?;
            split_class_path(&desc.class_path)?;
            let ty = self.lookup(&desc.class_path).ok_or_else(|| {
                Error::resolution(format!(
                    "no BFM class `{}` registered for instance `{}`",
                    desc.class_path, desc.instance_name
                ))
                .with_bfm(index)
            })?;
            let ctx = BfmContext {
                scheduler: scheduler.clone(),
                backend: Rc::clone(&backend),
                bfm_id: index,
                instance_name: desc.instance_name.clone(),
                type_info: Rc::clone(&ty.info),
            };
            let (object, invoke) = (ty.construct)(ctx)?;
            debug!(
                bfm_id = index,
                instance = %desc.instance_name,
                class_path = %desc.class_path,
                "bfm instance constructed"
            );
            staged.push(Rc::new(BfmInfo {
                id: index,
                instance_name: desc.instance_name,
                type_name: desc.type_name,
                type_info: Rc::clone(&ty.info),
                object,
                invoke,
            }));
        }
        *self.live.borrow_mut() = staged;
        self.initialized.set(true);
        info!(instances = count, "bfm registry initialized");
        Ok(())
    }

    /// Routes an inbound call to export `method_id` of instance `bfm_id`.
    pub fn dispatch(&self, bfm_id: usize, method_id: usize, raw: &[u64]) -> Result<()> {
        let instance = self.get(bfm_id).ok_or_else(|| {
            Error::out_of_range("bfm id", bfm_id, self.len()).with_bfm(bfm_id)
        })?;
        let exports = &instance.type_info.exports;
        let method = exports.get(method_id).ok_or_else(|| {
            Error::out_of_range("method id", method_id, exports.len()).with_bfm(bfm_id)
        })?;
        let values =
            unpack_all(raw, &method.kinds()).map_err(|e| Error::from(e).with_bfm(bfm_id))?;
        trace!(bfm_id, method = %method.qualified_name, "export call");
        (instance.invoke)(method_id, &values).map_err(|e| e.with_bfm(bfm_id))
    }

    /// The instance with id `bfm_id`.
    #[must_use]
    pub fn get(&self, bfm_id: usize) -> Option<Rc<BfmInfo>> {
        self.live.borrow().get(bfm_id).cloned()
    }

    /// Instances whose name matches `pattern`, where `*` matches any run of
    /// characters.
    #[must_use]
    pub fn find(&self, pattern: &str) -> Vec<Rc<BfmInfo>> {
        self.live
            .borrow()
            .iter()
            .filter(|b| glob_match(pattern, &b.instance_name))
            .cloned()
            .collect()
    }

    /// The driver object of instance `bfm_id`, if it is a `B`.
    #[must_use]
    pub fn instance<B: Bfm>(&self, bfm_id: usize) -> Option<Rc<RefCell<B>>> {
        self.get(bfm_id)?.downcast::<B>()
    }

    /// Number of live instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }

    /// Returns true if there are no live instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.borrow().is_empty()
    }

    /// Returns true once `instantiate` has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// The method tables registered under `class_path`.
    #[must_use]
    pub fn type_info(&self, class_path: &str) -> Option<BfmTypeInfo> {
        self.lookup(class_path).map(|t| (*t.info).clone())
    }

    /// Method tables of every registered class, in registration order.
    #[must_use]
    pub fn type_infos(&self) -> Vec<BfmTypeInfo> {
        self.types
            .borrow()
            .iter()
            .map(|t| (*t.info).clone())
            .collect()
    }

    /// Serializes every registered class's tables for the glue generator.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.type_infos())
            .map_err(|e| Error::internal(format!("serializing bfm types: {e}")).with_source(e))
    }
}

impl CallTarget for BfmRegistry {
    fn dispatch_call(&self, call: &BfmCall) -> Result<()> {
        self.dispatch(call.bfm_id, call.method_id, &call.params)
    }
}

impl fmt::Debug for BfmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BfmRegistry")
            .field("types", &self.types.borrow().len())
            .field("instances", &self.live.borrow().len())
            .field("initialized", &self.initialized.get())
            .finish()
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfm::param::ParamType;
    use crate::sim::{LabBfmBackend, SimPort};

    #[derive(Debug)]
    struct Counter {
        ctx: BfmContext,
        total: i64,
    }

    impl Bfm for Counter {
        fn describe(b: &mut BfmTypeBuilder<Self>) {
            b.import(MethodDecl::new("Counter.report").param("total", ParamType::I32))
                .export(
                    MethodDecl::new("Counter.add").param("delta", ParamType::I16),
                    |c, args| {
                        c.total += args[0].to::<i64>()?;
                        Ok(())
                    },
                )
                .export(MethodDecl::new("Counter.flush"), |c, _| {
                    c.ctx.call_import("report", &[ParamValue::Signed(c.total)])
                });
        }

        fn construct(ctx: BfmContext) -> Result<Self> {
            Ok(Self { ctx, total: 0 })
        }
    }

    struct Misnamed;

    impl Bfm for Misnamed {
        fn describe(b: &mut BfmTypeBuilder<Self>) {
            b.export(MethodDecl::new("Other.go"), |_, _| Ok(()));
        }

        fn construct(_: BfmContext) -> Result<Self> {
            Ok(Self)
        }
    }

    fn setup() -> (BfmRegistry, Rc<LabBfmBackend>) {
        let registry = BfmRegistry::new();
        registry.register_type::<Counter>("drivers.Counter").unwrap();
        let backend = Rc::new(
            LabBfmBackend::new(SimPort::new())
                .with_instance("counter", "top.c0", "drivers.Counter")
                .with_instance("counter", "top.c1", "drivers.Counter"),
        );
        registry
            .instantiate(backend.clone(), &Scheduler::default())
            .unwrap();
        (registry, backend)
    }

    #[test]
    fn dispatch_unpacks_signed_words() {
        let (registry, _) = setup();
        registry.dispatch(1, 0, &[0xFFFE]).unwrap();
        registry.dispatch(1, 0, &[5]).unwrap();
        assert_eq!(registry.instance::<Counter>(1).unwrap().borrow().total, 3);
        assert_eq!(registry.instance::<Counter>(0).unwrap().borrow().total, 0);
    }

    #[test]
    fn dispatch_rejects_bad_ids_and_arity() {
        let (registry, _) = setup();
        assert_eq!(registry.dispatch(2, 0, &[1]).unwrap_err().kind(), ErrorKind::OutOfRange);
        assert_eq!(registry.dispatch(0, 9, &[1]).unwrap_err().kind(), ErrorKind::OutOfRange);
        let err = registry.dispatch(0, 0, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Marshal);
        assert_eq!(err.context().bfm_id, Some(0));
    }

    #[test]
    fn exports_can_call_imports() {
        let (registry, backend) = setup();
        registry.dispatch(0, 0, &[7]).unwrap();
        registry.dispatch(0, 1, &[]).unwrap();
        let msg = backend.claim_next(0).unwrap();
        assert_eq!(msg.method_id, 0);
        assert_eq!(msg.params, vec![7]);
    }

    #[test]
    fn naming_rules() {
        let registry = BfmRegistry::new();
        let err = registry.register_type::<Misnamed>("drivers.Misnamed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NamingConflict);
        assert!(registry.type_info("drivers.Misnamed").is_none());

        registry.register_type::<Counter>("drivers.Counter").unwrap();
        let dup = registry.register_type::<Counter>("drivers.Counter").unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::DuplicateType);
        assert_eq!(
            registry.register_type::<Counter>("Counter").unwrap_err().kind(),
            ErrorKind::Resolution
        );
    }

    #[test]
    fn failed_instantiate_commits_nothing() {
        let registry = BfmRegistry::new();
        registry.register_type::<Counter>("drivers.Counter").unwrap();
        let backend = Rc::new(
            LabBfmBackend::new(SimPort::new())
                .with_instance("counter", "top.c0", "drivers.Counter")
                .with_instance("ghost", "top.g0", "drivers.Ghost"),
        );
        let err = registry
            .instantiate(backend, &Scheduler::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.message().unwrap().contains("drivers.Ghost"));
        assert!(registry.is_empty());
        assert!(!registry.is_initialized());
    }

    #[test]
    fn second_instantiate_is_noop() {
        let (registry, _) = setup();
        let more = Rc::new(
            LabBfmBackend::new(SimPort::new()).with_instance("counter", "top.c9", "drivers.Counter"),
        );
        registry.instantiate(more, &Scheduler::default()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookup_by_pattern() {
        let (registry, _) = setup();
        let hits: Vec<usize> = registry.find("top.c*").iter().map(|b| b.id()).collect();
        assert_eq!(hits, vec![0, 1]);
        assert_eq!(registry.find("*c1").len(), 1);
        assert!(registry.find("top.x*").is_empty());
        assert_eq!(registry.get(0).unwrap().class_path(), "drivers.Counter");
    }

    #[test]
    fn glob() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "a-x-b-y-c"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[test]
    fn json_export_lists_classes() {
        let (registry, _) = setup();
        let json: serde_json::Value = serde_json::from_str(&registry.export_json().unwrap()).unwrap();
        assert_eq!(json[0]["class_path"], "drivers.Counter");
        assert_eq!(json[0]["imports"][0]["qualified_name"], "Counter.report");
        assert_eq!(json[0]["exports"][1]["id"], 1);
    }
}
