//! Process-wide execution state made explicit.
//!
//! The trace collector, the context class loader, the active mutant toggle,
//! the mutant pools and the sandbox all live in one [`ExecutionContext`] that
//! is passed by `&mut` to every runner and validator call. Each transient
//! change is expressed as a guard that restores the previous state on drop,
//! so every exit path (including unwinding) leaves the context in a safe
//! default.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::mutant::{MutantId, MutantPool};
use crate::trace::{ExecutionTrace, TraceFragment};
use crate::validate::classpath::join_classpath;

static LOADER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Whether classes loaded through a loader are instrumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    /// Classes are instrumented for tracing and mutation.
    Instrumenting,
    /// Classes are loaded as an end user's runtime would load them.
    NonInstrumenting,
}

/// Handle to a class loader: an identity plus the classpath it resolves from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderHandle {
    id: u64,
    kind: LoaderKind,
    classpath: Vec<PathBuf>,
}

impl LoaderHandle {
    /// New instrumenting loader over `classpath`.
    pub fn instrumenting(classpath: impl IntoIterator<Item = PathBuf>) -> Self {
        Self::fresh(LoaderKind::Instrumenting, classpath)
    }

    /// New non-instrumenting loader over `classpath`.
    pub fn non_instrumenting(classpath: impl IntoIterator<Item = PathBuf>) -> Self {
        Self::fresh(LoaderKind::NonInstrumenting, classpath)
    }

    fn fresh(kind: LoaderKind, classpath: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            id: LOADER_SEQUENCE.fetch_add(1, Ordering::SeqCst),
            kind,
            classpath: classpath.into_iter().collect(),
        }
    }

    /// Unique loader id within this process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Loader kind.
    pub fn kind(&self) -> LoaderKind {
        self.kind
    }

    /// Classpath entries, in lookup order.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    /// Classpath joined with the platform separator.
    pub fn classpath_string(&self) -> String {
        join_classpath(self.classpath.iter().map(|p| p.display().to_string()))
    }
}

/// Opaque set of threads the sandbox treats as privileged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegedThreads(pub Vec<String>);

/// Security manager that restricts what the code under test may do.
pub trait Sandbox {
    /// Whether a restricting security manager is currently installed.
    fn is_security_manager_initialized(&self) -> bool;

    /// Remove the installed manager, returning the privileged threads it knew about.
    fn reset_default_security_manager(&mut self) -> PrivilegedThreads;

    /// Install a manager for the code under test.
    fn initialize_security_manager(&mut self, privileged: PrivilegedThreads);
}

/// In-process sandbox state holder.
#[derive(Debug, Clone, Default)]
pub struct ManagedSandbox {
    installed: Option<PrivilegedThreads>,
}

impl ManagedSandbox {
    /// Sandbox that starts with a manager installed.
    pub fn active(privileged: PrivilegedThreads) -> Self {
        Self {
            installed: Some(privileged),
        }
    }
}

impl Sandbox for ManagedSandbox {
    fn is_security_manager_initialized(&self) -> bool {
        self.installed.is_some()
    }

    fn reset_default_security_manager(&mut self) -> PrivilegedThreads {
        self.installed.take().unwrap_or_default()
    }

    fn initialize_security_manager(&mut self, privileged: PrivilegedThreads) {
        self.installed = Some(privileged);
    }
}

/// All state shared between test executions.
pub struct ExecutionContext {
    sut_loader: LoaderHandle,
    context_loader: Option<LoaderHandle>,
    trace: ExecutionTrace,
    trace_enabled: bool,
    active_mutant: Option<MutantId>,
    mutant_pools: BTreeMap<u64, MutantPool>,
    empty_pool: MutantPool,
    sandbox: Box<dyn Sandbox>,
    executing_depth: usize,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("sut_loader", &self.sut_loader)
            .field("context_loader", &self.context_loader)
            .field("trace_enabled", &self.trace_enabled)
            .field("active_mutant", &self.active_mutant)
            .field("executing_depth", &self.executing_depth)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Context whose code under test is loaded through `sut_loader`.
    pub fn new(sut_loader: LoaderHandle, sandbox: Box<dyn Sandbox>) -> Self {
        Self {
            sut_loader,
            context_loader: None,
            trace: ExecutionTrace::default(),
            trace_enabled: false,
            active_mutant: None,
            mutant_pools: BTreeMap::new(),
            empty_pool: MutantPool::default(),
            sandbox,
            executing_depth: 0,
        }
    }

    /// Loader used for the code under test.
    pub fn sut_loader(&self) -> &LoaderHandle {
        &self.sut_loader
    }

    /// Mark the start of foreign code execution. Calls nest.
    pub fn begin_execution(&mut self) {
        self.executing_depth += 1;
    }

    /// Mark the end of foreign code execution.
    pub fn end_execution(&mut self) {
        if self.executing_depth == 0 {
            warn!("end_execution called without matching begin_execution");
            return;
        }
        self.executing_depth -= 1;
    }

    /// Whether foreign code is currently executing.
    pub fn is_executing(&self) -> bool {
        self.executing_depth > 0
    }

    /// Bracket foreign code execution until the returned scope is dropped.
    pub fn execution_scope(&mut self) -> ExecutionScope<'_> {
        self.begin_execution();
        ExecutionScope { ctx: self }
    }

    /// Start collecting trace fragments.
    pub fn enable_trace(&mut self) {
        self.trace_enabled = true;
    }

    /// Stop collecting trace fragments.
    pub fn disable_trace(&mut self) {
        self.trace_enabled = false;
    }

    /// Whether trace fragments are being collected.
    pub fn is_trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    /// Drop the current trace.
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Current trace.
    pub fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    /// Copy the current trace and clear the collector.
    pub fn take_trace(&mut self) -> ExecutionTrace {
        std::mem::take(&mut self.trace)
    }

    /// Feed a fragment from the instrumentation layer. Ignored while disabled.
    pub fn record(&mut self, fragment: TraceFragment) {
        if self.trace_enabled {
            self.trace.merge(fragment);
        } else {
            debug!("dropping trace fragment while collector is disabled");
        }
    }

    /// Current context class loader, if any.
    pub fn context_loader(&self) -> Option<&LoaderHandle> {
        self.context_loader.as_ref()
    }

    /// Replace the context loader, returning the previous one.
    pub fn set_context_loader(&mut self, loader: Option<LoaderHandle>) -> Option<LoaderHandle> {
        std::mem::replace(&mut self.context_loader, loader)
    }

    /// Install `loader` as context loader until the guard is dropped.
    pub fn with_context_loader(&mut self, loader: LoaderHandle) -> ContextLoaderGuard<'_> {
        let previous = self.set_context_loader(Some(loader));
        ContextLoaderGuard {
            ctx: self,
            previous: Some(previous),
        }
    }

    /// Currently active mutant.
    pub fn active_mutant(&self) -> Option<MutantId> {
        self.active_mutant
    }

    /// Activate exactly one mutant until the returned guard is dropped.
    pub fn activate_mutant(&mut self, id: MutantId) -> MutantActivation<'_> {
        if let Some(previous) = self.active_mutant.replace(id) {
            warn!(previous = %previous, next = %id, "replacing an active mutant");
        }
        MutantActivation { ctx: self }
    }

    /// Deactivate whichever mutant is active.
    pub fn deactivate_mutant(&mut self) {
        self.active_mutant = None;
    }

    /// Register the mutants loaded through `loader`.
    pub fn set_mutant_pool(&mut self, loader: &LoaderHandle, pool: MutantPool) {
        self.mutant_pools.insert(loader.id(), pool);
    }

    /// Mutant pool of the code-under-test loader.
    pub fn mutant_pool(&self) -> &MutantPool {
        self.mutant_pools
            .get(&self.sut_loader.id())
            .unwrap_or(&self.empty_pool)
    }

    /// Sandbox controlling the security manager.
    pub fn sandbox(&self) -> &dyn Sandbox {
        self.sandbox.as_ref()
    }

    /// Mutable sandbox access.
    pub fn sandbox_mut(&mut self) -> &mut dyn Sandbox {
        self.sandbox.as_mut()
    }
}

/// Ends the execution bracket on drop.
pub struct ExecutionScope<'a> {
    ctx: &'a mut ExecutionContext,
}

impl Deref for ExecutionScope<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ExecutionScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        self.ctx.end_execution();
    }
}

/// Restores the previous context loader on drop.
pub struct ContextLoaderGuard<'a> {
    ctx: &'a mut ExecutionContext,
    previous: Option<Option<LoaderHandle>>,
}

impl Deref for ContextLoaderGuard<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ContextLoaderGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ContextLoaderGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.ctx.set_context_loader(previous);
        }
    }
}

/// Deactivates the mutant on drop.
pub struct MutantActivation<'a> {
    ctx: &'a mut ExecutionContext,
}

impl Deref for MutantActivation<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for MutantActivation<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for MutantActivation<'_> {
    fn drop(&mut self) {
        self.ctx.deactivate_mutant();
    }
}

struct SandboxSuspension<'a> {
    ctx: &'a mut ExecutionContext,
    was_on: bool,
    privileged: Option<PrivilegedThreads>,
}

impl Drop for SandboxSuspension<'_> {
    fn drop(&mut self) {
        let now_on = self.ctx.sandbox().is_security_manager_initialized();
        if self.was_on {
            if !now_on {
                let privileged = self.privileged.take().unwrap_or_default();
                self.ctx.sandbox_mut().initialize_security_manager(privileged);
            }
        } else if now_on {
            warn!("tests set up a security manager, but they do not remove it after execution");
            self.ctx.sandbox_mut().reset_default_security_manager();
        }
    }
}

/// Run `f` with any installed security manager torn down.
///
/// On every exit path the manager is reinstalled only if it was active before
/// and the guarded code did not reinstall it itself. A manager left behind by
/// the guarded code when none was active before is force-reset with a warning.
pub fn with_sandbox_suspended<R>(
    ctx: &mut ExecutionContext,
    f: impl FnOnce(&mut ExecutionContext) -> R,
) -> R {
    let was_on = ctx.sandbox().is_security_manager_initialized();
    let privileged = was_on.then(|| ctx.sandbox_mut().reset_default_security_manager());
    let mut guard = SandboxSuspension {
        ctx,
        was_on,
        privileged,
    };
    f(&mut *guard.ctx)
}
