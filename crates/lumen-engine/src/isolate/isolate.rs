//! Isolate lifecycle
//!
//! An [`Isolate`] owns one [`InterpreterContext`] and walks it through the
//! phase machine in [`super::Phase`]. The owning [`crate::Vm`] holds the only
//! long-lived strong reference; callers get a `Weak<Isolate>` and upgrade it
//! for the duration of a call.
//!
//! Shutdown runs exactly once, either from [`Isolate::shutdown`], from the
//! automatic shutdown posted when the keep-alive count reaches zero, or from
//! `Drop` when the last strong reference goes away without an explicit
//! shutdown.

use super::context::{InterpreterContext, IsolateId, IsolateScope};
use super::phase::{Phase, PhaseError};
use crate::error::{IsolateError, ProgramError};
use crate::program::{EntryFn, ExitHandler, IsolateContext, IsolateSnapshot, Library, ScheduledFn};
use crate::settings::{Callback, IsolateFlags};
use crate::task_runner::{Task, TaskRunners};
use crate::vm::{IsolateCollaborators, VmShared};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Callback registered through [`Isolate::add_isolate_shutdown_callback`]
pub type ShutdownCallback = Box<dyn FnOnce() + Send>;

/// Everything needed to create an isolate
pub(crate) struct IsolateConfig {
    pub snapshot: IsolateSnapshot,
    pub task_runners: TaskRunners,
    pub collaborators: IsolateCollaborators,
    pub advisory_script_uri: String,
    pub advisory_script_entrypoint: String,
    pub flags: IsolateFlags,
    pub isolate_create_callback: Option<Callback>,
    pub isolate_shutdown_callback: Option<Callback>,
    pub root_isolate_shutdown_callback: Option<Callback>,
    pub parent: Option<ParentLink>,
}

/// Link from a child isolate back to the isolate that spawned it
pub(crate) struct ParentLink {
    id: IsolateId,
    isolate: Weak<Isolate>,
    on_exit: Mutex<Option<ExitHandler>>,
}

impl ParentLink {
    pub(crate) fn new(parent: &Arc<Isolate>, on_exit: Option<ExitHandler>) -> Self {
        Self {
            id: parent.id,
            isolate: Arc::downgrade(parent),
            on_exit: Mutex::new(on_exit),
        }
    }
}

/// An independent unit of program execution
pub struct Isolate {
    id: IsolateId,
    debug_name: String,
    advisory_script_uri: String,
    advisory_script_entrypoint: String,
    parent: Option<ParentLink>,
    task_runners: TaskRunners,
    snapshot: IsolateSnapshot,
    collaborators: IsolateCollaborators,
    flags: IsolateFlags,

    phase: Mutex<Phase>,
    libraries: RwLock<Vec<Library>>,
    context: Mutex<Option<Arc<InterpreterContext>>>,

    /// `None` once shutdown has drained it
    shutdown_callbacks: Mutex<Option<Vec<ShutdownCallback>>>,
    isolate_shutdown_callback: Option<Callback>,
    root_isolate_shutdown_callback: Option<Callback>,
    shutdown_started: AtomicBool,

    keep_alive: AtomicUsize,
    vm: Weak<VmShared>,
    weak_self: Weak<Isolate>,
}

impl Isolate {
    /// Allocate the interpreter state, install the snapshot and register with
    /// the VM. The returned isolate is in `LibrariesSetup`.
    pub(crate) fn create(
        vm: &Arc<VmShared>,
        config: IsolateConfig,
    ) -> Result<Arc<Isolate>, IsolateError> {
        let IsolateConfig {
            snapshot,
            task_runners,
            collaborators,
            advisory_script_uri,
            advisory_script_entrypoint,
            flags,
            isolate_create_callback,
            isolate_shutdown_callback,
            root_isolate_shutdown_callback,
            parent,
        } = config;

        let id = IsolateId::new();
        let debug_name = format!("{}:{}", advisory_script_uri, advisory_script_entrypoint);
        let isolate = Arc::new_cyclic(|weak_self| Isolate {
            id,
            debug_name,
            advisory_script_uri,
            advisory_script_entrypoint,
            parent,
            task_runners,
            snapshot,
            collaborators,
            flags,
            phase: Mutex::new(Phase::Unknown),
            libraries: RwLock::new(Vec::new()),
            context: Mutex::new(None),
            shutdown_callbacks: Mutex::new(Some(Vec::new())),
            isolate_shutdown_callback,
            root_isolate_shutdown_callback,
            shutdown_started: AtomicBool::new(false),
            keep_alive: AtomicUsize::new(0),
            vm: Arc::downgrade(vm),
            weak_self: weak_self.clone(),
        });

        isolate.advance(Phase::Initializing)?;
        let context = InterpreterContext::new(id, isolate.debug_name.clone());
        *isolate.context.lock() = Some(Arc::clone(&context));
        isolate.advance(Phase::LibrariesSetup)?;

        vm.register(Arc::clone(&isolate));

        if let Some(callback) = isolate_create_callback {
            let _scope = IsolateScope::enter(&context);
            callback();
        }

        tracing::debug!(
            isolate = %isolate.debug_name,
            id = %id,
            root = isolate.is_root(),
            "isolate created"
        );
        Ok(isolate)
    }

    // ===== Accessors =====

    /// Process-unique identifier
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// `"{advisory uri}:{advisory entrypoint}"`, for diagnostics
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Advisory script URI
    pub fn advisory_script_uri(&self) -> &str {
        &self.advisory_script_uri
    }

    /// Advisory entrypoint name
    pub fn advisory_script_entrypoint(&self) -> &str {
        &self.advisory_script_entrypoint
    }

    /// Whether this isolate was created directly by the VM
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// ID of the isolate that spawned this one
    pub fn parent_id(&self) -> Option<IsolateId> {
        self.parent.as_ref().map(|link| link.id)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Task runners bound at creation
    pub fn task_runners(&self) -> &TaskRunners {
        &self.task_runners
    }

    /// Snapshot the isolate was created from
    pub fn snapshot(&self) -> &IsolateSnapshot {
        &self.snapshot
    }

    /// Host collaborator handles
    pub fn collaborators(&self) -> &IsolateCollaborators {
        &self.collaborators
    }

    /// Interpreter flags
    pub fn flags(&self) -> &IsolateFlags {
        &self.flags
    }

    /// Outstanding reasons to stay alive while running
    pub fn keep_alive_count(&self) -> usize {
        self.keep_alive.load(Ordering::Acquire)
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::Acquire)
    }

    // ===== Phase transitions =====

    fn advance(&self, next: Phase) -> Result<(), PhaseError> {
        let mut phase = self.phase.lock();
        *phase = phase.transition(next)?;
        Ok(())
    }

    /// Load program libraries on top of the snapshot.
    ///
    /// Moves `LibrariesSetup -> LocalLibrariesPresent`. Functions in later
    /// libraries shadow earlier ones and the snapshot.
    pub fn load_libraries(&self, libraries: Vec<Library>) -> Result<(), IsolateError> {
        let mut phase = self.phase.lock();
        let next = phase.transition(Phase::LocalLibrariesPresent)?;
        self.libraries.write().extend(libraries);
        *phase = next;
        Ok(())
    }

    /// Move to `Ready`
    pub fn prepare_for_running(&self) -> Result<(), IsolateError> {
        self.advance(Phase::Ready)?;
        tracing::debug!(isolate = %self.debug_name, "isolate ready");
        Ok(())
    }

    /// Start `entrypoint` with `args`.
    ///
    /// Only legal in `Ready`. An unknown entrypoint leaves the isolate in
    /// `Ready`. On success the isolate is `Running` and the entrypoint is
    /// posted to the UI runner, where it executes inside the isolate's scope.
    pub fn run(&self, entrypoint: &str, args: &[String]) -> Result<(), IsolateError> {
        if self.is_shutting_down() {
            return Err(IsolateError::AlreadyShutdown(self.debug_name.clone()));
        }

        let entry = {
            let mut phase = self.phase.lock();
            let next = phase.transition(Phase::Running)?;
            let entry = self
                .resolve_function(entrypoint)
                .ok_or_else(|| IsolateError::EntrypointNotFound(entrypoint.to_string()))?;
            *phase = next;
            entry
        };

        tracing::debug!(isolate = %self.debug_name, entrypoint, "running isolate");

        self.retain();
        let weak = self.weak_self.clone();
        let args = args.to_vec();
        let entrypoint = entrypoint.to_string();
        self.task_runners.ui().post_task(Task::new(move || {
            let Some(isolate) = weak.upgrade() else {
                return;
            };
            if let Err(err) = isolate.run_scoped(&args, |ctx| entry(ctx)) {
                tracing::error!(
                    isolate = %isolate.debug_name,
                    entrypoint = %entrypoint,
                    error = %err,
                    "entrypoint failed"
                );
            }
            isolate.release();
        }));
        Ok(())
    }

    // ===== Scoped execution =====

    /// Run `f` on the calling thread with this isolate's scope entered.
    ///
    /// Waits while another thread is inside the isolate. The previous thread
    /// context is restored when `f` returns or unwinds.
    pub fn run_in_isolate_scope<R>(&self, f: impl FnOnce() -> R) -> Result<R, IsolateError> {
        let context = self.live_context()?;
        let _scope = IsolateScope::enter(&context);
        if !context.is_alive() {
            return Err(IsolateError::NotAlive(self.debug_name.clone()));
        }
        Ok(f())
    }

    /// Call the program function `name` synchronously.
    ///
    /// The calling thread must already be inside this isolate's scope, and the
    /// isolate must be `Ready` or `Running`.
    pub fn invoke(self: &Arc<Self>, name: &str, args: &[String]) -> Result<(), ProgramError> {
        let context = self.live_context()?;
        if !context.is_current() {
            return Err(IsolateError::NotInScope(self.debug_name.clone()).into());
        }
        let phase = self.phase();
        if !phase.can_execute() {
            return Err(PhaseError {
                from: phase,
                to: Phase::Running,
            }
            .into());
        }
        let function = self
            .resolve_function(name)
            .ok_or_else(|| ProgramError::FunctionNotFound(name.to_string()))?;
        let ctx = IsolateContext::new(self, &context, args);
        function(&ctx)
    }

    pub(crate) fn resolve_function(&self, name: &str) -> Option<EntryFn> {
        let from_libraries = self
            .libraries
            .read()
            .iter()
            .rev()
            .find_map(|library| library.get(name));
        from_libraries.or_else(|| self.snapshot.library().get(name))
    }

    fn live_context(&self) -> Result<Arc<InterpreterContext>, IsolateError> {
        self.context
            .lock()
            .clone()
            .filter(|context| context.is_alive())
            .ok_or_else(|| IsolateError::NotAlive(self.debug_name.clone()))
    }

    /// Enter the scope and hand `f` a program-facing context
    pub(crate) fn run_scoped<R>(
        self: &Arc<Self>,
        args: &[String],
        f: impl FnOnce(&IsolateContext<'_>) -> Result<R, ProgramError>,
    ) -> Result<R, ProgramError> {
        let context = self.live_context()?;
        let _scope = IsolateScope::enter(&context);
        if !context.is_alive() {
            return Err(IsolateError::NotAlive(self.debug_name.clone()).into());
        }
        let ctx = IsolateContext::new(self, &context, args);
        f(&ctx)
    }

    pub(crate) fn schedule(self: &Arc<Self>, f: ScheduledFn) {
        self.retain();
        let weak = self.weak_self.clone();
        self.task_runners.ui().post_task(Task::new(move || {
            let Some(isolate) = weak.upgrade() else {
                return;
            };
            if let Err(err) = isolate.run_scoped(&[], f) {
                tracing::error!(
                    isolate = %isolate.debug_name,
                    error = %err,
                    "scheduled task failed"
                );
            }
            isolate.release();
        }));
    }

    // ===== Child isolates =====

    pub(crate) fn spawn_child(
        self: &Arc<Self>,
        entrypoint: &str,
        message: String,
        on_exit: Option<ExitHandler>,
    ) -> Result<IsolateId, ProgramError> {
        let vm = self.vm.upgrade().ok_or(IsolateError::VmUnavailable)?;
        if self.is_shutting_down() {
            return Err(IsolateError::AlreadyShutdown(self.debug_name.clone()).into());
        }
        let settings = vm.settings();

        // Released by the child's shutdown, on whichever path it happens
        self.retain();
        let child = Isolate::create(
            &vm,
            IsolateConfig {
                snapshot: self.snapshot.clone(),
                task_runners: self.task_runners.clone(),
                collaborators: self.collaborators.clone(),
                advisory_script_uri: self.advisory_script_uri.clone(),
                advisory_script_entrypoint: entrypoint.to_string(),
                flags: self.flags.clone(),
                isolate_create_callback: settings.isolate_create_callback.clone(),
                isolate_shutdown_callback: settings.isolate_shutdown_callback.clone(),
                root_isolate_shutdown_callback: None,
                parent: Some(ParentLink::new(self, on_exit)),
            },
        )?;

        if let Err(err) = self.start_child(&child, entrypoint, message) {
            tracing::warn!(
                parent = %self.debug_name,
                child = %child.debug_name,
                error = %err,
                "failed to start child isolate"
            );
            let _ = child.shutdown();
            return Err(err.into());
        }

        tracing::debug!(parent = %self.debug_name, child = %child.debug_name, "spawned child isolate");
        Ok(child.id)
    }

    fn start_child(
        &self,
        child: &Isolate,
        entrypoint: &str,
        message: String,
    ) -> Result<(), IsolateError> {
        let libraries = self.libraries.read().clone();
        if !libraries.is_empty() {
            child.load_libraries(libraries)?;
        }
        child.prepare_for_running()?;
        child.run(entrypoint, &[message])
    }

    // ===== Keep-alive =====

    fn retain(&self) {
        self.keep_alive.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        let previous = self.keep_alive.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "keep-alive released more often than retained");
        if previous == 1 {
            self.post_idle_shutdown();
        }
    }

    fn post_idle_shutdown(&self) {
        if self.phase() != Phase::Running {
            return;
        }
        let weak = self.weak_self.clone();
        self.task_runners.ui().post_task(Task::new(move || {
            let Some(isolate) = weak.upgrade() else {
                return;
            };
            // Work may have been scheduled since the shutdown was posted
            if isolate.keep_alive_count() == 0 && isolate.phase() == Phase::Running {
                tracing::debug!(isolate = %isolate.debug_name, "no pending work, shutting down");
                let _ = isolate.shutdown();
            }
        }));
    }

    // ===== Shutdown =====

    /// Register a callback to run, inside the isolate's scope, when the
    /// isolate shuts down. Callbacks run in registration order.
    pub fn add_isolate_shutdown_callback(
        &self,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<(), IsolateError> {
        match self.shutdown_callbacks.lock().as_mut() {
            Some(callbacks) => {
                callbacks.push(Box::new(callback));
                Ok(())
            }
            None => Err(IsolateError::AlreadyShutdown(self.debug_name.clone())),
        }
    }

    /// Shut the isolate down.
    ///
    /// Runs the registered shutdown callbacks, the per-isolate shutdown
    /// callback and, for a root isolate, the root shutdown callback, all inside
    /// the isolate's scope. Then tears down the interpreter state and releases
    /// the VM's reference. Only the first call does anything.
    pub fn shutdown(&self) -> Result<(), IsolateError> {
        if self.shutdown_started.swap(true, Ordering::AcqRel) {
            return Err(IsolateError::AlreadyShutdown(self.debug_name.clone()));
        }
        self.run_shutdown_sequence();

        if let Some(vm) = self.vm.upgrade() {
            let removed = vm.deregister(self.id);
            drop(removed);
        }
        Ok(())
    }

    fn run_shutdown_sequence(&self) {
        tracing::debug!(isolate = %self.debug_name, "shutting down isolate");

        let callbacks = self.shutdown_callbacks.lock().take().unwrap_or_default();
        let context = self.context.lock().clone();

        if let Some(context) = context {
            let _scope = IsolateScope::enter(&context);
            for callback in callbacks {
                self.run_shutdown_callback("registered", callback);
            }
            if let Some(callback) = &self.isolate_shutdown_callback {
                self.run_shutdown_callback("isolate", || callback());
            }
            if self.is_root() {
                if let Some(callback) = &self.root_isolate_shutdown_callback {
                    self.run_shutdown_callback("root isolate", || callback());
                }
            }
            // Still in scope: a thread waiting to enter sees a dead context
            context.tear_down();
        }
        *self.context.lock() = None;

        {
            let mut phase = self.phase.lock();
            match phase.transition(Phase::Shutdown) {
                Ok(next) => *phase = next,
                Err(err) => tracing::warn!(isolate = %self.debug_name, error = %err, "unexpected phase at shutdown"),
            }
        }

        self.notify_parent();
        tracing::debug!(isolate = %self.debug_name, "isolate shut down");
    }

    /// A panicking callback must not stop the rest of the sequence
    fn run_shutdown_callback(&self, kind: &str, callback: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            tracing::error!(
                isolate = %self.debug_name,
                kind,
                "shutdown callback panicked"
            );
        }
    }

    /// Let the parent run its exit handler and drop its keep-alive
    fn notify_parent(&self) {
        let Some(link) = &self.parent else {
            return;
        };
        let on_exit = link.on_exit.lock().take();
        let Some(parent) = link.isolate.upgrade() else {
            return;
        };

        let weak_parent = Arc::downgrade(&parent);
        let child_name = self.debug_name.clone();
        parent.task_runners.ui().post_task(Task::new(move || {
            let Some(parent) = weak_parent.upgrade() else {
                return;
            };
            if let Some(on_exit) = on_exit {
                if let Err(err) = parent.run_scoped(&[], on_exit) {
                    tracing::error!(
                        isolate = %parent.debug_name,
                        child = %child_name,
                        error = %err,
                        "child exit handler failed"
                    );
                }
            }
            parent.release();
        }));
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        if !self.shutdown_started.swap(true, Ordering::AcqRel) {
            tracing::debug!(isolate = %self.debug_name, "isolate destroyed without shutdown");
            self.run_shutdown_sequence();
        }
    }
}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.id)
            .field("debug_name", &self.debug_name)
            .field("phase", &self.phase())
            .field("root", &self.is_root())
            .field("keep_alive", &self.keep_alive_count())
            .finish()
    }
}
