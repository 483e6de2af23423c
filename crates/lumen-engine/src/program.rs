//! Program model
//!
//! Program code is a set of named functions grouped into libraries. The
//! snapshot library is installed when the isolate is created; further
//! libraries are loaded on top of it before the isolate is prepared for
//! running. Functions see the isolate through an [`IsolateContext`], which
//! exists only while the calling thread holds the isolate's scope.

use crate::error::ProgramError;
use crate::isolate::{InterpreterContext, Isolate, IsolateId};
use crate::native_registry;
use lumen_sdk::{NativeContext, NativeValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A program function
pub type EntryFn = Arc<dyn Fn(&IsolateContext<'_>) -> Result<(), ProgramError> + Send + Sync>;

/// One-shot work run later on the isolate's UI runner
pub type ScheduledFn = Box<dyn FnOnce(&IsolateContext<'_>) -> Result<(), ProgramError> + Send>;

/// Handler run in the parent when a spawned child isolate exits
pub type ExitHandler = ScheduledFn;

// ============================================================================
// Library
// ============================================================================

/// A named group of program functions
#[derive(Clone, Default)]
pub struct Library {
    name: String,
    functions: HashMap<String, EntryFn>,
}

impl Library {
    /// Create an empty library
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
        }
    }

    /// Add a function, builder style
    pub fn function(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&IsolateContext<'_>) -> Result<(), ProgramError> + Send + Sync + 'static,
    ) -> Self {
        self.add_function(name, f);
        self
    }

    /// Add a function, replacing any function of the same name
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&IsolateContext<'_>) -> Result<(), ProgramError> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Library name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<EntryFn> {
        self.functions.get(name).cloned()
    }

    /// Whether the library defines `name`
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the library defines nothing
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("functions", &names)
            .finish()
    }
}

/// The base program image every isolate is created from
#[derive(Debug, Clone, Default)]
pub struct IsolateSnapshot {
    library: Arc<Library>,
}

impl IsolateSnapshot {
    /// Snapshot whose root library is `library`
    pub fn new(library: Library) -> Self {
        Self {
            library: Arc::new(library),
        }
    }

    /// Snapshot with an empty root library
    pub fn empty() -> Self {
        Self::new(Library::new("snapshot"))
    }

    /// Root library
    pub fn library(&self) -> &Library {
        &self.library
    }
}

// ============================================================================
// IsolateContext
// ============================================================================

/// What running program code sees of its isolate.
///
/// Only handed out while the calling thread is inside the isolate's scope, so
/// every method here runs in scope.
pub struct IsolateContext<'a> {
    isolate: &'a Arc<Isolate>,
    context: &'a Arc<InterpreterContext>,
    args: &'a [String],
}

impl<'a> IsolateContext<'a> {
    pub(crate) fn new(
        isolate: &'a Arc<Isolate>,
        context: &'a Arc<InterpreterContext>,
        args: &'a [String],
    ) -> Self {
        Self {
            isolate,
            context,
            args,
        }
    }

    /// The isolate this code runs in
    pub fn isolate(&self) -> &Arc<Isolate> {
        self.isolate
    }

    /// Arguments passed to the running entrypoint
    pub fn args(&self) -> &[String] {
        self.args
    }

    /// Call a native callback registered in the process-wide registry
    pub fn call_native(&self, name: &str, args: &[NativeValue]) -> Result<NativeValue, ProgramError> {
        let handler = native_registry::resolve_native_callback(name)
            .ok_or_else(|| ProgramError::NativeNotFound(name.to_string()))?;
        handler(self, args)
            .into_result()
            .map_err(|message| ProgramError::NativeFailed {
                name: name.to_string(),
                message,
            })
    }

    /// Call another program function synchronously, in the current scope
    pub fn invoke(&self, name: &str, args: &[String]) -> Result<(), ProgramError> {
        let function = self
            .isolate
            .resolve_function(name)
            .ok_or_else(|| ProgramError::FunctionNotFound(name.to_string()))?;
        let ctx = IsolateContext::new(self.isolate, self.context, args);
        function(&ctx)
    }

    /// Run `f` later on the isolate's UI runner.
    ///
    /// The isolate counts as having pending work until `f` has run, so it does
    /// not shut down for lack of work in the meantime.
    pub fn schedule(
        &self,
        f: impl FnOnce(&IsolateContext<'_>) -> Result<(), ProgramError> + Send + 'static,
    ) {
        self.isolate.schedule(Box::new(f));
    }

    /// Spawn a child isolate running `entrypoint` with `message` as its only
    /// argument.
    ///
    /// The child shares this isolate's program and task runners. `on_exit`
    /// runs in this isolate, on its UI runner, once the child has shut down.
    pub fn spawn_isolate(
        &self,
        entrypoint: &str,
        message: impl Into<String>,
        on_exit: Option<ExitHandler>,
    ) -> Result<IsolateId, ProgramError> {
        self.isolate.spawn_child(entrypoint, message.into(), on_exit)
    }
}

impl NativeContext for IsolateContext<'_> {
    fn isolate_id(&self) -> u64 {
        self.isolate.id().as_u64()
    }

    fn debug_name(&self) -> &str {
        self.context.debug_name()
    }

    fn is_root_isolate(&self) -> bool {
        self.isolate.is_root()
    }

    fn get_global(&self, name: &str) -> Option<NativeValue> {
        self.context.get_global(name)
    }

    fn set_global(&self, name: &str, value: NativeValue) {
        self.context.set_global(name, value);
    }
}

impl fmt::Debug for IsolateContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolateContext")
            .field("isolate", &self.isolate.id())
            .field("args", &self.args)
            .finish()
    }
}
