//! Lumen Engine
//!
//! Isolate lifecycle management for an embedded interpreter:
//! - **Isolates**: phase machine, scoped interpreter context and shutdown
//!   callbacks (`isolate` module)
//! - **VM**: registry owning every live isolate (`vm` module)
//! - **Task runners**: message-loop threads and the host-bridged
//!   [`EmbedderTaskRunner`] (`task_runner` module)
//! - **Native callbacks**: process-wide registry consulted by program code
//!   (`native_registry` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_engine::{Library, IsolateSnapshot, MessageLoopThread, RootIsolateParams,
//!     Settings, TaskRunners, Vm};
//!
//! let ui = MessageLoopThread::spawn("ui");
//! let vm = Vm::new(Settings::default());
//! let runners = TaskRunners::single("app", ui.task_runner());
//!
//! let snapshot = IsolateSnapshot::new(Library::new("app").function("main", |ctx| {
//!     ctx.call_native("NotifyNative", &[])?;
//!     Ok(())
//! }));
//!
//! let isolate = vm.create_root_isolate(RootIsolateParams::new(snapshot, runners))?;
//! let isolate = isolate.upgrade().unwrap();
//! isolate.prepare_for_running()?;
//! isolate.run("main", &[])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Engine error types
pub mod error;

/// Isolates: phase machine, interpreter scope and lifecycle
pub mod isolate;

/// Process-wide native callback registry
pub mod native_registry;

/// Program model: libraries and the context program code runs with
pub mod program;

/// Runtime settings
pub mod settings;

/// Waitable events and latches
pub mod sync;

/// Task runners
pub mod task_runner;

/// VM and root isolate creation
pub mod vm;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{IsolateError, ProgramError};
pub use isolate::{InterpreterContext, Isolate, IsolateId, IsolateScope, Phase, PhaseError};
pub use native_registry::{add_native_callback, resolve_native_callback};
pub use program::{EntryFn, ExitHandler, IsolateContext, IsolateSnapshot, Library};
pub use settings::{IsolateFlags, Settings};
pub use task_runner::{
    run_now_or_post_task, DispatchTable, EmbedderTaskRunner, MessageLoopTaskRunner,
    MessageLoopThread, Task, TaskRunner, TaskRunners,
};
pub use vm::{IsolateCollaborators, RootIsolateParams, Vm};

pub use lumen_sdk::{NativeCallResult, NativeContext, NativeError, NativeValue};
