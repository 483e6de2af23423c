//! Isolates: phase machine, interpreter scope and lifecycle

mod context;
#[allow(clippy::module_inception)]
mod isolate;
mod phase;

pub use context::{InterpreterContext, IsolateId, IsolateScope};
pub use isolate::{Isolate, ShutdownCallback};
pub use phase::{Phase, PhaseError};

pub(crate) use isolate::IsolateConfig;
