//! Process-wide native callback registry
//!
//! Program code calls native symbols by name; the name is resolved here at
//! call time and the handler runs directly on the calling thread. Register
//! callbacks before the isolate that uses them starts running.

use lumen_sdk::{NativeCallResult, NativeContext, NativeFunctionRegistry, NativeHandlerFn, NativeValue};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

static NATIVE_CALLBACKS: Lazy<RwLock<NativeFunctionRegistry>> =
    Lazy::new(|| RwLock::new(NativeFunctionRegistry::new()));

/// Register `handler` under `name` for every isolate in the process.
///
/// Registering a name again replaces the earlier handler.
pub fn add_native_callback(
    name: &str,
    handler: impl Fn(&dyn NativeContext, &[NativeValue]) -> NativeCallResult + Send + Sync + 'static,
) {
    let replaced = NATIVE_CALLBACKS.write().register(name, handler).is_some();
    if replaced {
        tracing::debug!(name, "replaced native callback");
    }
}

/// Look up the handler registered under `name`
pub fn resolve_native_callback(name: &str) -> Option<NativeHandlerFn> {
    NATIVE_CALLBACKS.read().get(name)
}

/// Whether a handler is registered under `name`
pub fn has_native_callback(name: &str) -> bool {
    NATIVE_CALLBACKS.read().contains(name)
}
