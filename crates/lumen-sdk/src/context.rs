//! NativeContext trait: what a native callback can see of its caller
//!
//! The engine implements this for the isolate that is currently executing.
//! Native callbacks program against the trait and never touch engine
//! internals.

use crate::value::NativeValue;

/// Abstract view of the calling isolate, handed to every native callback.
///
/// A callback always runs on the thread that holds the calling isolate's
/// scope, so anything reachable through this trait is safe to use for the
/// duration of the call.
pub trait NativeContext {
    /// Process-unique id of the calling isolate
    fn isolate_id(&self) -> u64;

    /// Diagnostic name of the calling isolate (`"{uri}:{entrypoint}"`)
    fn debug_name(&self) -> &str;

    /// Whether the calling isolate is the root isolate of its VM
    fn is_root_isolate(&self) -> bool;

    /// Read a global slot of the calling isolate
    fn get_global(&self, name: &str) -> Option<NativeValue>;

    /// Write a global slot of the calling isolate
    fn set_global(&self, name: &str, value: NativeValue);
}
