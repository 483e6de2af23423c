//! Runtime settings

use std::fmt;
use std::sync::Arc;

/// A zero-argument notification callback
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Default advisory script URI
pub const DEFAULT_ADVISORY_SCRIPT_URI: &str = "main.lm";

/// Default advisory entrypoint name
pub const DEFAULT_ADVISORY_SCRIPT_ENTRYPOINT: &str = "main";

/// Flags passed through to the interpreter unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolateFlags {
    /// Evaluate `assert` statements
    pub enable_asserts: bool,
    /// Request null-safe execution
    pub null_safety: bool,
}

/// Settings shared by every isolate of a VM.
///
/// The callbacks are notifications: their return value is never consulted.
#[derive(Clone)]
pub struct Settings {
    /// Advisory script URI given to root isolates by [`crate::Vm::root_isolate_params`]
    pub advisory_script_uri: String,

    /// Advisory entrypoint given to root isolates by [`crate::Vm::root_isolate_params`]
    pub advisory_script_entrypoint: String,

    /// Fired once per secondary isolate after base setup, inside its scope
    pub isolate_create_callback: Option<Callback>,

    /// Fired once per secondary isolate during shutdown, inside its scope
    pub isolate_shutdown_callback: Option<Callback>,

    /// Fired once when a root isolate (never a child) shuts down
    pub root_isolate_shutdown_callback: Option<Callback>,

    /// Flags for isolates created by the VM
    pub flags: IsolateFlags,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            advisory_script_uri: DEFAULT_ADVISORY_SCRIPT_URI.to_string(),
            advisory_script_entrypoint: DEFAULT_ADVISORY_SCRIPT_ENTRYPOINT.to_string(),
            isolate_create_callback: None,
            isolate_shutdown_callback: None,
            root_isolate_shutdown_callback: None,
            flags: IsolateFlags::default(),
        }
    }
}

impl Settings {
    /// Settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advisory script URI
    pub fn with_advisory_script_uri(mut self, uri: impl Into<String>) -> Self {
        self.advisory_script_uri = uri.into();
        self
    }

    /// Set the advisory entrypoint
    pub fn with_advisory_script_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.advisory_script_entrypoint = entrypoint.into();
        self
    }

    /// Set the isolate create callback
    pub fn with_isolate_create_callback(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.isolate_create_callback = Some(Arc::new(f));
        self
    }

    /// Set the isolate shutdown callback
    pub fn with_isolate_shutdown_callback(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.isolate_shutdown_callback = Some(Arc::new(f));
        self
    }

    /// Set the root isolate shutdown callback
    pub fn with_root_isolate_shutdown_callback(
        mut self,
        f: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.root_isolate_shutdown_callback = Some(Arc::new(f));
        self
    }

    /// Set isolate flags
    pub fn with_flags(mut self, flags: IsolateFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("advisory_script_uri", &self.advisory_script_uri)
            .field("advisory_script_entrypoint", &self.advisory_script_entrypoint)
            .field("isolate_create_callback", &self.isolate_create_callback.is_some())
            .field("isolate_shutdown_callback", &self.isolate_shutdown_callback.is_some())
            .field(
                "root_isolate_shutdown_callback",
                &self.root_isolate_shutdown_callback.is_some(),
            )
            .field("flags", &self.flags)
            .finish()
    }
}
