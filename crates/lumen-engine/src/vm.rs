//! VM: the owner of every live isolate
//!
//! The [`Vm`] registry holds the only long-lived strong reference to each
//! isolate. Shutting an isolate down removes it from the registry, after
//! which the creator's `Weak<Isolate>` stops upgrading. Dropping the `Vm`
//! drops every isolate still registered, running their shutdown sequences.

use crate::error::IsolateError;
use crate::isolate::{Isolate, IsolateConfig, IsolateId};
use crate::program::IsolateSnapshot;
use crate::settings::{
    Callback, IsolateFlags, Settings, DEFAULT_ADVISORY_SCRIPT_ENTRYPOINT, DEFAULT_ADVISORY_SCRIPT_URI,
};
use crate::task_runner::TaskRunners;
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// An opaque host object handed through to the isolate untouched
pub type OpaqueHandle = Arc<dyn Any + Send + Sync>;

/// Host collaborators an isolate carries but never interprets
#[derive(Clone, Default)]
pub struct IsolateCollaborators {
    /// Rendering surface
    pub rendering_surface: Option<OpaqueHandle>,
    /// Snapshot delegate
    pub snapshot_delegate: Option<OpaqueHandle>,
    /// I/O manager
    pub io_manager: Option<OpaqueHandle>,
    /// Queue for releasing GPU objects on the I/O thread
    pub unref_queue: Option<OpaqueHandle>,
    /// Image decoder
    pub image_decoder: Option<OpaqueHandle>,
}

impl fmt::Debug for IsolateCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolateCollaborators")
            .field("rendering_surface", &self.rendering_surface.is_some())
            .field("snapshot_delegate", &self.snapshot_delegate.is_some())
            .field("io_manager", &self.io_manager.is_some())
            .field("unref_queue", &self.unref_queue.is_some())
            .field("image_decoder", &self.image_decoder.is_some())
            .finish()
    }
}

/// Parameters for [`Vm::create_root_isolate`]
pub struct RootIsolateParams {
    /// Base program image
    pub snapshot: IsolateSnapshot,
    /// Runners the isolate is bound to
    pub task_runners: TaskRunners,
    /// Opaque host collaborators
    pub collaborators: IsolateCollaborators,
    /// Advisory script URI (diagnostics only)
    pub advisory_script_uri: String,
    /// Advisory entrypoint (diagnostics only)
    pub advisory_script_entrypoint: String,
    /// Interpreter flags; the VM's flags when `None`
    pub flags: Option<IsolateFlags>,
    /// Invoked once after creation, inside the isolate's scope
    pub isolate_create_callback: Option<Callback>,
    /// Invoked once during shutdown, inside the isolate's scope
    pub isolate_shutdown_callback: Option<Callback>,
}

impl RootIsolateParams {
    /// Parameters with default advisory names and no collaborators or callbacks
    pub fn new(snapshot: IsolateSnapshot, task_runners: TaskRunners) -> Self {
        Self {
            snapshot,
            task_runners,
            collaborators: IsolateCollaborators::default(),
            advisory_script_uri: DEFAULT_ADVISORY_SCRIPT_URI.to_string(),
            advisory_script_entrypoint: DEFAULT_ADVISORY_SCRIPT_ENTRYPOINT.to_string(),
            flags: None,
            isolate_create_callback: None,
            isolate_shutdown_callback: None,
        }
    }

    /// Set the advisory script URI and entrypoint
    pub fn with_advisory_names(mut self, uri: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        self.advisory_script_uri = uri.into();
        self.advisory_script_entrypoint = entrypoint.into();
        self
    }

    /// Set the host collaborators
    pub fn with_collaborators(mut self, collaborators: IsolateCollaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Override the VM's interpreter flags
    pub fn with_flags(mut self, flags: IsolateFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Set the create callback
    pub fn with_isolate_create_callback(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.isolate_create_callback = Some(Arc::new(f));
        self
    }

    /// Set the shutdown callback
    pub fn with_isolate_shutdown_callback(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.isolate_shutdown_callback = Some(Arc::new(f));
        self
    }
}

pub(crate) struct VmShared {
    settings: Settings,
    isolates: DashMap<IsolateId, Arc<Isolate>>,
}

impl VmShared {
    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn register(&self, isolate: Arc<Isolate>) {
        self.isolates.insert(isolate.id(), isolate);
    }

    pub(crate) fn deregister(&self, id: IsolateId) -> Option<Arc<Isolate>> {
        self.isolates.remove(&id).map(|(_, isolate)| isolate)
    }
}

/// Runtime instance owning a set of isolates
#[derive(Clone)]
pub struct Vm {
    shared: Arc<VmShared>,
}

impl Vm {
    /// Create a VM with `settings`
    pub fn new(settings: Settings) -> Self {
        Self {
            shared: Arc::new(VmShared {
                settings,
                isolates: DashMap::new(),
            }),
        }
    }

    /// VM settings
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Root isolate parameters carrying this VM's advisory script names
    pub fn root_isolate_params(&self, snapshot: IsolateSnapshot, task_runners: TaskRunners) -> RootIsolateParams {
        let settings = &self.shared.settings;
        RootIsolateParams::new(snapshot, task_runners).with_advisory_names(
            settings.advisory_script_uri.clone(),
            settings.advisory_script_entrypoint.clone(),
        )
    }

    /// Create a root isolate.
    ///
    /// The isolate is returned in `LibrariesSetup`. The VM keeps it alive
    /// until it shuts down; the returned handle does not.
    pub fn create_root_isolate(&self, params: RootIsolateParams) -> Result<Weak<Isolate>, IsolateError> {
        let RootIsolateParams {
            snapshot,
            task_runners,
            collaborators,
            advisory_script_uri,
            advisory_script_entrypoint,
            flags,
            isolate_create_callback,
            isolate_shutdown_callback,
        } = params;

        let settings = &self.shared.settings;
        let isolate = Isolate::create(
            &self.shared,
            IsolateConfig {
                snapshot,
                task_runners,
                collaborators,
                advisory_script_uri,
                advisory_script_entrypoint,
                flags: flags.unwrap_or_else(|| settings.flags.clone()),
                isolate_create_callback,
                isolate_shutdown_callback,
                root_isolate_shutdown_callback: settings.root_isolate_shutdown_callback.clone(),
                parent: None,
            },
        )?;
        Ok(Arc::downgrade(&isolate))
    }

    /// Look up a live isolate
    pub fn isolate(&self, id: IsolateId) -> Option<Arc<Isolate>> {
        self.shared.isolates.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of isolates that have not shut down
    pub fn live_isolate_count(&self) -> usize {
        self.shared.isolates.len()
    }

    /// IDs of isolates that have not shut down
    pub fn live_isolate_ids(&self) -> Vec<IsolateId> {
        self.shared.isolates.iter().map(|entry| *entry.key()).collect()
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("settings", &self.shared.settings)
            .field("live_isolates", &self.live_isolate_count())
            .finish()
    }
}
