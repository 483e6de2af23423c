//! The four task runners an isolate is bound to

use super::TaskRunner;
use std::fmt;
use std::sync::Arc;

/// Platform, UI, raster and I/O runners for one isolate.
///
/// Any of the four may alias the same underlying queue. The set is fixed when
/// the isolate is created.
#[derive(Clone)]
pub struct TaskRunners {
    label: String,
    platform: Arc<dyn TaskRunner>,
    raster: Arc<dyn TaskRunner>,
    ui: Arc<dyn TaskRunner>,
    io: Arc<dyn TaskRunner>,
}

impl TaskRunners {
    /// Create a runner set
    pub fn new(
        label: impl Into<String>,
        platform: Arc<dyn TaskRunner>,
        raster: Arc<dyn TaskRunner>,
        ui: Arc<dyn TaskRunner>,
        io: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            label: label.into(),
            platform,
            raster,
            ui,
            io,
        }
    }

    /// Create a runner set where all four roles share one runner
    pub fn single(label: impl Into<String>, runner: Arc<dyn TaskRunner>) -> Self {
        Self::new(
            label,
            Arc::clone(&runner),
            Arc::clone(&runner),
            Arc::clone(&runner),
            runner,
        )
    }

    /// Diagnostic label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Platform runner
    pub fn platform(&self) -> &Arc<dyn TaskRunner> {
        &self.platform
    }

    /// Raster (GPU) runner
    pub fn raster(&self) -> &Arc<dyn TaskRunner> {
        &self.raster
    }

    /// UI runner; isolate code executes here
    pub fn ui(&self) -> &Arc<dyn TaskRunner> {
        &self.ui
    }

    /// I/O runner
    pub fn io(&self) -> &Arc<dyn TaskRunner> {
        &self.io
    }
}

impl fmt::Debug for TaskRunners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunners")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
