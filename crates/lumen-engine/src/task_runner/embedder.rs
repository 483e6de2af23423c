//! Task runner over a host-owned loop
//!
//! The host owns the real thread and its scheduling loop but knows nothing
//! about tasks. Each posted task is parked under a baton; the host is told
//! "something wants to run at time T, baton N" and later calls back with the
//! baton to run it.

use super::{Task, TaskRunner};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::time::Instant;

/// Host-side post callback: `(runner, baton, target_time)`
pub type PostTaskCallback = Box<dyn Fn(&EmbedderTaskRunner, u64, Instant) + Send + Sync>;

/// Host-side "is this the runner's thread" query
pub type RunsTaskOnCurrentThreadCallback = Box<dyn Fn() -> bool + Send + Sync>;

/// Callbacks the host supplies to drive an [`EmbedderTaskRunner`].
pub struct DispatchTable {
    /// Called once per posted task. The host must eventually call
    /// [`EmbedderTaskRunner::invoke_by_baton`] with the baton, no earlier than
    /// the target time, or the task is never run.
    pub post_task_callback: PostTaskCallback,
    /// Answers whether the calling thread is the one the host runs tasks on.
    pub runs_task_on_current_thread_callback: RunsTaskOnCurrentThreadCallback,
}

impl DispatchTable {
    /// Build a dispatch table from two closures
    pub fn new(
        post_task_callback: impl Fn(&EmbedderTaskRunner, u64, Instant) + Send + Sync + 'static,
        runs_task_on_current_thread_callback: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            post_task_callback: Box::new(post_task_callback),
            runs_task_on_current_thread_callback: Box::new(runs_task_on_current_thread_callback),
        }
    }
}

#[derive(Default)]
struct PendingTasks {
    last_baton: u64,
    tasks: FxHashMap<u64, Task>,
}

/// A task runner that hands execution to a host through batons.
///
/// The only shared state is the baton → task map. Its lock is held for the
/// insert/lookup/erase alone: never while calling into the host and never
/// while a task runs, so a host may call [`invoke_by_baton`] synchronously
/// from inside its post callback.
///
/// [`invoke_by_baton`]: EmbedderTaskRunner::invoke_by_baton
pub struct EmbedderTaskRunner {
    dispatch_table: DispatchTable,
    pending: Mutex<PendingTasks>,
}

impl EmbedderTaskRunner {
    /// Create a runner driven by `dispatch_table`
    pub fn new(dispatch_table: DispatchTable) -> Self {
        Self {
            dispatch_table,
            pending: Mutex::new(PendingTasks::default()),
        }
    }

    /// Run the task parked under `baton`.
    ///
    /// Returns `false` (and logs) if the baton is unknown or was already
    /// consumed; each baton runs at most once.
    pub fn invoke_by_baton(&self, baton: u64) -> bool {
        let task = {
            let mut pending = self.pending.lock();
            match pending.tasks.remove(&baton) {
                Some(task) => task,
                None => {
                    tracing::error!(baton, "embedder attempted to run an unknown task");
                    return false;
                }
            }
        };

        task.run();
        true
    }

    /// Tasks posted but not yet invoked by the host
    pub fn pending_task_count(&self) -> usize {
        self.pending.lock().tasks.len()
    }

    /// The most recently assigned baton (0 before the first post)
    pub fn last_baton(&self) -> u64 {
        self.pending.lock().last_baton
    }
}

impl TaskRunner for EmbedderTaskRunner {
    fn post_task_for_time(&self, task: Task, target_time: Instant) {
        if task.is_empty() {
            return;
        }

        let baton = {
            let mut pending = self.pending.lock();
            pending.last_baton += 1;
            let baton = pending.last_baton;
            pending.tasks.insert(baton, task);
            baton
        };

        (self.dispatch_table.post_task_callback)(self, baton, target_time);
    }

    fn runs_tasks_on_current_thread(&self) -> bool {
        (self.dispatch_table.runs_task_on_current_thread_callback)()
    }
}

impl fmt::Debug for EmbedderTaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.pending.lock();
        f.debug_struct("EmbedderTaskRunner")
            .field("last_baton", &pending.last_baton)
            .field("pending", &pending.tasks.len())
            .finish()
    }
}
