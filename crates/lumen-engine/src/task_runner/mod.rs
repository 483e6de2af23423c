//! Task runners: places code can be scheduled to run
//!
//! A [`TaskRunner`] accepts closures and runs them, in target-time order, on
//! the thread it represents. Two implementations are provided:
//!
//! - [`MessageLoopThread`]: owns a named OS thread and its loop.
//! - [`EmbedderTaskRunner`]: owns no loop; hands every task to a host through
//!   a [`DispatchTable`] and runs it when the host presents its baton.

mod embedder;
mod message_loop;
mod task_runners;

pub use embedder::{DispatchTable, EmbedderTaskRunner};
pub use message_loop::{MessageLoopTaskRunner, MessageLoopThread};
pub use task_runners::TaskRunners;

use std::fmt;
use std::time::{Duration, Instant};

/// A unit of deferred work.
///
/// A task may be empty; runners drop empty tasks at post time without
/// scheduling anything.
#[derive(Default)]
pub struct Task {
    inner: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Task {
    /// Wrap a closure
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Some(Box::new(f)),
        }
    }

    /// A task that does nothing and is never scheduled
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Whether this task carries no closure
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Consume and run the task
    pub fn run(self) {
        if let Some(f) = self.inner {
            f();
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// Something that can run tasks on a particular thread.
pub trait TaskRunner: Send + Sync {
    /// Schedule `task` to run no earlier than `target_time`.
    fn post_task_for_time(&self, task: Task, target_time: Instant);

    /// Whether the calling thread is the one this runner executes on.
    fn runs_tasks_on_current_thread(&self) -> bool;

    /// Schedule `task` to run as soon as possible.
    fn post_task(&self, task: Task) {
        self.post_task_for_time(task, Instant::now());
    }

    /// Schedule `task` to run after `delay`.
    fn post_delayed_task(&self, task: Task, delay: Duration) {
        self.post_task_for_time(task, Instant::now() + delay);
    }
}

/// Run `task` inline if the caller is already on `runner`'s thread, otherwise
/// post it.
pub fn run_now_or_post_task(runner: &dyn TaskRunner, task: Task) {
    if runner.runs_tasks_on_current_thread() {
        task.run();
    } else {
        runner.post_task(task);
    }
}
