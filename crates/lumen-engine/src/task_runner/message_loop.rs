//! Thread-backed message loop
//!
//! A dedicated OS thread waits on a min-heap of pending tasks keyed by target
//! time, sleeping on a condvar until the earliest one is due or a new one is
//! posted.

use super::{Task, TaskRunner};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

/// Entry in the loop's task heap
struct PendingTask {
    /// When the task becomes runnable
    target_time: Instant,
    /// Post order, breaks ties so equal target times run FIFO
    order: u64,
    task: Task,
}

// Reverse ordering for min-heap (earliest target time first)
impl Ord for PendingTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .target_time
            .cmp(&self.target_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.target_time == other.target_time && self.order == other.order
    }
}

impl Eq for PendingTask {}

#[derive(Default)]
struct LoopState {
    queue: BinaryHeap<PendingTask>,
    next_order: u64,
    terminated: bool,
}

/// Task runner half of a [`MessageLoopThread`].
///
/// Cheap to share; outlives the thread. Tasks posted after the loop has
/// terminated are dropped without running.
pub struct MessageLoopTaskRunner {
    label: String,
    state: Mutex<LoopState>,
    notify: Condvar,
    thread_id: OnceCell<ThreadId>,
}

impl MessageLoopTaskRunner {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Mutex::new(LoopState::default()),
            notify: Condvar::new(),
            thread_id: OnceCell::new(),
        }
    }

    /// Label the loop thread was spawned with
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of tasks waiting to run
    pub fn pending_task_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether the loop has stopped accepting tasks
    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    fn terminate(&self) {
        let mut state = self.state.lock();
        state.terminated = true;
        self.notify.notify_all();
    }

    fn run_loop(&self) {
        let mut state = self.state.lock();
        loop {
            if state.terminated {
                break;
            }

            let now = Instant::now();
            let next_due = state.queue.peek().map(|next| next.target_time);
            match next_due {
                Some(target_time) if target_time <= now => {
                    if let Some(entry) = state.queue.pop() {
                        MutexGuard::unlocked(&mut state, || self.run_task(entry.task));
                    }
                }
                Some(target_time) => {
                    // Wakes early if a sooner task is posted
                    self.notify.wait_for(&mut state, target_time - now);
                }
                None => {
                    self.notify.wait(&mut state);
                }
            }
        }

        let abandoned = std::mem::take(&mut state.queue);
        drop(state);
        if !abandoned.is_empty() {
            tracing::debug!(
                loop_label = %self.label,
                count = abandoned.len(),
                "dropping tasks left on terminated message loop"
            );
        }
        drop(abandoned);
    }

    fn run_task(&self, task: Task) {
        if panic::catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
            tracing::error!(loop_label = %self.label, "task panicked on message loop");
        }
    }
}

impl TaskRunner for MessageLoopTaskRunner {
    fn post_task_for_time(&self, task: Task, target_time: Instant) {
        if task.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        let order = state.next_order;
        state.next_order += 1;
        state.queue.push(PendingTask {
            target_time,
            order,
            task,
        });
        self.notify.notify_one();
    }

    fn runs_tasks_on_current_thread(&self) -> bool {
        self.thread_id.get() == Some(&thread::current().id())
    }
}

/// A named OS thread running a message loop.
///
/// Dropping the thread terminates the loop and joins it.
pub struct MessageLoopThread {
    runner: Arc<MessageLoopTaskRunner>,
    handle: Option<JoinHandle<()>>,
}

impl MessageLoopThread {
    /// Spawn a new loop thread
    pub fn spawn(label: &str) -> Self {
        let runner = Arc::new(MessageLoopTaskRunner::new(label));
        let loop_runner = Arc::clone(&runner);

        let handle = thread::Builder::new()
            .name(format!("lumen-{}", label))
            .spawn(move || loop_runner.run_loop())
            .expect("Failed to spawn message loop thread");

        let _ = runner.thread_id.set(handle.thread().id());

        Self {
            runner,
            handle: Some(handle),
        }
    }

    /// The loop's task runner
    pub fn task_runner(&self) -> Arc<MessageLoopTaskRunner> {
        Arc::clone(&self.runner)
    }

    /// Stop the loop and wait for the thread to exit.
    ///
    /// Tasks that have not started are dropped. Calling this from a task on the
    /// loop itself stops the loop without joining.
    pub fn terminate(&mut self) {
        self.runner.terminate();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for MessageLoopThread {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{AutoResetEvent, CountDownLatch};
    use std::time::Duration;

    #[test]
    fn test_runs_posted_task() {
        let thread = MessageLoopThread::spawn("posted");
        let runner = thread.task_runner();
        let done = Arc::new(AutoResetEvent::new());

        let signal = Arc::clone(&done);
        runner.post_task(Task::new(move || signal.signal()));

        assert!(done.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_runs_tasks_on_current_thread() {
        let thread = MessageLoopThread::spawn("current-thread");
        let runner = thread.task_runner();
        assert!(!runner.runs_tasks_on_current_thread());

        let on_loop = Arc::new(Mutex::new(None));
        let done = Arc::new(AutoResetEvent::new());

        let inner = Arc::clone(&runner);
        let observed = Arc::clone(&on_loop);
        let signal = Arc::clone(&done);
        runner.post_task(Task::new(move || {
            *observed.lock() = Some(inner.runs_tasks_on_current_thread());
            signal.signal();
        }));

        done.wait();
        assert_eq!(*on_loop.lock(), Some(true));
    }

    #[test]
    fn test_delayed_tasks_run_in_target_time_order() {
        let thread = MessageLoopThread::spawn("delayed");
        let runner = thread.task_runner();
        let order = Arc::new(Mutex::new(Vec::new()));
        let latch = Arc::new(CountDownLatch::new(3));

        let now = Instant::now();
        for (label, delay_ms) in [(3, 60u64), (1, 20), (2, 40)] {
            let order = Arc::clone(&order);
            let latch = Arc::clone(&latch);
            runner.post_task_for_time(
                Task::new(move || {
                    order.lock().push(label);
                    latch.count_down();
                }),
                now + Duration::from_millis(delay_ms),
            );
        }

        latch.wait();
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_equal_target_times_run_fifo() {
        let thread = MessageLoopThread::spawn("fifo");
        let runner = thread.task_runner();
        let order = Arc::new(Mutex::new(Vec::new()));
        let latch = Arc::new(CountDownLatch::new(5));

        let target = Instant::now() + Duration::from_millis(10);
        for i in 0..5 {
            let order = Arc::clone(&order);
            let latch = Arc::clone(&latch);
            runner.post_task_for_time(
                Task::new(move || {
                    order.lock().push(i);
                    latch.count_down();
                }),
                target,
            );
        }

        latch.wait();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_terminate_drops_pending_tasks() {
        let mut thread = MessageLoopThread::spawn("terminate");
        let runner = thread.task_runner();

        runner.post_delayed_task(Task::new(|| unreachable!()), Duration::from_secs(60));
        assert_eq!(runner.pending_task_count(), 1);

        thread.terminate();
        assert!(runner.is_terminated());
        assert_eq!(runner.pending_task_count(), 0);

        // Posting after termination is a silent drop
        runner.post_task(Task::new(|| unreachable!()));
        assert_eq!(runner.pending_task_count(), 0);
    }

    #[test]
    fn test_empty_task_is_not_queued() {
        let thread = MessageLoopThread::spawn("empty");
        let runner = thread.task_runner();
        runner.post_delayed_task(Task::empty(), Duration::from_secs(60));
        assert_eq!(runner.pending_task_count(), 0);
    }
}
