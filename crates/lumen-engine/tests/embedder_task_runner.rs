//! Host-bridged task runner tests
//!
//! A host thread owns the real loop and receives batons over a channel, the
//! way an embedder drives the runner through its dispatch table.

mod common;

use common::init_tracing;
use crossbeam::channel::{self, Receiver, Sender};
use lumen_engine::sync::{AutoResetEvent, CountDownLatch};
use lumen_engine::{
    add_native_callback, DispatchTable, EmbedderTaskRunner, IsolateSnapshot, Library,
    NativeCallResult, RootIsolateParams, Settings, Task, TaskRunner, TaskRunners, Vm,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

enum HostMessage {
    Run(u64),
    Quit,
}

/// A host loop on its own thread that runs batons in the order it hears
/// about them
struct HostThread {
    runner: Arc<EmbedderTaskRunner>,
    sender: Sender<HostMessage>,
    handle: Option<thread::JoinHandle<()>>,
}

impl HostThread {
    fn spawn() -> Self {
        let (sender, receiver): (Sender<HostMessage>, Receiver<HostMessage>) = channel::unbounded();
        let host_thread: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));

        let post_sender = sender.clone();
        let query_thread = Arc::clone(&host_thread);
        let runner = Arc::new(EmbedderTaskRunner::new(DispatchTable::new(
            move |_runner, baton, _target_time| {
                let _ = post_sender.send(HostMessage::Run(baton));
            },
            move || *query_thread.lock() == Some(thread::current().id()),
        )));

        let loop_runner = Arc::clone(&runner);
        let started = Arc::new(AutoResetEvent::new());
        let started_signal = Arc::clone(&started);
        let handle = thread::spawn(move || {
            *host_thread.lock() = Some(thread::current().id());
            started_signal.signal();
            for message in receiver {
                match message {
                    HostMessage::Run(baton) => {
                        loop_runner.invoke_by_baton(baton);
                    }
                    HostMessage::Quit => break,
                }
            }
        });
        started.wait();

        Self {
            runner,
            sender,
            handle: Some(handle),
        }
    }

    fn runner(&self) -> Arc<EmbedderTaskRunner> {
        Arc::clone(&self.runner)
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        let _ = self.sender.send(HostMessage::Quit);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn test_host_thread_runs_tasks_in_post_order() {
    init_tracing();
    let host = HostThread::spawn();
    let runner = host.runner();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let latch = Arc::new(CountDownLatch::new(10));

    for i in 0..10 {
        let seen = Arc::clone(&seen);
        let latch = Arc::clone(&latch);
        runner.post_task(Task::new(move || {
            seen.lock().push(i);
            latch.count_down();
        }));
    }

    latch.wait();
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    assert_eq!(runner.last_baton(), 10);
    assert_eq!(runner.pending_task_count(), 0);
}

#[test]
fn test_runs_tasks_on_current_thread_asks_the_host() {
    let host = HostThread::spawn();
    let runner = host.runner();
    assert!(!runner.runs_tasks_on_current_thread());

    let on_host = Arc::new(AutoResetEvent::new());
    let answer = Arc::new(Mutex::new(None));
    {
        let task_runner = host.runner();
        let on_host = Arc::clone(&on_host);
        let answer = Arc::clone(&answer);
        runner.post_task(Task::new(move || {
            *answer.lock() = Some(task_runner.runs_tasks_on_current_thread());
            on_host.signal();
        }));
    }
    on_host.wait();
    assert_eq!(*answer.lock(), Some(true));
}

#[test]
fn test_concurrent_posts_get_distinct_batons() {
    const THREADS: usize = 8;
    const POSTS_PER_THREAD: usize = 64;
    const TOTAL: usize = THREADS * POSTS_PER_THREAD;

    let batons = Arc::new(Mutex::new(Vec::with_capacity(TOTAL)));
    let recorded = Arc::clone(&batons);
    let runner = Arc::new(EmbedderTaskRunner::new(DispatchTable::new(
        move |_runner, baton, _target_time| recorded.lock().push(baton),
        || false,
    )));

    let ran = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let runner = Arc::clone(&runner);
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                for _ in 0..POSTS_PER_THREAD {
                    let ran = Arc::clone(&ran);
                    runner.post_task(Task::new(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    }));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let batons = batons.lock().clone();
    let distinct: HashSet<u64> = batons.iter().copied().collect();
    assert_eq!(batons.len(), TOTAL);
    assert_eq!(distinct.len(), TOTAL);
    assert_eq!(distinct, (1..=TOTAL as u64).collect::<HashSet<_>>());
    assert_eq!(runner.pending_task_count(), TOTAL);
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    for baton in &batons {
        assert!(runner.invoke_by_baton(*baton));
    }
    assert_eq!(ran.load(Ordering::SeqCst), TOTAL);
    assert_eq!(runner.pending_task_count(), 0);
    assert!(!runner.invoke_by_baton(batons[0]));
}

#[test]
fn test_target_time_reaches_the_host() {
    let target = Arc::new(Mutex::new(None));
    let recorded = Arc::clone(&target);
    let runner = EmbedderTaskRunner::new(DispatchTable::new(
        move |_runner, _baton, target_time| *recorded.lock() = Some(target_time),
        || false,
    ));

    let before = Instant::now();
    runner.post_delayed_task(Task::new(|| {}), Duration::from_millis(250));
    let target_time = target.lock().unwrap();
    assert!(target_time >= before + Duration::from_millis(250));
}

#[test]
fn test_isolate_runs_on_host_driven_runner() {
    init_tracing();
    let host = HostThread::spawn();
    let runner: Arc<dyn TaskRunner> = host.runner();
    let task_runners = TaskRunners::single("embedder", runner);

    let notified = Arc::new(AutoResetEvent::new());
    let root_shutdown = Arc::new(AutoResetEvent::new());
    {
        let notified = Arc::clone(&notified);
        add_native_callback("EmbedderRunner.NotifyNative", move |_ctx, _args| {
            notified.signal();
            NativeCallResult::null()
        });
    }
    let shutdown_signal = Arc::clone(&root_shutdown);
    let vm = Vm::new(
        Settings::new().with_root_isolate_shutdown_callback(move || shutdown_signal.signal()),
    );

    let library = Library::new("main.lm").function("main", |ctx| {
        let on_host = ctx.isolate().task_runners().ui().runs_tasks_on_current_thread();
        if on_host {
            ctx.call_native("EmbedderRunner.NotifyNative", &[])?;
        }
        Ok(())
    });
    let isolate = vm
        .create_root_isolate(RootIsolateParams::new(IsolateSnapshot::empty(), task_runners))
        .unwrap()
        .upgrade()
        .unwrap();
    isolate.load_libraries(vec![library]).unwrap();
    isolate.prepare_for_running().unwrap();
    isolate.run("main", &[]).unwrap();
    drop(isolate);

    notified.wait();
    root_shutdown.wait();
}
