//! Shared harness for the isolate integration tests
//!
//! Mirrors how an embedder drives the engine: four loop threads, a root
//! isolate created and started on the UI thread, and shutdown posted back to
//! the UI thread when the test is done with it.

#![allow(dead_code)]

use lumen_engine::sync::AutoResetEvent;
use lumen_engine::{
    Isolate, IsolateError, IsolateSnapshot, Library, MessageLoopThread, Phase, RootIsolateParams,
    Task, TaskRunners, Vm,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Install a fmt subscriber that writes through the test harness.
///
/// Set `RUST_LOG=lumen_engine=debug` to see lifecycle logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Platform, raster, UI and I/O threads for one test
pub struct ThreadHost {
    pub platform: MessageLoopThread,
    pub raster: MessageLoopThread,
    pub ui: MessageLoopThread,
    pub io: MessageLoopThread,
}

impl ThreadHost {
    pub fn new(label: &str) -> Self {
        Self {
            platform: MessageLoopThread::spawn(&format!("{label}.platform")),
            raster: MessageLoopThread::spawn(&format!("{label}.raster")),
            ui: MessageLoopThread::spawn(&format!("{label}.ui")),
            io: MessageLoopThread::spawn(&format!("{label}.io")),
        }
    }

    pub fn task_runners(&self, label: &str) -> TaskRunners {
        TaskRunners::new(
            label,
            self.platform.task_runner(),
            self.raster.task_runner(),
            self.ui.task_runner(),
            self.io.task_runner(),
        )
    }
}

/// Post `f` to the UI runner and block until it has run
pub fn run_on_ui<R: Send + 'static>(
    task_runners: &TaskRunners,
    f: impl FnOnce() -> R + Send + 'static,
) -> R {
    let slot = Arc::new(Mutex::new(None));
    let done = Arc::new(AutoResetEvent::new());
    {
        let slot = Arc::clone(&slot);
        let done = Arc::clone(&done);
        task_runners.ui().post_task(Task::new(move || {
            *slot.lock() = Some(f());
            done.signal();
        }));
    }
    done.wait();
    let result = slot.lock().take();
    result.expect("UI task did not produce a result")
}

/// Shuts the wrapped isolate down on its UI runner when dropped
pub struct AutoIsolateShutdown {
    isolate: Weak<Isolate>,
    task_runners: TaskRunners,
    phase_after_run: Phase,
}

impl AutoIsolateShutdown {
    pub fn isolate(&self) -> Option<Arc<Isolate>> {
        self.isolate.upgrade()
    }

    pub fn weak(&self) -> &Weak<Isolate> {
        &self.isolate
    }

    /// Phase observed on the UI thread immediately after `run` returned
    pub fn phase_after_run(&self) -> Phase {
        self.phase_after_run
    }
}

impl Drop for AutoIsolateShutdown {
    fn drop(&mut self) {
        let isolate = self.isolate.clone();
        run_on_ui(&self.task_runners, move || {
            if let Some(isolate) = isolate.upgrade() {
                let _ = isolate.shutdown();
            }
        });
    }
}

/// Create a root isolate on the UI thread, load `library`, and run
/// `entrypoint` with `args`.
pub fn run_code_in_isolate(
    vm: &Vm,
    task_runners: &TaskRunners,
    library: Library,
    entrypoint: &str,
    args: &[&str],
) -> Result<AutoIsolateShutdown, IsolateError> {
    let vm = vm.clone();
    let runners = task_runners.clone();
    let entrypoint = entrypoint.to_string();
    let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();

    run_on_ui(task_runners, move || {
        let params = RootIsolateParams::new(IsolateSnapshot::empty(), runners.clone())
            .with_advisory_names("main.lm", entrypoint.clone());
        let weak = vm.create_root_isolate(params)?;
        let isolate = weak.upgrade().ok_or(IsolateError::VmUnavailable)?;

        let started = isolate
            .load_libraries(vec![library])
            .and_then(|()| isolate.prepare_for_running())
            .and_then(|()| isolate.run(&entrypoint, &args));
        if let Err(err) = started {
            let _ = isolate.shutdown();
            return Err(err);
        }

        Ok(AutoIsolateShutdown {
            isolate: weak,
            task_runners: runners,
            phase_after_run: isolate.phase(),
        })
    })
}
