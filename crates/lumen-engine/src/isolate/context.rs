//! Interpreter context and scoped entry
//!
//! An [`InterpreterContext`] is the interpreter-internal state of one
//! isolate. Code may touch it only while the calling thread holds an
//! [`IsolateScope`] for it. Scopes nest on one thread and exclude every other
//! thread until the outermost scope is dropped.

use lumen_sdk::NativeValue;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for an isolate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsolateId(u64);

impl IsolateId {
    /// Create a new unique isolate ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        IsolateId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for IsolateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate#{}", self.0)
    }
}

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<Arc<InterpreterContext>>> = const { RefCell::new(None) };
}

/// Interpreter-internal state of one isolate
pub struct InterpreterContext {
    id: IsolateId,
    debug_name: String,
    globals: Mutex<HashMap<String, NativeValue>>,
    alive: AtomicBool,
    entry_lock: ReentrantMutex<()>,
}

impl InterpreterContext {
    pub(crate) fn new(id: IsolateId, debug_name: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            debug_name,
            globals: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
            entry_lock: ReentrantMutex::new(()),
        })
    }

    /// The context the calling thread is currently inside, if any
    pub fn current() -> Option<Arc<InterpreterContext>> {
        CURRENT_CONTEXT.with(|current| current.borrow().clone())
    }

    /// Whether the calling thread is currently inside this context
    pub fn is_current(self: &Arc<Self>) -> bool {
        CURRENT_CONTEXT.with(|current| {
            current
                .borrow()
                .as_ref()
                .map_or(false, |ctx| Arc::ptr_eq(ctx, self))
        })
    }

    /// Owning isolate's ID
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// Owning isolate's debug name
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// False once the owning isolate has torn this context down
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Read a global slot
    pub fn get_global(&self, name: &str) -> Option<NativeValue> {
        self.globals.lock().get(name).cloned()
    }

    /// Write a global slot
    pub fn set_global(&self, name: impl Into<String>, value: NativeValue) {
        self.globals.lock().insert(name.into(), value);
    }

    /// Drop all heap state and mark the context dead
    pub(crate) fn tear_down(&self) {
        self.alive.store(false, Ordering::Release);
        let globals = std::mem::take(&mut *self.globals.lock());
        drop(globals);
    }
}

impl fmt::Debug for InterpreterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterContext")
            .field("id", &self.id)
            .field("debug_name", &self.debug_name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// RAII guard marking "this thread is executing inside `context`".
///
/// Entering waits while another thread holds a scope for the same context.
/// Dropping the guard restores whatever context the thread was in before,
/// including when the guarded block unwinds.
///
/// # Example
///
/// ```ignore
/// let _scope = IsolateScope::enter(&context);
/// assert!(context.is_current());
/// ```
pub struct IsolateScope<'a> {
    previous: Option<Arc<InterpreterContext>>,
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl<'a> IsolateScope<'a> {
    /// Enter `context` on the calling thread
    pub fn enter(context: &'a Arc<InterpreterContext>) -> Self {
        let guard = context.entry_lock.lock();
        let previous = CURRENT_CONTEXT.with(|current| current.replace(Some(Arc::clone(context))));
        Self {
            previous,
            _guard: guard,
        }
    }

    /// Enter `context` only if no other thread is inside it
    pub fn try_enter(context: &'a Arc<InterpreterContext>) -> Option<Self> {
        let guard = context.entry_lock.try_lock()?;
        let previous = CURRENT_CONTEXT.with(|current| current.replace(Some(Arc::clone(context))));
        Some(Self {
            previous,
            _guard: guard,
        })
    }
}

impl Drop for IsolateScope<'_> {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_CONTEXT.with(|current| *current.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn context(name: &str) -> Arc<InterpreterContext> {
        InterpreterContext::new(IsolateId::new(), name.to_string())
    }

    #[test]
    fn test_isolate_id_uniqueness() {
        let id1 = IsolateId::new();
        let id2 = IsolateId::new();
        assert_ne!(id1, id2);
        assert!(id2 > id1);
    }

    #[test]
    fn test_enter_and_exit() {
        let ctx = context("main.lm:main");
        assert!(InterpreterContext::current().is_none());
        {
            let _scope = IsolateScope::enter(&ctx);
            assert!(ctx.is_current());
            assert_eq!(InterpreterContext::current().unwrap().id(), ctx.id());
        }
        assert!(!ctx.is_current());
        assert!(InterpreterContext::current().is_none());
    }

    #[test]
    fn test_nested_scopes_restore_previous() {
        let outer = context("outer");
        let inner = context("inner");

        let _outer_scope = IsolateScope::enter(&outer);
        {
            let _inner_scope = IsolateScope::enter(&inner);
            assert!(inner.is_current());
            {
                // Same-thread re-entry nests
                let _again = IsolateScope::enter(&outer);
                assert!(outer.is_current());
            }
            assert!(inner.is_current());
        }
        assert!(outer.is_current());
    }

    #[test]
    fn test_scope_restored_after_panic() {
        let ctx = context("panicky");
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _scope = IsolateScope::enter(&ctx);
            panic!("unhandled error inside the isolate");
        }));
        assert!(result.is_err());
        assert!(InterpreterContext::current().is_none());

        // The lock was released during unwinding
        assert!(IsolateScope::try_enter(&ctx).is_some());
    }

    #[test]
    fn test_other_thread_is_excluded() {
        let ctx = context("exclusive");
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder_ctx = Arc::clone(&ctx);
        let holder = thread::spawn(move || {
            let _scope = IsolateScope::enter(&holder_ctx);
            entered_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });

        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(IsolateScope::try_enter(&ctx).is_none());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(IsolateScope::try_enter(&ctx).is_some());
    }

    #[test]
    fn test_globals_and_tear_down() {
        let ctx = context("globals");
        ctx.set_global("counter", NativeValue::int(1));
        assert_eq!(ctx.get_global("counter"), Some(NativeValue::int(1)));
        assert!(ctx.is_alive());

        ctx.tear_down();
        assert!(!ctx.is_alive());
        assert_eq!(ctx.get_global("counter"), None);
    }
}
