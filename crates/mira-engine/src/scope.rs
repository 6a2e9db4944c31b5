//! Explicit lifetime handles for anything that needs teardown: event
//! listeners, per-session sub-stores, timers. Cleanups run once, in reverse
//! registration order, either on `dispose()` or on drop.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct Scope {
    cleanups: Mutex<Vec<Cleanup>>,
    disposed: AtomicBool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup. If the scope is already disposed, the cleanup
    /// runs immediately.
    pub fn defer(&self, cleanup: impl FnOnce() + Send + 'static) {
        if self.disposed.load(Ordering::SeqCst) {
            cleanup();
            return;
        }
        self.cleanups.lock().push(Box::new(cleanup));
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Run all cleanups. Subsequent calls are no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut cleanups = std::mem::take(&mut *self.cleanups.lock());
        while let Some(cleanup) = cleanups.pop() {
            cleanup();
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("disposed", &self.is_disposed())
            .field("pending", &self.cleanups.lock().len())
            .finish()
    }
}
