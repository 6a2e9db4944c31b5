//! Observable state container.
//!
//! Each workspace's state tree lives behind a [`Store`]: a plain mutable
//! structure with get/mutate/subscribe access. `mutate` is the transaction
//! boundary: subscribers are notified once per mutation, never per field
//! write, so a cascading delete is observed as a single transition.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};
use tokio::sync::broadcast;

const CHANGE_BUFFER: usize = 64;

pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

struct StoreInner<T> {
    state: RwLock<T>,
    revision: AtomicU64,
    changes: broadcast::Sender<u64>,
}

impl<T> Store<T> {
    pub fn new(initial: T) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(initial),
                revision: AtomicU64::new(0),
                changes,
            }),
        }
    }

    /// Read access without cloning. Holding the guard across `await` points
    /// is a bug; take a [`snapshot`](Self::snapshot) instead.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.state.read()
    }

    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.inner.state.read().clone()
    }

    /// Apply one atomic mutation and notify subscribers exactly once.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut state = self.inner.state.write();
            f(&mut state)
        };
        let revision = self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
        // No receivers is fine; the send result only signals that.
        let _ = self.inner.changes.send(revision);
        result
    }

    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    /// Change notifications: the revision after each committed mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.inner.changes.subscribe()
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
