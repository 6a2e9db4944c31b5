//! The bootstrap scheduler: a deduplicating queue of workspaces needing
//! (re)population, drained with a concurrency cap of two and a cooperative
//! yield between batches.
//!
//! A root refresh (the global, cross-workspace bootstrap) always runs fully
//! before queued workspaces. Pausing stops the drain without dropping
//! queued work; resuming re-queues a full root refresh. The actual
//! bootstrap bodies live behind [`Bootstrapper`] so the scheduler stays
//! testable in isolation.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

pub const BOOTSTRAP_CONCURRENCY: usize = 2;

#[async_trait]
pub trait Bootstrapper: Send + Sync + 'static {
    async fn bootstrap_root(&self);
    async fn bootstrap_workspace(&self, directory: &Path);
}

/// Cooperative tick between drain iterations so a long queue never starves
/// the rest of the runtime.
pub async fn yield_to_scheduler() {
    tokio::task::yield_now().await;
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<PathBuf>,
    /// Set view of `queue`: re-enqueueing a queued directory is a no-op.
    queued: HashSet<PathBuf>,
    root: bool,
    paused: bool,
    draining: bool,
}

struct SchedulerInner {
    state: Mutex<QueueState>,
    runner: Mutex<Option<Weak<dyn Bootstrapper>>>,
}

pub struct BootstrapScheduler {
    inner: Arc<SchedulerInner>,
}

impl BootstrapScheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(QueueState::default()),
                runner: Mutex::new(None),
            }),
        }
    }

    /// Wire up the bootstrap bodies. Held weakly so the scheduler never
    /// keeps its owner alive.
    pub fn set_runner(&self, runner: Weak<dyn Bootstrapper>) {
        *self.inner.runner.lock() = Some(runner);
        self.kick();
    }

    pub fn enqueue(&self, directory: &Path) {
        {
            let mut state = self.inner.state.lock();
            if state.queued.insert(directory.to_path_buf()) {
                state.queue.push_back(directory.to_path_buf());
            }
        }
        self.kick();
    }

    pub fn request_root(&self) {
        self.inner.state.lock().root = true;
        self.kick();
    }

    /// Defer all scheduling without dropping queued work. Used while a
    /// global configuration write is outstanding.
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
    }

    /// Un-pause and re-queue a full root refresh.
    pub fn resume(&self) {
        {
            let mut state = self.inner.state.lock();
            state.paused = false;
            state.root = true;
        }
        self.kick();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn queued_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    fn kick(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.paused || state.draining {
                return;
            }
            if !state.root && state.queue.is_empty() {
                return;
            }
            state.draining = true;
        }
        tokio::spawn(drain(Arc::clone(&self.inner)));
    }
}

impl Default for BootstrapScheduler {
    fn default() -> Self {
        Self::new()
    }
}

enum Work {
    Root,
    Batch(Vec<PathBuf>),
}

async fn drain(inner: Arc<SchedulerInner>) {
    loop {
        let runner = inner
            .runner
            .lock()
            .as_ref()
            .and_then(Weak::upgrade);
        let Some(runner) = runner else {
            inner.state.lock().draining = false;
            return;
        };

        let work = {
            let mut state = inner.state.lock();
            if state.paused {
                // Stop without clearing the queue; resume re-arms.
                state.draining = false;
                return;
            }
            if state.root {
                state.root = false;
                Some(Work::Root)
            } else if !state.queue.is_empty() {
                let mut batch = Vec::new();
                while batch.len() < BOOTSTRAP_CONCURRENCY {
                    match state.queue.pop_front() {
                        Some(directory) => {
                            state.queued.remove(&directory);
                            batch.push(directory);
                        }
                        None => break,
                    }
                }
                Some(Work::Batch(batch))
            } else {
                None
            }
        };

        match work {
            Some(Work::Root) => {
                runner.bootstrap_root().await;
                yield_to_scheduler().await;
            }
            Some(Work::Batch(directories)) => {
                futures::future::join_all(
                    directories
                        .iter()
                        .map(|directory| runner.bootstrap_workspace(directory)),
                )
                .await;
                yield_to_scheduler().await;
            }
            None => {
                // Finalizer: re-arm if work arrived while finishing.
                let mut state = inner.state.lock();
                state.draining = false;
                if (state.root || !state.queue.is_empty()) && !state.paused {
                    state.draining = true;
                    continue;
                }
                return;
            }
        }
    }
}
