//! The multi-workspace instance registry.
//!
//! One mutable state tree per tracked directory, created lazily on first
//! access and kept for the process lifetime. The engine layers the side
//! effects (persisted-cache seeding, bootstrap scheduling) on top of the
//! bare allocation done here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mira_api::types::Pty;
use parking_lot::Mutex;
use serde_json::Value;

use crate::files::FileStore;
use crate::scope::Scope;
use crate::state::WorkspaceState;
use crate::store::Store;
use crate::views::{SESSION_SLOT_LIMIT, SlotCache, VIEW_STATE_LIMIT};

/// Everything owned by one workspace: its observable state tree and the
/// bounded caches scoped to it. Mutated only by its own reconciler dispatch
/// and bootstrap handlers.
pub struct Workspace {
    pub directory: PathBuf,
    pub store: Store<WorkspaceState>,
    pub files: Mutex<FileStore>,
    /// Per-session UI view state; the active session's entry is protected.
    pub views: Mutex<SlotCache<Value>>,
    /// Per-session comment drafts/threads.
    pub comments: Mutex<SlotCache<Value>>,
    /// Per-session terminals, keyed by session id.
    pub terminals: Mutex<SlotCache<Vec<Pty>>>,
    pub scope: Scope,
}

impl Workspace {
    fn new(directory: PathBuf, session_limit: usize) -> Self {
        Self {
            directory,
            store: Store::new(WorkspaceState::with_session_limit(session_limit)),
            files: Mutex::new(FileStore::new()),
            views: Mutex::new(SlotCache::new(VIEW_STATE_LIMIT)),
            comments: Mutex::new(SlotCache::new(SESSION_SLOT_LIMIT)),
            terminals: Mutex::new(SlotCache::new(SESSION_SLOT_LIMIT)),
            scope: Scope::new(),
        }
    }

    /// Tear down the workspace's disposables and sub-caches. The state tree
    /// itself survives (workspaces are never pruned).
    pub fn dispose(&self) {
        self.views.lock().clear();
        self.comments.lock().clear();
        self.terminals.lock().clear();
        self.scope.dispose();
    }
}

pub struct InstanceRegistry {
    workspaces: Mutex<HashMap<PathBuf, Arc<Workspace>>>,
    session_limit: usize,
}

impl InstanceRegistry {
    pub fn new(session_limit: usize) -> Self {
        Self {
            workspaces: Mutex::new(HashMap::new()),
            session_limit,
        }
    }

    /// Get or lazily create the workspace for `directory`. Idempotent: the
    /// same handle comes back for repeated calls. The `bool` reports
    /// whether this call allocated it.
    pub fn child(&self, directory: &Path) -> (Arc<Workspace>, bool) {
        let mut workspaces = self.workspaces.lock();
        if let Some(existing) = workspaces.get(directory) {
            return (Arc::clone(existing), false);
        }
        let workspace = Arc::new(Workspace::new(directory.to_path_buf(), self.session_limit));
        workspaces.insert(directory.to_path_buf(), Arc::clone(&workspace));
        (workspace, true)
    }

    pub fn get(&self, directory: &Path) -> Option<Arc<Workspace>> {
        self.workspaces.lock().get(directory).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Workspace>> {
        self.workspaces.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workspaces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.lock().is_empty()
    }
}
