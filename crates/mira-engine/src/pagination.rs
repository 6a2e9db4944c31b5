//! Chunked backfill of session message history, with optimistic local
//! writes.
//!
//! `sync` runs exactly once per (directory, session); concurrent callers
//! collapse onto one in-flight load keyed `"directory\nsessionID"`.
//! `load_more` extends the window backwards from the earliest loaded id.
//! Completeness is proven only by a short read: a fetch returning exactly
//! the requested count still needs one more round trip to confirm the
//! boundary.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use mira_api::RemoteClient;
use mira_api::types::{Message, MessageWithParts, Part};
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::merge::upsert_sorted;
use crate::registry::Workspace;
use crate::state::WorkspaceState;

pub const MESSAGE_CHUNK: usize = 400;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    /// The initial chunk has landed.
    pub loaded: bool,
    /// A backfill fetch is in flight.
    pub loading: bool,
    /// A fetch returned fewer messages than requested.
    pub complete: bool,
}

pub struct MessagePager {
    inflight: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
    windows: Mutex<HashMap<String, HistoryWindow>>,
}

impl MessagePager {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn key(directory: &Path, session_id: &str) -> String {
        format!("{}\n{}", directory.display(), session_id)
    }

    pub fn window(&self, directory: &Path, session_id: &str) -> HistoryWindow {
        self.windows
            .lock()
            .get(&Self::key(directory, session_id))
            .copied()
            .unwrap_or_default()
    }

    /// Ensure the session's metadata and its initial message chunk are
    /// loaded. Succeeds at most once; a failed attempt leaves the slot
    /// empty so a later caller retries.
    pub async fn sync(
        &self,
        client: &RemoteClient,
        workspace: &Workspace,
        session_id: &str,
        chunk: usize,
    ) -> Result<()> {
        let key = Self::key(&workspace.directory, session_id);
        let cell = {
            let mut inflight = self.inflight.lock();
            Arc::clone(inflight.entry(key.clone()).or_default())
        };

        cell.get_or_try_init(|| async {
            let session = client.session_get(session_id).await?;
            let batch = client.session_messages(session_id, chunk, None).await?;
            let returned = batch.len();
            let diff = client.session_diff(session_id).await?;
            let todos = client.session_todo(session_id).await?;

            workspace.store.mutate(|state| {
                upsert_sorted(&mut state.sessions, session, |s| &s.id);
                insert_batch(state, session_id, &batch);
                state.diffs.insert(session_id.to_string(), diff);
                state.todos.insert(session_id.to_string(), todos);
            });

            let mut windows = self.windows.lock();
            let window = windows.entry(key.clone()).or_default();
            window.loaded = true;
            window.complete = returned < chunk;
            Ok::<(), crate::error::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Extend the loaded window by `count` messages. No-op (returning
    /// false) while a fetch is in flight or the history is proven complete.
    pub async fn load_more(
        &self,
        client: &RemoteClient,
        workspace: &Workspace,
        session_id: &str,
        count: usize,
    ) -> Result<bool> {
        let key = Self::key(&workspace.directory, session_id);
        {
            let mut windows = self.windows.lock();
            let window = windows.entry(key.clone()).or_default();
            if window.loading || window.complete {
                return Ok(false);
            }
            window.loading = true;
        }

        let before = workspace
            .store
            .read()
            .messages
            .get(session_id)
            .and_then(|messages| messages.first())
            .map(|message| message.id.clone());

        let result = client
            .session_messages(session_id, count, before.as_deref())
            .await;

        let mut windows = self.windows.lock();
        let window = windows.entry(key).or_default();
        window.loading = false;
        let batch = match result {
            Ok(batch) => batch,
            Err(error) => return Err(error.into()),
        };
        window.loaded = true;
        if batch.len() < count {
            window.complete = true;
        }
        drop(windows);

        workspace
            .store
            .mutate(|state| insert_batch(state, session_id, &batch));
        Ok(true)
    }

    /// Insert a locally-authored message (and its parts) ahead of the
    /// server's acknowledgment. Uses the same sorted upsert as the
    /// reconciler, so the authoritative echo merges in place instead of
    /// duplicating.
    pub fn add_optimistic(&self, workspace: &Workspace, message: Message, parts: Vec<Part>) {
        workspace.store.mutate(|state| {
            let messages = state.messages.entry(message.session_id.clone()).or_default();
            let message_id = message.id.clone();
            upsert_sorted(messages, message, |m| &m.id);

            let slot = state.parts.entry(message_id).or_default();
            for part in parts {
                upsert_sorted(slot, part, |p| &p.id);
            }
        });
    }
}

impl Default for MessagePager {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_batch(state: &mut WorkspaceState, session_id: &str, batch: &[MessageWithParts]) {
    for item in batch {
        let messages = state.messages.entry(session_id.to_string()).or_default();
        upsert_sorted(messages, item.info.clone(), |m| &m.id);

        let parts = state.parts.entry(item.info.id.clone()).or_default();
        for part in &item.parts {
            upsert_sorted(parts, part.clone(), |p| &p.id);
        }
    }
}
