//! The top-level engine: one object owning the client factory, the
//! workspace registry, the bootstrap scheduler, persistence, and the single
//! ordered event dispatcher.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mira_api::event::{Event, EventEnvelope};
use mira_api::types::{
    Config, Message, Part, Project, Pty, PtyCreate, PtyUpdate, VcsInfo,
};
use mira_api::{ClientFactory, RemoteClient};
use mira_remote::retry::{RetryPolicy, with_retry};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;

use crate::bootstrap::{BootstrapScheduler, Bootstrapper};
use crate::error::Result;
use crate::files::FileState;
use crate::merge::upsert_sorted;
use crate::pagination::{HistoryWindow, MESSAGE_CHUNK, MessagePager};
use crate::reconcile::{Effect, reconcile};
use crate::registry::{InstanceRegistry, Workspace};
use crate::retention::trim_sessions;
use crate::state::{GlobalState, WorkspaceStatus, now_ms};
use crate::store::Store;

pub const DEFAULT_SESSION_LIMIT: usize = 50;
pub const SESSION_LIMIT_STEP: usize = 50;

const NOTICE_BUFFER: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

const VCS_CACHE_KEY: &str = "vcs";
const VCS_CACHE_VERSION: u32 = 2;
const PROJECT_CACHE_KEY: &str = "project";
const PROJECT_CACHE_VERSION: u32 = 2;
const PROJECT_ICON_CACHE_KEY: &str = "project-icon";
const PROJECT_ICON_CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base size of the session retention window.
    pub session_limit: usize,
    /// How much "load more sessions" widens the window.
    pub session_limit_step: usize,
    /// Message pagination chunk size.
    pub message_chunk: usize,
    /// Retry policy for retry-wrapped bootstrap calls.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_limit: DEFAULT_SESSION_LIMIT,
            session_limit_step: SESSION_LIMIT_STEP,
            message_chunk: MESSAGE_CHUNK,
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notices — user-visible notifications for the external presentation layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub context: Option<String>,
}

impl Notice {
    fn error(message: impl Into<String>, context: Option<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            context,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence wrapper — degrades silently, never fatal
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Persist {
    store: Option<Arc<Mutex<mira_db::Store>>>,
}

impl Persist {
    pub fn new(store: mira_db::Store) -> Self {
        Self {
            store: Some(Arc::new(Mutex::new(store))),
        }
    }

    /// In-memory-only mode: every read misses, every write is dropped.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn ready(&self) -> bool {
        self.store
            .as_ref()
            .is_some_and(|store| store.lock().ready())
    }

    fn get(&self, directory: Option<&str>, base: &str, version: u32) -> Option<Value> {
        let store = self.store.as_ref()?;
        let mut store = store.lock();
        let scope = scope_for(directory);
        match store.kv().get_versioned(scope, base, version) {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(%error, key = base, "persistence read failed");
                None
            }
        }
    }

    fn put(&self, directory: Option<&str>, base: &str, version: u32, value: &Value) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let mut store = store.lock();
        let scope = scope_for(directory);
        if let Err(error) = store.kv().set_versioned(scope, base, version, value) {
            tracing::debug!(%error, key = base, "persistence write failed");
        }
    }
}

fn scope_for(directory: Option<&str>) -> mira_db::KvScope<'_> {
    match directory {
        Some(directory) => mira_db::KvScope::Workspace { directory },
        None => mira_db::KvScope::Global,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    clients: Arc<dyn ClientFactory>,
    registry: InstanceRegistry,
    scheduler: BootstrapScheduler,
    pager: MessagePager,
    global: Store<GlobalState>,
    persist: Persist,
    notices: broadcast::Sender<Notice>,
    scope: crate::scope::Scope,
    disposed: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig, clients: Arc<dyn ClientFactory>, persist: Persist) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);
        let registry = InstanceRegistry::new(config.session_limit);
        let inner = Arc::new(EngineInner {
            config,
            clients,
            registry,
            scheduler: BootstrapScheduler::new(),
            pager: MessagePager::new(),
            global: Store::default(),
            persist,
            notices,
            scope: crate::scope::Scope::new(),
            disposed: AtomicBool::new(false),
        });

        let runner: Arc<dyn Bootstrapper> = inner.clone();
        inner.scheduler.set_runner(Arc::downgrade(&runner));

        Self { inner }
    }

    /// Engine against the default server URL, persisting to the app-local
    /// cache database. A broken persistence path degrades to in-memory.
    pub fn from_env() -> Self {
        let clients = Arc::new(mira_remote::HttpClientFactory::new(
            mira_remote::ServerConfig::default(),
        ));
        let persist = mira_app::cache_db_path()
            .ok()
            .and_then(|path| mira_db::Store::open(path).ok())
            .map(Persist::new)
            .unwrap_or_else(Persist::disabled);
        Self::new(EngineConfig::default(), clients, persist)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn global_store(&self) -> Store<GlobalState> {
        self.inner.global.clone()
    }

    /// Get or create the workspace handle for `directory` and schedule its
    /// bootstrap on first access.
    pub fn child(&self, directory: &Path) -> Arc<Workspace> {
        self.child_with(directory, true)
    }

    /// Like [`child`](Self::child) but never triggers a bootstrap; used by
    /// callers that only need read access (e.g. UI-driven pagination).
    pub fn child_inert(&self, directory: &Path) -> Arc<Workspace> {
        self.child_with(directory, false)
    }

    fn child_with(&self, directory: &Path, bootstrap: bool) -> Arc<Workspace> {
        let (workspace, created) = self.inner.registry.child(directory);
        if created {
            self.inner.seed_workspace(&workspace);
            if bootstrap {
                self.inner.scheduler.enqueue(directory);
            }
        }
        workspace
    }

    pub fn workspace(&self, directory: &Path) -> Option<Arc<Workspace>> {
        self.inner.registry.get(directory)
    }

    /// Queue a re-bootstrap for one workspace.
    pub fn refresh(&self, directory: &Path) {
        self.inner.scheduler.enqueue(directory);
    }

    /// Queue the global root refresh.
    pub fn refresh_all(&self) {
        self.inner.scheduler.request_root();
    }

    /// Subscribe to the remote event stream and start the ordered
    /// dispatcher. Also queues the initial root refresh. The listener is
    /// torn down by [`dispose`](Self::dispose).
    pub fn connect(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                if inner.disposed.load(Ordering::SeqCst) {
                    return;
                }
                let client = inner.clients.client(None);
                let mut stream = client.events();
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(envelope) => inner.dispatch(envelope),
                        Err(error) => {
                            tracing::warn!(%error, "event stream interrupted");
                            break;
                        }
                    }
                }
                if inner.disposed.load(Ordering::SeqCst) {
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
        self.inner.scope.defer(move || handle.abort());
        self.inner.scheduler.request_root();
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(crate::error::Error::Disposed);
        }
        Ok(())
    }

    /// Write configuration. Scheduling is paused while the write is
    /// outstanding; resuming re-queues a full root refresh.
    pub async fn update_config(
        &self,
        directory: Option<&Path>,
        config: &Config,
    ) -> Result<Config> {
        self.ensure_live()?;
        self.inner.scheduler.pause();
        let client = self.inner.clients.client(directory);
        let result = client.config_update(config).await;
        self.inner.scheduler.resume();

        match result {
            Ok(updated) => {
                match directory {
                    Some(directory) => {
                        if let Some(workspace) = self.inner.registry.get(directory) {
                            let value = updated.clone();
                            workspace.store.mutate(|state| state.config = Some(value));
                        }
                    }
                    None => {
                        let value = updated.clone();
                        self.inner.global.mutate(|state| state.config = Some(value));
                    }
                }
                Ok(updated)
            }
            Err(error) => {
                self.inner.notify(Notice::error(
                    "failed to update configuration",
                    Some(error.to_string()),
                ));
                Err(error.into())
            }
        }
    }

    /// Update project metadata (rename, icon). The authoritative result is
    /// applied to the live state and the persisted side-cache.
    pub async fn update_project(
        &self,
        directory: Option<&Path>,
        project: &Project,
    ) -> Result<Project> {
        let client = self.inner.clients.client(directory);
        let updated = client.project_update(project).await?;
        match directory {
            Some(directory) => {
                self.inner.persist_project(directory, &updated);
                if let Some(workspace) = self.inner.registry.get(directory) {
                    let value = updated.clone();
                    workspace.store.mutate(|state| state.project = Some(value));
                }
            }
            None => {
                let value = updated.clone();
                self.inner.global.mutate(|state| {
                    upsert_sorted(&mut state.projects, value, |p| &p.id);
                });
            }
        }
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Sessions and messages
    // -----------------------------------------------------------------------

    /// Rename or archive a session. The result lands through the same
    /// sorted upsert the reconciler uses, so the later authoritative event
    /// merges in place.
    pub async fn update_session(
        &self,
        directory: &Path,
        session_id: &str,
        update: &mira_api::types::SessionUpdate,
    ) -> Result<mira_api::types::Session> {
        let workspace = self.child_inert(directory);
        let client = self.inner.clients.client(Some(directory));
        let session = client.session_update(session_id, update).await?;
        let now = now_ms();
        workspace.store.mutate(|state| {
            reconcile(
                state,
                &Event::SessionUpdated {
                    info: session.clone(),
                },
                now,
            );
        });
        Ok(session)
    }

    /// Ensure a session's metadata and initial message chunk are loaded.
    pub async fn sync_session(&self, directory: &Path, session_id: &str) -> Result<()> {
        self.ensure_live()?;
        let workspace = self.child_inert(directory);
        let client = self.inner.clients.client(Some(directory));
        let result = self
            .inner
            .pager
            .sync(
                &client,
                &workspace,
                session_id,
                self.inner.config.message_chunk,
            )
            .await;
        if let Err(error) = &result {
            self.inner.notify(Notice::error(
                format!("failed to load session {session_id}"),
                Some(error.to_string()),
            ));
        }
        result
    }

    /// Extend a session's loaded history window.
    pub async fn load_more_messages(
        &self,
        directory: &Path,
        session_id: &str,
        count: Option<usize>,
    ) -> Result<bool> {
        self.ensure_live()?;
        let workspace = self.child_inert(directory);
        let client = self.inner.clients.client(Some(directory));
        let count = count.unwrap_or(self.inner.config.message_chunk);
        let result = self
            .inner
            .pager
            .load_more(&client, &workspace, session_id, count)
            .await;
        if let Err(error) = &result {
            self.inner.notify(Notice::error(
                format!("failed to load messages for {session_id}"),
                Some(error.to_string()),
            ));
        }
        result
    }

    pub fn history_window(&self, directory: &Path, session_id: &str) -> HistoryWindow {
        self.inner.pager.window(directory, session_id)
    }

    /// Insert a locally-authored message before the server acknowledges it.
    pub fn add_optimistic_message(&self, directory: &Path, message: Message, parts: Vec<Part>) {
        let workspace = self.child_inert(directory);
        self.inner.pager.add_optimistic(&workspace, message, parts);
    }

    /// Widen the session retention window and re-apply the policy against a
    /// fresh remote list.
    pub async fn load_more_sessions(&self, directory: &Path) -> Result<()> {
        let workspace = self.child_inert(directory);
        let step = self.inner.config.session_limit_step;
        workspace
            .store
            .mutate(|state| state.session_limit += step);

        let client = self.inner.clients.client(Some(directory));
        match client.session_list().await {
            Ok(list) => {
                let now = now_ms();
                workspace.store.mutate(|state| {
                    let pending = state.pending_permission_sessions();
                    state.sessions = trim_sessions(&list, state.session_limit, &pending, now);
                });
                Ok(())
            }
            Err(error) => {
                self.inner.notify(Notice::error(
                    "failed to load more sessions",
                    Some(error.to_string()),
                ));
                Err(error.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // File content
    // -----------------------------------------------------------------------

    /// Load a workspace file through the bounded content cache. `force`
    /// bypasses the already-loaded short-circuit.
    pub async fn file_content(
        &self,
        directory: &Path,
        path: &str,
        force: bool,
    ) -> Result<Option<String>> {
        let workspace = self.child_inert(directory);
        let should_load = workspace.files.lock().begin_load(path, force);
        if !should_load {
            return Ok(workspace.files.lock().content(path));
        }

        match tokio::fs::read_to_string(directory.join(path)).await {
            Ok(content) => {
                workspace
                    .files
                    .lock()
                    .complete_load(path, content.clone());
                Ok(Some(content))
            }
            Err(error) => {
                workspace.files.lock().fail_load(path, error.to_string());
                Err(error.into())
            }
        }
    }

    pub fn file_state(&self, directory: &Path, path: &str) -> FileState {
        match self.inner.registry.get(directory) {
            Some(workspace) => workspace.files.lock().state(path),
            None => FileState::Absent,
        }
    }

    // -----------------------------------------------------------------------
    // Per-session UI state and auxiliary slots
    // -----------------------------------------------------------------------

    /// Mark the session the user is looking at; its view state is protected
    /// from eviction.
    pub fn set_active_session(&self, directory: &Path, session_id: Option<&str>) {
        let workspace = self.child_inert(directory);
        workspace.views.lock().set_active(session_id);
    }

    pub fn view_state(&self, directory: &Path, session_id: &str) -> Option<Value> {
        let workspace = self.inner.registry.get(directory)?;
        let mut views = workspace.views.lock();
        views.get(session_id).map(|slot| slot.data.clone())
    }

    pub fn set_view_state(&self, directory: &Path, session_id: &str, value: Value) {
        let workspace = self.child_inert(directory);
        let mut views = workspace.views.lock();
        views
            .get_or_insert_with(session_id, || Value::Null)
            .data = value;
    }

    pub fn comment_state(&self, directory: &Path, session_id: &str) -> Option<Value> {
        let workspace = self.inner.registry.get(directory)?;
        let mut comments = workspace.comments.lock();
        comments.get(session_id).map(|slot| slot.data.clone())
    }

    pub fn set_comment_state(&self, directory: &Path, session_id: &str, value: Value) {
        let workspace = self.child_inert(directory);
        let mut comments = workspace.comments.lock();
        comments
            .get_or_insert_with(session_id, || Value::Null)
            .data = value;
    }

    // -----------------------------------------------------------------------
    // Terminals
    // -----------------------------------------------------------------------

    pub async fn pty_create(
        &self,
        directory: &Path,
        session_id: &str,
        request: &PtyCreate,
    ) -> Result<Pty> {
        let workspace = self.child_inert(directory);
        let client = self.inner.clients.client(Some(directory));
        let pty = client.pty_create(request).await?;
        let mut terminals = workspace.terminals.lock();
        terminals
            .get_or_insert_with(session_id, Vec::new)
            .data
            .push(pty.clone());
        Ok(pty)
    }

    pub async fn pty_update(
        &self,
        directory: &Path,
        pty_id: &str,
        request: &PtyUpdate,
    ) -> Result<Pty> {
        let workspace = self.child_inert(directory);
        let client = self.inner.clients.client(Some(directory));
        let pty = client.pty_update(pty_id, request).await?;
        let mut terminals = workspace.terminals.lock();
        for (_, slot) in terminals.iter_mut() {
            for entry in slot.data.iter_mut() {
                if entry.id == pty.id {
                    *entry = pty.clone();
                }
            }
        }
        Ok(pty)
    }

    pub async fn pty_remove(&self, directory: &Path, pty_id: &str) -> Result<()> {
        let workspace = self.child_inert(directory);
        let client = self.inner.clients.client(Some(directory));
        client.pty_remove(pty_id).await?;
        remove_terminal(&workspace, pty_id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Tear the engine down: cancel the event listener and dispose every
    /// workspace's sub-caches and scopes. Pending bootstrap results are
    /// discarded by their owners noticing the disposal.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.scope.dispose();
        for workspace in self.inner.registry.all() {
            workspace.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn dispatch_envelope(&self, envelope: EventEnvelope) {
        self.inner.dispatch(envelope);
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> Arc<dyn Bootstrapper> {
        self.inner.clone()
    }
}

impl EngineInner {
    fn notify(&self, notice: Notice) {
        tracing::warn!(notice = %notice.message, context = ?notice.context, "user notice");
        let _ = self.notices.send(notice);
    }

    /// Seed a freshly-allocated workspace from the persisted side-caches.
    /// Done once; after that the live value is authoritative.
    fn seed_workspace(&self, workspace: &Workspace) {
        let directory = workspace.directory.to_string_lossy().into_owned();

        let vcs = self
            .persist
            .get(Some(&directory), VCS_CACHE_KEY, VCS_CACHE_VERSION)
            .and_then(|value| serde_json::from_value::<VcsInfo>(value).ok());
        let project = self
            .persist
            .get(Some(&directory), PROJECT_CACHE_KEY, PROJECT_CACHE_VERSION)
            .and_then(|value| serde_json::from_value::<Project>(value).ok());
        let icon = self
            .persist
            .get(
                Some(&directory),
                PROJECT_ICON_CACHE_KEY,
                PROJECT_ICON_CACHE_VERSION,
            )
            .and_then(|value| serde_json::from_value(value).ok());

        if vcs.is_none() && project.is_none() {
            return;
        }
        workspace.store.mutate(|state| {
            if state.vcs.is_none() {
                state.vcs = vcs;
            }
            if state.project.is_none()
                && let Some(mut project) = project
            {
                if project.icon.is_none() {
                    project.icon = icon;
                }
                state.project = Some(project);
            }
        });
    }

    fn persist_vcs(&self, directory: &Path, info: &VcsInfo) {
        let directory = directory.to_string_lossy().into_owned();
        if let Ok(value) = serde_json::to_value(info) {
            self.persist
                .put(Some(&directory), VCS_CACHE_KEY, VCS_CACHE_VERSION, &value);
        }
    }

    fn persist_project(&self, directory: &Path, project: &Project) {
        let directory = directory.to_string_lossy().into_owned();
        if let Ok(value) = serde_json::to_value(project) {
            self.persist.put(
                Some(&directory),
                PROJECT_CACHE_KEY,
                PROJECT_CACHE_VERSION,
                &value,
            );
        }
        if let Some(icon) = &project.icon
            && let Ok(value) = serde_json::to_value(icon)
        {
            self.persist.put(
                Some(&directory),
                PROJECT_ICON_CACHE_KEY,
                PROJECT_ICON_CACHE_VERSION,
                &value,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Event dispatch — strictly in arrival order, one transaction per event
    // -----------------------------------------------------------------------

    fn dispatch(self: &Arc<Self>, envelope: EventEnvelope) {
        match envelope.directory {
            None => self.dispatch_global(envelope.event),
            Some(directory) => {
                let Some(workspace) = self.registry.get(Path::new(&directory)) else {
                    tracing::debug!(%directory, "event for untracked workspace dropped");
                    return;
                };
                let now = now_ms();
                let effects = workspace
                    .store
                    .mutate(|state| reconcile(state, &envelope.event, now));
                for effect in effects {
                    self.perform(&workspace, effect);
                }
            }
        }
    }

    fn dispatch_global(&self, event: Event) {
        match event {
            Event::ProjectUpdated { info } => {
                self.global.mutate(|state| {
                    upsert_sorted(&mut state.projects, info, |p| &p.id);
                });
            }
            Event::GlobalDisposed | Event::ServerInstanceDisposed => {
                // The remote process restarted; everything must be re-pulled.
                self.scheduler.request_root();
            }
            other => {
                tracing::debug!(?other, "unhandled global event");
            }
        }
    }

    fn perform(self: &Arc<Self>, workspace: &Arc<Workspace>, effect: Effect) {
        match effect {
            Effect::RefreshLsp => {
                let inner = Arc::clone(self);
                let workspace = Arc::clone(workspace);
                tokio::spawn(async move {
                    let client = inner.clients.client(Some(&workspace.directory));
                    match client.lsp_status().await {
                        Ok(lsp) => {
                            workspace.store.mutate(|state| state.lsp = lsp);
                        }
                        Err(error) => tracing::warn!(%error, "lsp refresh failed"),
                    }
                });
            }
            Effect::ScheduleRootRefresh => self.scheduler.request_root(),
            Effect::PersistVcs(info) => self.persist_vcs(&workspace.directory, &info),
            Effect::PersistProject(project) => {
                self.persist_project(&workspace.directory, &project);
            }
            Effect::RemoveTerminal { pty_id } => remove_terminal(workspace, &pty_id),
            Effect::InvalidateFile { path } => workspace.files.lock().invalidate(&path),
        }
    }
}

fn remove_terminal(workspace: &Workspace, pty_id: &str) {
    let mut terminals = workspace.terminals.lock();
    for (_, slot) in terminals.iter_mut() {
        slot.data.retain(|pty| pty.id != pty_id);
    }
}

// ---------------------------------------------------------------------------
// Bootstrap bodies
// ---------------------------------------------------------------------------

#[async_trait]
impl Bootstrapper for EngineInner {
    /// The global bootstrap: project list, config, providers, provider
    /// auth, path. Retry-wrapped; a failure surfaces as a notice and leaves
    /// the previous global state intact.
    async fn bootstrap_root(&self) {
        let client = self.clients.client(None);
        let retry = self.config.retry;

        let result = tokio::try_join!(
            with_retry(retry, || client.project_list()),
            with_retry(retry, || client.config_get()),
            with_retry(retry, || client.provider_list()),
            with_retry(retry, || client.provider_auth()),
            with_retry(retry, || client.path_get()),
        );

        match result {
            Ok((mut projects, config, providers, provider_auth, path)) => {
                projects.sort_by(|a, b| a.id.cmp(&b.id));
                self.global.mutate(|state| {
                    state.projects = projects;
                    state.config = Some(config);
                    state.providers = providers;
                    state.provider_auth = provider_auth;
                    state.path = Some(path);
                });
            }
            Err(error) => {
                self.notify(Notice::error(
                    "failed to refresh global state",
                    Some(error.to_string()),
                ));
            }
        }
    }

    /// One workspace's bootstrap: the blocking phase is all-or-nothing; the
    /// best-effort phase wraps every resource independently and flips the
    /// status to complete once all of them settle.
    async fn bootstrap_workspace(&self, directory: &Path) {
        let (workspace, created) = self.registry.child(directory);
        if created {
            self.seed_workspace(&workspace);
        }
        let client = self.clients.client(Some(directory));
        let retry = self.config.retry;

        let blocking = tokio::try_join!(
            with_retry(retry, || client.project_current()),
            with_retry(retry, || client.provider_list()),
            with_retry(retry, || client.agent_list()),
            with_retry(retry, || client.config_get()),
        );
        let (project, providers, agents, config) = match blocking {
            Ok(values) => values,
            Err(error) => {
                self.notify(Notice::error(
                    format!("failed to load workspace {}", directory.display()),
                    Some(error.to_string()),
                ));
                workspace
                    .store
                    .mutate(|state| state.status = WorkspaceStatus::Partial);
                return;
            }
        };

        self.persist_project(directory, &project);
        workspace.store.mutate(|state| {
            state.project = Some(project);
            state.providers = providers;
            state.agents = agents;
            state.config = Some(config);
        });

        futures::join!(
            best_effort("path", async {
                let path = client.path_get().await?;
                workspace.store.mutate(|state| state.path = Some(path));
                Ok(())
            }),
            best_effort("commands", async {
                let commands = client.command_list().await?;
                workspace.store.mutate(|state| state.commands = commands);
                Ok(())
            }),
            // Permissions and questions land before the session list so the
            // retention pass sees pending approvals.
            best_effort("sessions", self.load_sessions(&client, &workspace)),
            best_effort("session status", async {
                let status = client.session_status().await?;
                workspace.store.mutate(|state| state.session_status = status);
                Ok(())
            }),
            best_effort("mcp", async {
                let mcp = client.mcp_status().await?;
                workspace.store.mutate(|state| state.mcp = mcp);
                Ok(())
            }),
            best_effort("lsp", async {
                let lsp = client.lsp_status().await?;
                workspace.store.mutate(|state| state.lsp = lsp);
                Ok(())
            }),
            best_effort("vcs", async {
                if let Some(vcs) = client.vcs_get().await? {
                    self.persist_vcs(directory, &vcs);
                    workspace.store.mutate(|state| state.vcs = Some(vcs));
                }
                Ok(())
            }),
        );

        workspace
            .store
            .mutate(|state| state.status = WorkspaceStatus::Complete);
    }
}

impl EngineInner {
    async fn load_sessions(
        &self,
        client: &RemoteClient,
        workspace: &Workspace,
    ) -> mira_api::Result<()> {
        let permissions = client.permission_list().await?;
        let questions = client.question_list().await?;
        let sessions = client.session_list().await?;

        let now = now_ms();
        workspace.store.mutate(|state| {
            state.permissions = group_by_session(permissions, |p| p.session_id.clone(), |p| &p.id);
            state.questions = group_by_session(questions, |q| q.session_id.clone(), |q| &q.id);
            let pending = state.pending_permission_sessions();
            state.sessions = trim_sessions(&sessions, state.session_limit, &pending, now);
        });
        Ok(())
    }
}

/// Run one best-effort bootstrap task: a failure is logged and swallowed so
/// sibling resources are unaffected.
async fn best_effort(resource: &str, task: impl Future<Output = mira_api::Result<()>>) {
    if let Err(error) = task.await {
        tracing::warn!(resource, %error, "best-effort bootstrap task failed");
    }
}

fn group_by_session<T>(
    items: Vec<T>,
    session_of: impl Fn(&T) -> String,
    id_of: impl Fn(&T) -> &str,
) -> HashMap<String, Vec<T>> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for item in items {
        let list = grouped.entry(session_of(&item)).or_default();
        upsert_sorted(list, item, &id_of);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mira_api::types::LspStatus;

    use super::*;
    use crate::state::WorkspaceStatus;
    use crate::test_support::{FakeFactory, FakeRemote, session};

    fn engine_with(remote: &Arc<FakeRemote>, persist: Persist) -> Engine {
        let factory = Arc::new(FakeFactory(Arc::clone(remote)));
        let config = EngineConfig {
            retry: RetryPolicy::none(),
            ..EngineConfig::default()
        };
        Engine::new(config, factory, persist)
    }

    fn engine(remote: &Arc<FakeRemote>) -> Engine {
        engine_with(
            remote,
            Persist::new(mira_db::Store::open_in_memory().unwrap()),
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn workspace_bootstrap_reaches_complete() {
        let remote = Arc::new(FakeRemote::default());
        remote.push_session(session("ses_1", None));
        let engine = engine(&remote);
        let directory = Path::new("/w");
        let workspace = engine.child_inert(directory);

        engine.runner().bootstrap_workspace(directory).await;

        let state = workspace.store.snapshot();
        assert_eq!(state.status, WorkspaceStatus::Complete);
        assert_eq!(state.project.unwrap().id, "proj_1");
        assert_eq!(state.sessions.len(), 1);
        assert!(state.config.is_some());
    }

    #[tokio::test]
    async fn blocking_failure_leaves_partial_and_skips_best_effort() {
        let remote = Arc::new(FakeRemote::default());
        remote.fail("project_current");
        let engine = engine(&remote);
        let mut notices = engine.subscribe_notices();
        let directory = Path::new("/w");
        let workspace = engine.child_inert(directory);

        engine.runner().bootstrap_workspace(directory).await;

        assert_eq!(workspace.store.read().status, WorkspaceStatus::Partial);
        // None of the best-effort resources ran this cycle.
        assert_eq!(remote.calls("session_list"), 0);
        assert_eq!(remote.calls("vcs_get"), 0);

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn best_effort_failure_does_not_block_completion() {
        let remote = Arc::new(FakeRemote::default());
        remote.push_session(session("ses_1", None));
        remote.fail("mcp_status");
        let engine = engine(&remote);
        let directory = Path::new("/w");
        let workspace = engine.child_inert(directory);

        engine.runner().bootstrap_workspace(directory).await;

        let state = workspace.store.snapshot();
        assert_eq!(state.status, WorkspaceStatus::Complete);
        // Sibling resources were unaffected by the mcp failure.
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(remote.calls("session_list"), 1);
    }

    #[tokio::test]
    async fn pending_permissions_protect_children_beyond_the_window() {
        let remote = Arc::new(FakeRemote::default());
        // Roots sort a < b; with a base limit of 1 and stale timestamps,
        // only "a" survives on its own.
        remote.push_session(session("a", None));
        remote.push_session(session("b", None));
        remote.push_session(session("b1", Some("b")));
        remote.push_permission(mira_api::types::Permission {
            id: "perm_1".into(),
            session_id: "b1".into(),
            title: None,
            extra: Default::default(),
        });

        let factory = Arc::new(FakeFactory(Arc::clone(&remote)));
        let config = EngineConfig {
            session_limit: 1,
            retry: RetryPolicy::none(),
            ..EngineConfig::default()
        };
        let engine = Engine::new(config, factory, Persist::disabled());
        let directory = Path::new("/w");
        let workspace = engine.child_inert(directory);

        engine.runner().bootstrap_workspace(directory).await;

        let state = workspace.store.snapshot();
        let ids: Vec<&str> = state.sessions.iter().map(|s| s.id.as_str()).collect();
        // "b" fell out of the window, but its blocked child stays visible.
        assert_eq!(ids, ["a", "b1"]);
    }

    #[tokio::test]
    async fn child_triggers_exactly_one_bootstrap() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(&remote);
        let directory = Path::new("/w");

        let workspace = engine.child(directory);
        let again = engine.child(directory);
        assert!(Arc::ptr_eq(&workspace, &again));

        wait_until(|| workspace.store.read().status == WorkspaceStatus::Complete).await;
        assert_eq!(remote.calls("project_current"), 1);
    }

    #[tokio::test]
    async fn vcs_event_persists_and_seeds_the_next_engine() {
        let persist = Persist::new(mira_db::Store::open_in_memory().unwrap());
        let remote = Arc::new(FakeRemote::default());
        let first = engine_with(&remote, persist.clone());
        let directory = Path::new("/w");
        let workspace = first.child_inert(directory);

        first.dispatch_envelope(EventEnvelope {
            directory: Some("/w".into()),
            event: Event::VcsBranchUpdated {
                branch: "feature/caching".into(),
            },
        });
        assert_eq!(
            workspace.store.read().vcs.as_ref().unwrap().branch,
            "feature/caching"
        );

        // A fresh engine over the same persistence seeds the live state
        // from the side-cache before any bootstrap.
        let second = engine_with(&remote, persist);
        let seeded = second.child_inert(directory);
        assert_eq!(
            seeded.store.read().vcs.as_ref().unwrap().branch,
            "feature/caching"
        );
    }

    #[tokio::test]
    async fn events_for_untracked_workspaces_are_dropped() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(&remote);
        engine.dispatch_envelope(EventEnvelope {
            directory: Some("/nowhere".into()),
            event: Event::VcsBranchUpdated {
                branch: "main".into(),
            },
        });
        assert!(engine.workspace(Path::new("/nowhere")).is_none());
    }

    #[tokio::test]
    async fn lsp_update_pulls_fresh_status() {
        let remote = Arc::new(FakeRemote::default());
        remote.lsp.lock().push(LspStatus {
            id: "rust-analyzer".into(),
            root: None,
            status: Some("ready".into()),
        });
        let engine = engine(&remote);
        let directory = Path::new("/w");
        let workspace = engine.child_inert(directory);

        engine.dispatch_envelope(EventEnvelope {
            directory: Some("/w".into()),
            event: Event::LspUpdated,
        });

        wait_until(|| !workspace.store.read().lsp.is_empty()).await;
        assert_eq!(workspace.store.read().lsp[0].id, "rust-analyzer");
    }

    #[tokio::test]
    async fn server_restart_requeues_the_root_refresh() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(&remote);

        engine.dispatch_envelope(EventEnvelope {
            directory: None,
            event: Event::ServerInstanceDisposed,
        });

        wait_until(|| remote.calls("project_list") >= 1).await;
        assert!(!engine.global_store().read().projects.is_empty());
    }

    #[tokio::test]
    async fn update_config_resumes_the_scheduler_and_refreshes_root() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(&remote);

        engine
            .update_config(None, &Config::default())
            .await
            .unwrap();

        assert!(!engine.inner.scheduler.is_paused());
        assert!(engine.global_store().read().config.is_some());
        // Resume re-queued the full root refresh.
        wait_until(|| remote.calls("project_list") >= 1).await;
    }

    #[tokio::test]
    async fn failed_config_write_still_resumes() {
        let remote = Arc::new(FakeRemote::default());
        remote.fail("config_update");
        let engine = engine(&remote);

        let result = engine.update_config(None, &Config::default()).await;
        assert!(result.is_err());
        assert!(!engine.inner.scheduler.is_paused());
    }

    #[tokio::test]
    async fn pty_lifecycle_updates_the_terminal_slot() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(&remote);
        let directory = Path::new("/w");
        let workspace = engine.child_inert(directory);

        let pty = engine
            .pty_create(directory, "ses_1", &PtyCreate::default())
            .await
            .unwrap();
        {
            let mut terminals = workspace.terminals.lock();
            assert_eq!(terminals.get("ses_1").unwrap().data.len(), 1);
        }

        engine.dispatch_envelope(EventEnvelope {
            directory: Some("/w".into()),
            event: Event::PtyExited {
                pty_id: pty.id.clone(),
            },
        });
        let mut terminals = workspace.terminals.lock();
        assert!(terminals.get("ses_1").unwrap().data.is_empty());
    }

    #[tokio::test]
    async fn view_state_round_trips_and_protects_the_active_session() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(&remote);
        let directory = Path::new("/w");

        engine.set_view_state(directory, "ses_1", serde_json::json!({"scroll": 12}));
        engine.set_active_session(directory, Some("ses_1"));
        for i in 0..100 {
            engine.set_view_state(directory, &format!("other_{i}"), Value::Null);
        }

        assert_eq!(
            engine.view_state(directory, "ses_1"),
            Some(serde_json::json!({"scroll": 12}))
        );
        let workspace = engine.workspace(directory).unwrap();
        assert!(workspace.views.lock().len() <= crate::views::VIEW_STATE_LIMIT);
    }

    #[tokio::test]
    async fn dispose_cancels_and_marks_the_engine() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(&remote);
        engine.connect();
        engine.child_inert(Path::new("/w"));

        engine.dispose();
        assert!(engine.is_disposed());
    }
}
