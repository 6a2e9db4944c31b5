//! The client seam between the sync engine and the remote service.
//!
//! [`RemoteClient`] wraps a [`ClientBackend`] behind an `Arc<dyn ...>` so the
//! engine never needs generic parameters; the HTTP implementation and test
//! fakes are interchangeable.

use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::event::EventEnvelope;
use crate::types::{
    AgentInfo, CommandInfo, Config, FileDiff, LspStatus, McpStatus, MessageWithParts, PathInfo,
    Permission, Project, ProviderList, Pty, PtyCreate, PtyUpdate, Question, Session, SessionStatus,
    SessionUpdate, Todo, VcsInfo,
};

/// The ordered event stream for the directory a client is scoped to.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Trait that remote transport crates implement.
///
/// Every client is scoped to one workspace directory at construction (or to
/// none, for the global surface); implementations attach that scope to every
/// request themselves.
#[async_trait]
pub trait ClientBackend: Send + Sync {
    async fn project_list(&self) -> Result<Vec<Project>>;
    async fn project_current(&self) -> Result<Project>;
    async fn project_update(&self, project: &Project) -> Result<Project>;

    async fn provider_list(&self) -> Result<ProviderList>;
    async fn provider_auth(&self) -> Result<HashMap<String, serde_json::Value>>;

    async fn config_get(&self) -> Result<Config>;
    async fn config_update(&self, config: &Config) -> Result<Config>;

    async fn path_get(&self) -> Result<PathInfo>;
    async fn command_list(&self) -> Result<Vec<CommandInfo>>;
    async fn agent_list(&self) -> Result<Vec<AgentInfo>>;

    async fn session_list(&self) -> Result<Vec<Session>>;
    async fn session_get(&self, session_id: &str) -> Result<Session>;
    async fn session_update(&self, session_id: &str, update: &SessionUpdate) -> Result<Session>;
    /// Most recent `limit` messages older than `before` (all-time newest
    /// when `before` is `None`), ascending by id.
    async fn session_messages(
        &self,
        session_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<MessageWithParts>>;
    async fn session_diff(&self, session_id: &str) -> Result<Vec<FileDiff>>;
    async fn session_todo(&self, session_id: &str) -> Result<Vec<Todo>>;
    async fn session_status(&self) -> Result<HashMap<String, SessionStatus>>;

    async fn mcp_status(&self) -> Result<HashMap<String, McpStatus>>;
    async fn lsp_status(&self) -> Result<Vec<LspStatus>>;
    async fn vcs_get(&self) -> Result<Option<VcsInfo>>;

    async fn permission_list(&self) -> Result<Vec<Permission>>;
    async fn question_list(&self) -> Result<Vec<Question>>;

    async fn pty_create(&self, request: &PtyCreate) -> Result<Pty>;
    async fn pty_update(&self, pty_id: &str, request: &PtyUpdate) -> Result<Pty>;
    async fn pty_remove(&self, pty_id: &str) -> Result<()>;

    /// Subscribe to the ordered event stream.
    fn events(&self) -> EventStream;
}

/// A concrete, type-erased remote client. Cheap to clone; clones share the
/// underlying transport.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<dyn ClientBackend>,
}

impl RemoteClient {
    /// Wrap any backend implementation into a client.
    pub fn new(backend: impl ClientBackend + 'static) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }
}

impl std::ops::Deref for RemoteClient {
    type Target = dyn ClientBackend;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

/// Produces and caches one [`RemoteClient`] per workspace directory.
///
/// `None` yields the unscoped client used for the global (cross-workspace)
/// surface. Repeated calls for the same directory return the same client.
pub trait ClientFactory: Send + Sync {
    fn client(&self, directory: Option<&Path>) -> RemoteClient;
}
