//! Scripted in-memory remote used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mira_api::error::{Error, Result};
use mira_api::types::{
    AgentInfo, CommandInfo, Config, FileDiff, LspStatus, McpStatus, Message, MessageTime,
    MessageWithParts, PathInfo, Permission, Project, ProviderList, Pty, PtyCreate, PtyUpdate,
    Question, Role, Session, SessionStatus, SessionTime, SessionUpdate, Todo, VcsInfo,
};
use mira_api::{ClientBackend, ClientFactory, EventStream, RemoteClient};
use parking_lot::Mutex;

#[derive(Default)]
pub(crate) struct FakeRemote {
    pub sessions: Mutex<Vec<Session>>,
    pub history: Mutex<HashMap<String, Vec<MessageWithParts>>>,
    pub permissions: Mutex<Vec<Permission>>,
    pub questions: Mutex<Vec<Question>>,
    pub vcs: Mutex<Option<VcsInfo>>,
    pub lsp: Mutex<Vec<LspStatus>>,
    failing: Mutex<HashSet<String>>,
    call_log: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn push_session(&self, session: Session) {
        self.sessions.lock().push(session);
    }

    pub fn push_message(&self, session_id: &str, message: MessageWithParts) {
        self.history
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn push_permission(&self, permission: Permission) {
        self.permissions.lock().push(permission);
    }

    /// Make the named endpoint fail until healed.
    pub fn fail(&self, endpoint: &str) {
        self.failing.lock().insert(endpoint.to_string());
    }

    pub fn heal(&self, endpoint: &str) {
        self.failing.lock().remove(endpoint);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.call_log
            .lock()
            .iter()
            .filter(|name| name.as_str() == endpoint)
            .count()
    }

    fn record(&self, endpoint: &str) -> Result<()> {
        self.call_log.lock().push(endpoint.to_string());
        if self.failing.lock().contains(endpoint) {
            return Err(Error::Other(format!("{endpoint} scripted to fail")));
        }
        Ok(())
    }
}

pub(crate) fn session(id: &str, parent: Option<&str>) -> Session {
    Session {
        id: id.into(),
        parent_id: parent.map(Into::into),
        title: None,
        directory: None,
        time: SessionTime {
            created: 1,
            updated: 1,
            archived: None,
        },
    }
}

pub(crate) fn message_with_parts(session_id: &str, id: &str, parts: usize) -> MessageWithParts {
    MessageWithParts {
        info: Message {
            id: id.into(),
            session_id: session_id.into(),
            role: Role::Assistant,
            time: MessageTime {
                created: 1,
                completed: None,
            },
        },
        parts: (0..parts)
            .map(|i| mira_api::types::Part {
                id: format!("{id}_p{i}"),
                message_id: id.into(),
                session_id: session_id.into(),
                kind: "text".into(),
                text: Some("hello".into()),
                extra: Default::default(),
            })
            .collect(),
    }
}

pub(crate) fn fake_client(remote: &Arc<FakeRemote>) -> RemoteClient {
    RemoteClient::new(FakeBackend(Arc::clone(remote)))
}

pub(crate) struct FakeFactory(pub Arc<FakeRemote>);

impl ClientFactory for FakeFactory {
    fn client(&self, _directory: Option<&Path>) -> RemoteClient {
        fake_client(&self.0)
    }
}

struct FakeBackend(Arc<FakeRemote>);

#[async_trait]
impl ClientBackend for FakeBackend {
    async fn project_list(&self) -> Result<Vec<Project>> {
        self.0.record("project_list")?;
        Ok(vec![self.project()])
    }

    async fn project_current(&self) -> Result<Project> {
        self.0.record("project_current")?;
        Ok(self.project())
    }

    async fn project_update(&self, project: &Project) -> Result<Project> {
        self.0.record("project_update")?;
        Ok(project.clone())
    }

    async fn provider_list(&self) -> Result<ProviderList> {
        self.0.record("provider_list")?;
        Ok(ProviderList::default())
    }

    async fn provider_auth(&self) -> Result<HashMap<String, serde_json::Value>> {
        self.0.record("provider_auth")?;
        Ok(HashMap::new())
    }

    async fn config_get(&self) -> Result<Config> {
        self.0.record("config_get")?;
        Ok(Config::default())
    }

    async fn config_update(&self, config: &Config) -> Result<Config> {
        self.0.record("config_update")?;
        Ok(config.clone())
    }

    async fn path_get(&self) -> Result<PathInfo> {
        self.0.record("path_get")?;
        Ok(PathInfo::default())
    }

    async fn command_list(&self) -> Result<Vec<CommandInfo>> {
        self.0.record("command_list")?;
        Ok(Vec::new())
    }

    async fn agent_list(&self) -> Result<Vec<AgentInfo>> {
        self.0.record("agent_list")?;
        Ok(Vec::new())
    }

    async fn session_list(&self) -> Result<Vec<Session>> {
        self.0.record("session_list")?;
        Ok(self.0.sessions.lock().clone())
    }

    async fn session_get(&self, session_id: &str) -> Result<Session> {
        self.0.record("session_get")?;
        self.0
            .sessions
            .lock()
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no session {session_id}")))
    }

    async fn session_update(&self, session_id: &str, _update: &SessionUpdate) -> Result<Session> {
        self.0.record("session_update")?;
        self.session_get(session_id).await
    }

    async fn session_messages(
        &self,
        session_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<MessageWithParts>> {
        self.0.record("session_messages")?;
        let history = self.0.history.lock();
        let all = history.get(session_id).cloned().unwrap_or_default();
        let eligible: Vec<MessageWithParts> = all
            .into_iter()
            .filter(|m| before.is_none_or(|cursor| m.info.id.as_str() < cursor))
            .collect();
        let start = eligible.len().saturating_sub(limit);
        Ok(eligible[start..].to_vec())
    }

    async fn session_diff(&self, _session_id: &str) -> Result<Vec<FileDiff>> {
        self.0.record("session_diff")?;
        Ok(Vec::new())
    }

    async fn session_todo(&self, _session_id: &str) -> Result<Vec<Todo>> {
        self.0.record("session_todo")?;
        Ok(Vec::new())
    }

    async fn session_status(&self) -> Result<HashMap<String, SessionStatus>> {
        self.0.record("session_status")?;
        Ok(HashMap::new())
    }

    async fn mcp_status(&self) -> Result<HashMap<String, McpStatus>> {
        self.0.record("mcp_status")?;
        Ok(HashMap::new())
    }

    async fn lsp_status(&self) -> Result<Vec<LspStatus>> {
        self.0.record("lsp_status")?;
        Ok(self.0.lsp.lock().clone())
    }

    async fn vcs_get(&self) -> Result<Option<VcsInfo>> {
        self.0.record("vcs_get")?;
        Ok(self.0.vcs.lock().clone())
    }

    async fn permission_list(&self) -> Result<Vec<Permission>> {
        self.0.record("permission_list")?;
        Ok(self.0.permissions.lock().clone())
    }

    async fn question_list(&self) -> Result<Vec<Question>> {
        self.0.record("question_list")?;
        Ok(self.0.questions.lock().clone())
    }

    async fn pty_create(&self, request: &PtyCreate) -> Result<Pty> {
        self.0.record("pty_create")?;
        Ok(Pty {
            id: format!("pty_{}", self.0.calls("pty_create")),
            title: request.title.clone(),
            command: request.command.clone(),
        })
    }

    async fn pty_update(&self, pty_id: &str, request: &PtyUpdate) -> Result<Pty> {
        self.0.record("pty_update")?;
        Ok(Pty {
            id: pty_id.into(),
            title: request.title.clone(),
            command: None,
        })
    }

    async fn pty_remove(&self, _pty_id: &str) -> Result<()> {
        self.0.record("pty_remove")?;
        Ok(())
    }

    fn events(&self) -> EventStream {
        Box::pin(futures::stream::pending())
    }
}

impl FakeBackend {
    fn project(&self) -> Project {
        Project {
            id: "proj_1".into(),
            worktree: None,
            name: Some("fixture".into()),
            icon: None,
        }
    }
}
