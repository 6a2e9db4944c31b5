//! The per-workspace state tree and the global (cross-workspace) slice.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use mira_api::types::{
    AgentInfo, CommandInfo, Config, FileDiff, LspStatus, McpStatus, Message, Part, PathInfo,
    Permission, Project, ProviderList, Question, Session, SessionStatus, Todo, VcsInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceStatus {
    /// Allocated, nothing fetched yet.
    #[default]
    Loading,
    /// A blocking bootstrap request failed; previously-loaded data stays
    /// visible.
    Partial,
    /// Every best-effort bootstrap task has settled.
    Complete,
}

/// One tracked project directory's mutable state. All sorted collections
/// are kept ordered by id ascending; mutation goes through the reconciler
/// or bootstrap handlers, inside a single store transaction each.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    pub status: WorkspaceStatus,
    pub project: Option<Project>,
    pub config: Option<Config>,
    pub providers: ProviderList,
    pub agents: Vec<AgentInfo>,
    pub commands: Vec<CommandInfo>,
    pub path: Option<PathInfo>,
    pub vcs: Option<VcsInfo>,

    /// The retention window: the bounded, activity-aware subset of the
    /// remote session list, sorted by id.
    pub sessions: Vec<Session>,
    /// How many root sessions the retention window keeps ("load more"
    /// raises it).
    pub session_limit: usize,

    /// Per-session, sorted by id.
    pub messages: HashMap<String, Vec<Message>>,
    /// Per-message, sorted by id.
    pub parts: HashMap<String, Vec<Part>>,
    /// Per-session pending approvals, sorted by id.
    pub permissions: HashMap<String, Vec<Permission>>,
    pub questions: HashMap<String, Vec<Question>>,

    pub diffs: HashMap<String, Vec<FileDiff>>,
    pub todos: HashMap<String, Vec<Todo>>,
    pub session_status: HashMap<String, SessionStatus>,

    pub mcp: HashMap<String, McpStatus>,
    pub lsp: Vec<LspStatus>,
}

impl WorkspaceState {
    pub fn with_session_limit(session_limit: usize) -> Self {
        Self {
            session_limit,
            ..Self::default()
        }
    }

    /// Session ids with at least one pending permission request. The
    /// retention policy uses this to protect actively-blocked children.
    pub fn pending_permission_sessions(&self) -> HashSet<String> {
        self.permissions
            .iter()
            .filter(|(_, pending)| !pending.is_empty())
            .map(|(session_id, _)| session_id.clone())
            .collect()
    }

    /// Drop every slice owned by a session: its messages and their parts,
    /// diff, todos, permissions, questions, and status. Callers wrap this in
    /// one store transaction so observers never see a half-cleaned state.
    pub fn purge_session_slices(&mut self, session_id: &str) {
        if let Some(messages) = self.messages.remove(session_id) {
            for message in &messages {
                self.parts.remove(&message.id);
            }
        }
        self.diffs.remove(session_id);
        self.todos.remove(session_id);
        self.permissions.remove(session_id);
        self.questions.remove(session_id);
        self.session_status.remove(session_id);
    }
}

/// Cross-workspace state refreshed by the root bootstrap.
#[derive(Debug, Clone, Default)]
pub struct GlobalState {
    pub projects: Vec<Project>,
    pub config: Option<Config>,
    pub providers: ProviderList,
    pub provider_auth: HashMap<String, serde_json::Value>,
    pub path: Option<PathInfo>,
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
