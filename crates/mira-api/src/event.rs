//! The ordered event stream: every delta the server pushes at connected
//! clients, tagged `{"type": ..., "properties": ...}` on the wire.

use serde::{Deserialize, Serialize};

use crate::types::{
    FileDiff, Message, Part, Permission, Project, Question, Session, SessionStatus, Todo,
};

/// A single event addressed to one workspace (or to the global
/// pseudo-workspace when `directory` is absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(flatten)]
    pub event: Event,
}

/// Remote deltas, in the server's arrival order.
///
/// Unknown event types deserialize to [`Event::Unknown`] so a newer server
/// never breaks the stream; the reconciler ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum Event {
    #[serde(rename = "project.updated", rename_all = "camelCase")]
    ProjectUpdated { info: Project },

    /// The remote process itself restarted; all cached state is suspect.
    #[serde(rename = "global.disposed")]
    GlobalDisposed,

    #[serde(rename = "server.instance.disposed")]
    ServerInstanceDisposed,

    #[serde(rename = "session.created", rename_all = "camelCase")]
    SessionCreated { info: Session },

    #[serde(rename = "session.updated", rename_all = "camelCase")]
    SessionUpdated { info: Session },

    #[serde(rename = "session.deleted", rename_all = "camelCase")]
    SessionDeleted { info: Session },

    #[serde(rename = "session.diff", rename_all = "camelCase")]
    SessionDiff {
        session_id: String,
        diff: Vec<FileDiff>,
    },

    #[serde(rename = "session.status", rename_all = "camelCase")]
    SessionStatusUpdated {
        session_id: String,
        status: Option<SessionStatus>,
    },

    #[serde(rename = "todo.updated", rename_all = "camelCase")]
    TodoUpdated {
        session_id: String,
        todos: Vec<Todo>,
    },

    #[serde(rename = "message.updated", rename_all = "camelCase")]
    MessageUpdated { info: Message },

    #[serde(rename = "message.removed", rename_all = "camelCase")]
    MessageRemoved {
        session_id: String,
        message_id: String,
    },

    #[serde(rename = "message.part.updated", rename_all = "camelCase")]
    MessagePartUpdated { part: Part },

    #[serde(rename = "message.part.removed", rename_all = "camelCase")]
    MessagePartRemoved {
        session_id: String,
        message_id: String,
        part_id: String,
    },

    #[serde(rename = "vcs.branch.updated", rename_all = "camelCase")]
    VcsBranchUpdated { branch: String },

    #[serde(rename = "permission.asked", rename_all = "camelCase")]
    PermissionAsked { info: Permission },

    #[serde(rename = "permission.replied", rename_all = "camelCase")]
    PermissionReplied {
        session_id: String,
        permission_id: String,
    },

    #[serde(rename = "question.asked", rename_all = "camelCase")]
    QuestionAsked { info: Question },

    #[serde(rename = "question.replied", rename_all = "camelCase")]
    QuestionReplied {
        session_id: String,
        question_id: String,
    },

    #[serde(rename = "question.rejected", rename_all = "camelCase")]
    QuestionRejected {
        session_id: String,
        question_id: String,
    },

    /// Carries no payload: the client must pull the fresh status itself.
    #[serde(rename = "lsp.updated")]
    LspUpdated,

    #[serde(rename = "pty.exited", rename_all = "camelCase")]
    PtyExited { pty_id: String },

    #[serde(rename = "file.watcher.updated", rename_all = "camelCase")]
    FileWatcherUpdated { file: String, event: String },

    #[serde(other)]
    Unknown,
}
