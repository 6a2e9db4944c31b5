//! The event reconciler: applies one remote delta to a workspace state
//! tree.
//!
//! `reconcile` is pure over the state. The dispatcher wraps each call in a
//! single store transaction, so everything an event touches (including a
//! cascading session delete) lands as one observable transition. Anything
//! that needs I/O afterwards comes back as an [`Effect`] for the engine to
//! perform.

use mira_api::event::Event;
use mira_api::types::{Project, VcsInfo};

use crate::merge::{remove_sorted, upsert_sorted};
use crate::retention::trim_sessions;
use crate::state::WorkspaceState;

/// Follow-up work an event demands beyond the state mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// `lsp.updated` carries no payload; pull the fresh status.
    RefreshLsp,
    /// The remote process restarted (or the global scope was dropped).
    ScheduleRootRefresh,
    /// Write the updated branch to the persisted VCS side-cache.
    PersistVcs(VcsInfo),
    /// Write the updated project metadata to the persisted side-cache.
    PersistProject(Project),
    RemoveTerminal { pty_id: String },
    InvalidateFile { path: String },
}

pub fn reconcile(state: &mut WorkspaceState, event: &Event, now_ms: i64) -> Vec<Effect> {
    let mut effects = Vec::new();

    match event {
        Event::ProjectUpdated { info } => {
            state.project = Some(info.clone());
            effects.push(Effect::PersistProject(info.clone()));
        }

        Event::GlobalDisposed | Event::ServerInstanceDisposed => {
            effects.push(Effect::ScheduleRootRefresh);
        }

        Event::SessionCreated { info } | Event::SessionUpdated { info } => {
            if info.is_archived() {
                // Archival removes the session from the retention window and
                // purges everything cached for it.
                remove_sorted(&mut state.sessions, &info.id, |s| &s.id);
                state.purge_session_slices(&info.id);
            } else {
                upsert_sorted(&mut state.sessions, info.clone(), |s| &s.id);
                let pending = state.pending_permission_sessions();
                state.sessions =
                    trim_sessions(&state.sessions, state.session_limit, &pending, now_ms);
            }
        }

        Event::SessionDeleted { info } => {
            remove_sorted(&mut state.sessions, &info.id, |s| &s.id);
            state.purge_session_slices(&info.id);
        }

        Event::SessionDiff { session_id, diff } => {
            state.diffs.insert(session_id.clone(), diff.clone());
        }

        Event::SessionStatusUpdated { session_id, status } => match status {
            Some(status) => {
                state
                    .session_status
                    .insert(session_id.clone(), status.clone());
            }
            None => {
                state.session_status.remove(session_id);
            }
        },

        Event::TodoUpdated { session_id, todos } => {
            state.todos.insert(session_id.clone(), todos.clone());
        }

        Event::MessageUpdated { info } => {
            let messages = state.messages.entry(info.session_id.clone()).or_default();
            upsert_sorted(messages, info.clone(), |m| &m.id);
        }

        Event::MessageRemoved {
            session_id,
            message_id,
        } => {
            if let Some(messages) = state.messages.get_mut(session_id) {
                remove_sorted(messages, message_id, |m| &m.id);
            }
            state.parts.remove(message_id);
        }

        Event::MessagePartUpdated { part } => {
            let parts = state.parts.entry(part.message_id.clone()).or_default();
            upsert_sorted(parts, part.clone(), |p| &p.id);
        }

        Event::MessagePartRemoved {
            message_id,
            part_id,
            ..
        } => {
            if let Some(parts) = state.parts.get_mut(message_id) {
                remove_sorted(parts, part_id, |p| &p.id);
            }
        }

        Event::VcsBranchUpdated { branch } => {
            let info = VcsInfo {
                branch: branch.clone(),
            };
            state.vcs = Some(info.clone());
            effects.push(Effect::PersistVcs(info));
        }

        Event::PermissionAsked { info } => {
            let pending = state.permissions.entry(info.session_id.clone()).or_default();
            upsert_sorted(pending, info.clone(), |p| &p.id);
        }

        Event::PermissionReplied {
            session_id,
            permission_id,
        } => {
            if let Some(pending) = state.permissions.get_mut(session_id) {
                remove_sorted(pending, permission_id, |p| &p.id);
            }
        }

        Event::QuestionAsked { info } => {
            let pending = state.questions.entry(info.session_id.clone()).or_default();
            upsert_sorted(pending, info.clone(), |q| &q.id);
        }

        Event::QuestionReplied {
            session_id,
            question_id,
        }
        | Event::QuestionRejected {
            session_id,
            question_id,
        } => {
            if let Some(pending) = state.questions.get_mut(session_id) {
                remove_sorted(pending, question_id, |q| &q.id);
            }
        }

        Event::LspUpdated => {
            effects.push(Effect::RefreshLsp);
        }

        Event::PtyExited { pty_id } => {
            effects.push(Effect::RemoveTerminal {
                pty_id: pty_id.clone(),
            });
        }

        Event::FileWatcherUpdated { file, .. } => {
            effects.push(Effect::InvalidateFile { path: file.clone() });
        }

        Event::Unknown => {}
    }

    effects
}
