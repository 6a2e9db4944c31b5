//! The session retention policy: computes the bounded "keep set" of
//! sessions from an unbounded remote list without hiding anything the user
//! is actively working with.

use std::collections::HashSet;

use mira_api::types::Session;

/// Extra root sessions admitted on recency alone, on top of the base limit.
pub const RECENT_ROOT_LIMIT: usize = 50;
/// How far back "recently updated" reaches.
pub const RECENT_WINDOW_MS: i64 = 4 * 60 * 60 * 1000;

/// Compute the retention window.
///
/// 1. Archived sessions are dropped.
/// 2. The first `limit` root sessions in id order form the base set.
/// 3. Up to [`RECENT_ROOT_LIMIT`] further roots updated within
///    [`RECENT_WINDOW_MS`] join it, most recently updated first (ties by
///    id), selected through a bounded insertion sort that never materializes
///    more than the cap.
/// 4. A child survives when its parent is kept, it has a pending permission,
///    or it was itself updated within the window.
///
/// The result is re-sorted by id.
pub fn trim_sessions(
    all: &[Session],
    limit: usize,
    pending_permissions: &HashSet<String>,
    now_ms: i64,
) -> Vec<Session> {
    let cutoff = now_ms - RECENT_WINDOW_MS;

    let mut roots: Vec<&Session> = Vec::new();
    let mut children: Vec<&Session> = Vec::new();
    for session in all {
        if session.is_archived() {
            continue;
        }
        if session.is_root() {
            roots.push(session);
        } else {
            children.push(session);
        }
    }
    roots.sort_by(|a, b| a.id.cmp(&b.id));
    children.sort_by(|a, b| a.id.cmp(&b.id));

    let base_len = limit.min(roots.len());
    let (base, rest) = roots.split_at(base_len);

    // Bounded selection: keep at most RECENT_ROOT_LIMIT candidates, ordered
    // by most-recently-updated (ties broken by id).
    let mut recent: Vec<&Session> = Vec::new();
    for candidate in rest {
        if candidate.time.updated < cutoff {
            continue;
        }
        let position = recent
            .binary_search_by(|probe| {
                probe
                    .time
                    .updated
                    .cmp(&candidate.time.updated)
                    .reverse()
                    .then_with(|| probe.id.cmp(&candidate.id))
            })
            .unwrap_or_else(|index| index);
        if position < RECENT_ROOT_LIMIT {
            recent.insert(position, candidate);
            recent.truncate(RECENT_ROOT_LIMIT);
        }
    }

    let mut kept: HashSet<&str> = HashSet::new();
    let mut result: Vec<Session> = Vec::new();
    for root in base.iter().chain(recent.iter()) {
        kept.insert(root.id.as_str());
        result.push((*root).clone());
    }

    // Ids are time-ordered, so parents sort before their children; walking
    // children in id order resolves grandchildren in one pass.
    for child in children {
        let parent_kept = child
            .parent_id
            .as_deref()
            .is_some_and(|parent| kept.contains(parent));
        let blocked = pending_permissions.contains(&child.id);
        let fresh = child.time.updated >= cutoff;
        if parent_kept || blocked || fresh {
            kept.insert(child.id.as_str());
            result.push(child.clone());
        }
    }

    result.sort_by(|a, b| a.id.cmp(&b.id));
    result
}

#[cfg(test)]
mod tests {
    use mira_api::types::SessionTime;

    use super::*;

    const NOW: i64 = 1_000_000_000;

    fn session(id: &str, parent: Option<&str>, updated: i64, archived: bool) -> Session {
        Session {
            id: id.into(),
            parent_id: parent.map(Into::into),
            title: None,
            directory: None,
            time: SessionTime {
                created: updated,
                updated,
                archived: archived.then_some(updated),
            },
        }
    }

    fn ids(sessions: &[Session]) -> Vec<&str> {
        sessions.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn keeps_first_limit_roots_in_id_order() {
        let stale = NOW - RECENT_WINDOW_MS - 1;
        let all = vec![
            session("c", None, stale, false),
            session("a", None, stale, false),
            session("b", None, stale, false),
        ];
        let kept = trim_sessions(&all, 2, &HashSet::new(), NOW);
        assert_eq!(ids(&kept), ["a", "b"]);
    }

    #[test]
    fn archived_sessions_are_dropped() {
        let all = vec![
            session("a", None, NOW, true),
            session("b", None, NOW, false),
        ];
        let kept = trim_sessions(&all, 10, &HashSet::new(), NOW);
        assert_eq!(ids(&kept), ["b"]);
    }

    #[test]
    fn recently_updated_roots_join_beyond_the_limit() {
        let stale = NOW - RECENT_WINDOW_MS - 1;
        let all = vec![
            session("a", None, stale, false),
            session("b", None, stale, false),
            session("c", None, NOW - 60_000, false),
        ];
        let kept = trim_sessions(&all, 2, &HashSet::new(), NOW);
        assert_eq!(ids(&kept), ["a", "b", "c"]);
    }

    #[test]
    fn never_returns_more_than_limit_plus_recent_cap_roots() {
        let mut all = Vec::new();
        for i in 0..200 {
            all.push(session(&format!("s{i:03}"), None, NOW - 1, false));
        }
        let limit = 10;
        let kept = trim_sessions(&all, limit, &HashSet::new(), NOW);
        assert!(kept.len() <= limit + RECENT_ROOT_LIMIT);
        assert_eq!(kept.len(), limit + RECENT_ROOT_LIMIT);
    }

    #[test]
    fn recent_selection_prefers_most_recently_updated() {
        let stale = NOW - RECENT_WINDOW_MS - 1;
        let mut all = vec![session("a", None, stale, false)];
        // 60 fresh candidates beyond the base limit of 1; only the 50 most
        // recently updated survive.
        for i in 0..60 {
            all.push(session(&format!("r{i:02}"), None, NOW - i, false));
        }
        let kept = trim_sessions(&all, 1, &HashSet::new(), NOW);
        assert_eq!(kept.len(), 1 + RECENT_ROOT_LIMIT);
        // The least recently updated candidates (r50..r59) lost the bounded
        // selection.
        assert!(!kept.iter().any(|s| s.id == "r59"));
        assert!(kept.iter().any(|s| s.id == "r00"));
    }

    #[test]
    fn child_kept_with_parent() {
        let stale = NOW - RECENT_WINDOW_MS - 1;
        let all = vec![
            session("a", None, stale, false),
            session("a1", Some("a"), stale, false),
        ];
        let kept = trim_sessions(&all, 1, &HashSet::new(), NOW);
        assert_eq!(ids(&kept), ["a", "a1"]);
    }

    #[test]
    fn orphaned_child_needs_permission_or_recency() {
        let stale = NOW - RECENT_WINDOW_MS - 1;
        let all = vec![
            session("a", None, stale, false),
            session("b", None, stale, false),
            // Parent "b" falls outside the base limit of 1.
            session("b1", Some("b"), stale, false),
            session("b2", Some("b"), NOW - 1, false),
            session("b3", Some("b"), stale, false),
        ];
        let mut pending = HashSet::new();
        pending.insert("b3".to_string());

        let kept = trim_sessions(&all, 1, &pending, NOW);
        assert_eq!(ids(&kept), ["a", "b2", "b3"]);

        // Property: every child whose parent is absent is justified by a
        // pending permission or a fresh update.
        let kept_ids: HashSet<&str> = kept.iter().map(|s| s.id.as_str()).collect();
        for child in kept.iter().filter(|s| !s.is_root()) {
            let parent_present = child
                .parent_id
                .as_deref()
                .is_some_and(|p| kept_ids.contains(p));
            assert!(
                parent_present
                    || pending.contains(&child.id)
                    || child.time.updated >= NOW - RECENT_WINDOW_MS
            );
        }
    }

    #[test]
    fn grandchildren_follow_kept_children() {
        let stale = NOW - RECENT_WINDOW_MS - 1;
        let all = vec![
            session("a", None, stale, false),
            session("a1", Some("a"), stale, false),
            session("a2", Some("a1"), stale, false),
        ];
        let kept = trim_sessions(&all, 1, &HashSet::new(), NOW);
        assert_eq!(ids(&kept), ["a", "a1", "a2"]);
    }

    #[test]
    fn result_is_sorted_by_id() {
        let all = vec![
            session("c", None, NOW, false),
            session("a", None, NOW, false),
            session("b", None, NOW, false),
        ];
        let kept = trim_sessions(&all, 3, &HashSet::new(), NOW);
        assert_eq!(ids(&kept), ["a", "b", "c"]);
    }
}
