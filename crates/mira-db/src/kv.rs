//! Scoped key/value storage.
//!
//! Three scopes: global, per-workspace (keyed by directory), and
//! per-(workspace, session). Values are JSON. Keys can be versioned
//! (`"vcs.v2"`); reads fall back through older versions down to the bare
//! legacy key so data written by earlier releases migrates transparently.

use rusqlite::{OptionalExtension, params};
use serde_json::Value;

use crate::database::Database;
use crate::error::Result;

/// Which table a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvScope<'a> {
    Global,
    Workspace { directory: &'a str },
    Session {
        directory: &'a str,
        session_id: &'a str,
    },
}

pub struct Kv<'db> {
    pub(crate) db: &'db mut Database,
}

impl Kv<'_> {
    pub fn get(&self, scope: KvScope<'_>, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = match scope {
            KvScope::Global => self
                .db
                .conn
                .query_row(
                    "SELECT value FROM kv_global WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?,
            KvScope::Workspace { directory } => self
                .db
                .conn
                .query_row(
                    "SELECT value FROM kv_workspace WHERE directory = ?1 AND key = ?2",
                    params![directory, key],
                    |row| row.get(0),
                )
                .optional()?,
            KvScope::Session {
                directory,
                session_id,
            } => self
                .db
                .conn
                .query_row(
                    "SELECT value FROM kv_session
                     WHERE directory = ?1 AND session_id = ?2 AND key = ?3",
                    params![directory, session_id, key],
                    |row| row.get(0),
                )
                .optional()?,
        };

        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    pub fn set(&mut self, scope: KvScope<'_>, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        match scope {
            KvScope::Global => {
                self.db.conn.execute(
                    "INSERT INTO kv_global (key, value) VALUES (?1, ?2)
                     ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                    params![key, raw],
                )?;
            }
            KvScope::Workspace { directory } => {
                self.db.conn.execute(
                    "INSERT INTO kv_workspace (directory, key, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT (directory, key) DO UPDATE SET value = excluded.value",
                    params![directory, key, raw],
                )?;
            }
            KvScope::Session {
                directory,
                session_id,
            } => {
                self.db.conn.execute(
                    "INSERT INTO kv_session (directory, session_id, key, value)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (directory, session_id, key) DO UPDATE SET value = excluded.value",
                    params![directory, session_id, key, raw],
                )?;
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, scope: KvScope<'_>, key: &str) -> Result<()> {
        match scope {
            KvScope::Global => {
                self.db
                    .conn
                    .execute("DELETE FROM kv_global WHERE key = ?1", params![key])?;
            }
            KvScope::Workspace { directory } => {
                self.db.conn.execute(
                    "DELETE FROM kv_workspace WHERE directory = ?1 AND key = ?2",
                    params![directory, key],
                )?;
            }
            KvScope::Session {
                directory,
                session_id,
            } => {
                self.db.conn.execute(
                    "DELETE FROM kv_session
                     WHERE directory = ?1 AND session_id = ?2 AND key = ?3",
                    params![directory, session_id, key],
                )?;
            }
        }
        Ok(())
    }

    /// Purge every key stored for a session. Used when a session leaves the
    /// retention window or is deleted.
    pub fn remove_session(&mut self, directory: &str, session_id: &str) -> Result<()> {
        self.db.conn.execute(
            "DELETE FROM kv_session WHERE directory = ?1 AND session_id = ?2",
            params![directory, session_id],
        )?;
        Ok(())
    }

    /// Read `"{base}.v{version}"`, falling back through older versions and
    /// finally the bare legacy key.
    pub fn get_versioned(
        &self,
        scope: KvScope<'_>,
        base: &str,
        version: u32,
    ) -> Result<Option<Value>> {
        for candidate in (1..=version).rev() {
            if let Some(value) = self.get(scope, &format!("{base}.v{candidate}"))? {
                return Ok(Some(value));
            }
        }
        self.get(scope, base)
    }

    /// Write to the current versioned key.
    pub fn set_versioned(
        &mut self,
        scope: KvScope<'_>,
        base: &str,
        version: u32,
        value: &Value,
    ) -> Result<()> {
        self.set(scope, &format!("{base}.v{version}"), value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::Store;

    #[test]
    fn scopes_are_isolated() {
        let mut store = Store::open_in_memory().unwrap();
        let mut kv = store.kv();

        kv.set(KvScope::Global, "branch", &json!("main")).unwrap();
        kv.set(
            KvScope::Workspace { directory: "/a" },
            "branch",
            &json!("feature"),
        )
        .unwrap();

        assert_eq!(
            kv.get(KvScope::Global, "branch").unwrap(),
            Some(json!("main"))
        );
        assert_eq!(
            kv.get(KvScope::Workspace { directory: "/a" }, "branch")
                .unwrap(),
            Some(json!("feature"))
        );
        assert_eq!(
            kv.get(KvScope::Workspace { directory: "/b" }, "branch")
                .unwrap(),
            None
        );
    }

    #[test]
    fn versioned_reads_fall_back_to_legacy_keys() {
        let mut store = Store::open_in_memory().unwrap();
        let mut kv = store.kv();
        let scope = KvScope::Workspace { directory: "/a" };

        kv.set(scope, "vcs", &json!({"branch": "legacy"})).unwrap();
        assert_eq!(
            kv.get_versioned(scope, "vcs", 2).unwrap(),
            Some(json!({"branch": "legacy"}))
        );

        kv.set_versioned(scope, "vcs", 2, &json!({"branch": "current"}))
            .unwrap();
        assert_eq!(
            kv.get_versioned(scope, "vcs", 2).unwrap(),
            Some(json!({"branch": "current"}))
        );
    }

    #[test]
    fn remove_session_purges_all_session_keys() {
        let mut store = Store::open_in_memory().unwrap();
        let mut kv = store.kv();
        let scope = KvScope::Session {
            directory: "/a",
            session_id: "ses_1",
        };

        kv.set(scope, "view", &json!({"scroll": 10})).unwrap();
        kv.set(scope, "draft", &json!("hello")).unwrap();
        kv.remove_session("/a", "ses_1").unwrap();

        assert_eq!(kv.get(scope, "view").unwrap(), None);
        assert_eq!(kv.get(scope, "draft").unwrap(), None);
    }
}
