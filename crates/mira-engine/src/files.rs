//! File content cache: dual-bounded LRU over loaded contents.
//!
//! Eviction clears only the heavy payload; metadata (path, name) survives
//! and the resource state returns to absent, so a later access reloads
//! without losing what the UI already knows about the file.

use std::collections::HashMap;

use crate::cache::BoundedCache;

pub const FILE_CACHE_MAX_ENTRIES: usize = 40;
pub const FILE_CACHE_MAX_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileState {
    #[default]
    Absent,
    Loading,
    Loaded,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub path: String,
    pub name: String,
}

#[derive(Debug)]
pub struct FileStore {
    meta: HashMap<String, FileMeta>,
    states: HashMap<String, FileState>,
    contents: BoundedCache<String, String>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::with_budget(FILE_CACHE_MAX_ENTRIES, FILE_CACHE_MAX_BYTES)
    }

    pub fn with_budget(max_entries: usize, max_bytes: u64) -> Self {
        Self {
            meta: HashMap::new(),
            states: HashMap::new(),
            contents: BoundedCache::with_weight_budget(max_entries, max_bytes),
        }
    }

    pub fn state(&self, path: &str) -> FileState {
        self.states.get(path).cloned().unwrap_or_default()
    }

    pub fn meta(&self, path: &str) -> Option<&FileMeta> {
        self.meta.get(path)
    }

    /// Touches recency.
    pub fn content(&mut self, path: &str) -> Option<String> {
        self.contents.get(&path.to_string()).cloned()
    }

    pub fn loaded_count(&self) -> usize {
        self.contents.len()
    }

    pub fn loaded_bytes(&self) -> u64 {
        self.contents.total_weight()
    }

    /// Decide whether a load should start: `absent`/`error` always load,
    /// `loaded` only under `force`, an in-flight load is never doubled.
    /// Transitions the entry to `loading` when it returns true.
    pub fn begin_load(&mut self, path: &str, force: bool) -> bool {
        match self.state(path) {
            FileState::Loading => false,
            FileState::Loaded if !force => {
                self.contents.touch(&path.to_string());
                false
            }
            _ => {
                self.states.insert(path.to_string(), FileState::Loading);
                true
            }
        }
    }

    pub fn complete_load(&mut self, path: &str, content: String) {
        self.meta.insert(path.to_string(), meta_for(path));
        self.states.insert(path.to_string(), FileState::Loaded);
        let weight = content.len() as u64;
        let evicted = self.contents.insert(path.to_string(), content, weight);
        for (victim, _content) in evicted {
            // Payload dropped; meta stays so the entry can be listed and
            // reloaded on demand.
            self.states.insert(victim, FileState::Absent);
        }
    }

    pub fn fail_load(&mut self, path: &str, error: String) {
        self.meta.insert(path.to_string(), meta_for(path));
        self.states.insert(path.to_string(), FileState::Error(error));
        self.contents.remove(&path.to_string());
    }

    /// Watcher invalidation: drop the payload and forget the load state so
    /// the next access refetches.
    pub fn invalidate(&mut self, path: &str) {
        self.states.remove(path);
        self.contents.remove(&path.to_string());
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

fn meta_for(path: &str) -> FileMeta {
    let name = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string();
    FileMeta {
        path: path.to_string(),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_state_machine() {
        let mut files = FileStore::new();
        assert_eq!(files.state("src/main.rs"), FileState::Absent);

        assert!(files.begin_load("src/main.rs", false));
        assert_eq!(files.state("src/main.rs"), FileState::Loading);
        // A concurrent caller must not double the fetch.
        assert!(!files.begin_load("src/main.rs", false));

        files.complete_load("src/main.rs", "fn main() {}".into());
        assert_eq!(files.state("src/main.rs"), FileState::Loaded);
        assert_eq!(files.content("src/main.rs").as_deref(), Some("fn main() {}"));

        // Loaded short-circuits unless forced.
        assert!(!files.begin_load("src/main.rs", false));
        assert!(files.begin_load("src/main.rs", true));
    }

    #[test]
    fn error_state_allows_reload() {
        let mut files = FileStore::new();
        assert!(files.begin_load("a.txt", false));
        files.fail_load("a.txt", "permission denied".into());
        assert_eq!(
            files.state("a.txt"),
            FileState::Error("permission denied".into())
        );
        assert!(files.begin_load("a.txt", false));
    }

    #[test]
    fn eviction_clears_payload_but_keeps_meta() {
        let mut files = FileStore::with_budget(2, 1024);
        for path in ["a.rs", "b.rs", "c.rs"] {
            files.begin_load(path, false);
            files.complete_load(path, "x".repeat(10));
        }

        assert_eq!(files.loaded_count(), 2);
        // "a.rs" was the oldest touch; its payload is gone, its meta is not.
        assert_eq!(files.state("a.rs"), FileState::Absent);
        assert!(files.content("a.rs").is_none());
        assert_eq!(files.meta("a.rs").unwrap().name, "a.rs");
        assert!(files.begin_load("a.rs", false));
    }

    #[test]
    fn byte_budget_bounds_loaded_content() {
        let mut files = FileStore::with_budget(40, 100);
        files.begin_load("big1", false);
        files.complete_load("big1", "x".repeat(80));
        files.begin_load("big2", false);
        files.complete_load("big2", "y".repeat(60));

        assert!(files.loaded_bytes() <= 100);
        assert_eq!(files.state("big1"), FileState::Absent);
        assert_eq!(files.state("big2"), FileState::Loaded);
    }

    #[test]
    fn watcher_invalidation_forces_refetch() {
        let mut files = FileStore::new();
        files.begin_load("watched.rs", false);
        files.complete_load("watched.rs", "old".into());

        files.invalidate("watched.rs");
        assert_eq!(files.state("watched.rs"), FileState::Absent);
        assert!(files.begin_load("watched.rs", false));
    }
}
