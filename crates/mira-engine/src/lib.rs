//! Client-side incremental synchronization and bounded caching for
//! per-workspace session state.
//!
//! The [`Engine`] keeps a local mirror of a remote service's per-workspace
//! session/message state fresh, consistent, and memory-bounded: a lazy
//! multi-workspace registry, a concurrency-capped bootstrap scheduler, an
//! ordered event reconciler over sorted collections, an activity-aware
//! session retention window, chunked message pagination with optimistic
//! local writes, and a generic LRU-with-byte-budget cache reused across
//! file content and per-session UI state.

pub mod bootstrap;
pub mod cache;
pub mod engine;
pub mod error;
pub mod files;
pub mod merge;
pub mod pagination;
pub mod reconcile;
pub mod registry;
pub mod retention;
pub mod scope;
pub mod state;
pub mod store;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support;

pub use bootstrap::{BOOTSTRAP_CONCURRENCY, BootstrapScheduler, Bootstrapper, yield_to_scheduler};
pub use cache::BoundedCache;
pub use engine::{
    DEFAULT_SESSION_LIMIT, Engine, EngineConfig, Notice, NoticeLevel, Persist,
    SESSION_LIMIT_STEP,
};
pub use error::{Error, Result};
pub use files::{FILE_CACHE_MAX_BYTES, FILE_CACHE_MAX_ENTRIES, FileMeta, FileState, FileStore};
pub use merge::{find_sorted, remove_sorted, upsert_sorted};
pub use pagination::{HistoryWindow, MESSAGE_CHUNK, MessagePager};
pub use reconcile::{Effect, reconcile};
pub use registry::{InstanceRegistry, Workspace};
pub use retention::{RECENT_ROOT_LIMIT, RECENT_WINDOW_MS, trim_sessions};
pub use scope::Scope;
pub use state::{GlobalState, WorkspaceState, WorkspaceStatus};
pub use store::Store;
pub use views::{SESSION_SLOT_LIMIT, SessionSlot, SlotCache, VIEW_STATE_LIMIT};
