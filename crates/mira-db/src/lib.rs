mod database;
pub mod error;
pub mod kv;
mod migration;
pub mod store;

pub use error::{Error, Result};
pub use kv::{Kv, KvScope};
pub use store::Store;
