use std::path::Path;

use crate::database::Database;
use crate::error::Result;
use crate::kv::Kv;

pub struct Store {
    db: Database,
    ready: bool,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            db: Database::open(path.as_ref())?,
            ready: true,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
            ready: true,
        })
    }

    /// Hydration gate: true once the store is open and migrated.
    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn kv(&mut self) -> Kv<'_> {
        Kv { db: &mut self.db }
    }
}
