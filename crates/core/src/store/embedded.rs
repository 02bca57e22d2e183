//! Sled embedded database backend.
//!
//! Sled takes an exclusive lock on its directory, so this backend serves
//! contexts within one process only. Use [`super::FileBackend`] when several
//! processes share a conversation.

use super::KvBackend;
use crate::error::{Error, Result};
use sled::Db;
use std::path::Path;

/// Sled-based persistent storage.
pub struct SledBackend {
    db: Db,
}

impl SledBackend {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("failed to open store database: {}", e)))?;

        Ok(Self { db })
    }

    /// Open a throwaway database that is removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| Error::Storage(format!("failed to open temporary database: {}", e)))?;

        Ok(Self { db })
    }
}

impl KvBackend for SledBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db.remove(key.as_bytes())?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sled"
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
