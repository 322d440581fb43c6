//////////////////////////
// store.rs
//////////////////////////

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::session::SessionRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no record for {0}")]
    NotFound(String),
    #[error("a record for {0} already exists")]
    Conflict(String),
    #[error("read for {id} failed: {reason}")]
    ReadFailed { id: String, reason: String },
    #[error("write for {id} failed: {reason}")]
    WriteFailed { id: String, reason: String },
    #[error("stale write for {id}: stored version {stored}, offered {offered}")]
    VersionMismatch { id: String, stored: u64, offered: u64 },
}

/// Persistence behind the game service, keyed by game id text.
///
/// Implementations must give read-your-writes for a single id. `put` only
/// accepts a record whose version is exactly one past the stored one.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Result<SessionRecord, StoreError>;
    fn put(&self, id: &str, record: SessionRecord) -> Result<(), StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
    fn create(&self, id: &str, record: SessionRecord) -> Result<(), StoreError>;
}

/// Process-local store; everything is lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Overwrites a record with no version check. For seeding and repair.
    pub fn insert_raw(&self, id: &str, record: SessionRecord) {
        self.records().insert(id.to_string(), record);
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, SessionRecord>> {
        // A panic while holding the lock cannot leave a half-written record behind.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, id: &str) -> Result<SessionRecord, StoreError> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put(&self, id: &str, record: SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records();
        let stored = records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .metadata
            .version;
        let offered = record.metadata.version;
        if offered != stored + 1 {
            return Err(StoreError::VersionMismatch {
                id: id.to_string(),
                stored,
                offered,
            });
        }
        records.insert(id.to_string(), record);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.records()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn create(&self, id: &str, record: SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records();
        if records.contains_key(id) {
            return Err(StoreError::Conflict(id.to_string()));
        }
        records.insert(id.to_string(), record);
        Ok(())
    }
}
