//! Persistence collaborator: append-only log plus content-addressed store

use crate::hash::content_hash;
use crate::types::{LogEntry, RecordKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no content stored under hash {0}")]
    NotFound(String),

    #[error("content does not match hash {0}")]
    HashMismatch(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("content stored under {hash} is corrupt: {reason}")]
    Corrupt { hash: String, reason: String },

    #[error("storage backend failed: {0}")]
    Backend(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Contract every storage backend fulfils.
///
/// `write_by_hash` must be idempotent: storing identical content under the
/// same hash again is a no-op that still returns `Ok`.
pub trait Persistence: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<(), StorageError>;

    fn read_by_hash(&self, hash: &str) -> Result<Vec<u8>, StorageError>;

    fn write_by_hash(&self, hash: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Hash `data` and store it, returning the hash
    fn store(&self, data: &[u8]) -> Result<String, StorageError> {
        let hash = content_hash(data);
        self.write_by_hash(&hash, data)?;
        Ok(hash)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    blobs: HashMap<String, Vec<u8>>,
    log: Vec<LogEntry>,
}

/// In-process store used by tests and embedding callers
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    fail_writes: AtomicBool,
    fail_appends: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write_by_hash` fail until reset
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `append` fail until reset
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().log.clone()
    }

    pub fn entries_of(&self, kind: RecordKind) -> Vec<LogEntry> {
        self.lock()
            .log
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.lock().blobs.contains_key(hash)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Persistence for MemoryStore {
    fn append(&self, entry: &LogEntry) -> Result<(), StorageError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("log append disabled".to_string()));
        }
        self.lock().log.push(entry.clone());
        Ok(())
    }

    fn read_by_hash(&self, hash: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .blobs
            .get(hash)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(hash.to_string()))
    }

    fn write_by_hash(&self, hash: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("blob writes disabled".to_string()));
        }
        if content_hash(data) != hash {
            return Err(StorageError::HashMismatch(hash.to_string()));
        }
        self.lock()
            .blobs
            .entry(hash.to_string())
            .or_insert_with(|| data.to_vec());
        Ok(())
    }
}
