use crate::manifest::{CompressionManifest, ManifestRecord};
use anyhow::{Context, Result};
use chrono::Utc;
use headroom_telemetry::{
    content_hash, JsonlLog, LogEntry, Paths, Persistence, RecordKind, StorageError,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Disk-backed persistence: SQLite blob table plus a JSONL event log
pub struct DiskStore {
    conn: Mutex<Connection>,
    log: JsonlLog,
}

impl DiskStore {
    pub fn open(paths: &Paths) -> Result<Self> {
        Self::open_at(&paths.store_db(), &paths.log_file())
    }

    pub fn open_at(db_path: &Path, log_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening {}", db_path.display()))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            log: JsonlLog::new(log_path),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS blobs (
                hash TEXT PRIMARY KEY,
                bytes BLOB NOT NULL,
                stored_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn blob_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))
            .map_err(backend)?;
        Ok(count as usize)
    }

    /// Log records of `kind`, in write order
    pub fn records(&self, kind: RecordKind) -> Result<Vec<LogEntry>, StorageError> {
        let entries: Vec<LogEntry> = self.log.read_all()?;
        Ok(entries.into_iter().filter(|e| e.kind == kind).collect())
    }

    /// Every manifest record, in write order
    pub fn manifests(&self) -> Result<Vec<ManifestRecord>, StorageError> {
        self.records(RecordKind::Manifest)?
            .into_iter()
            .map(|e| serde_json::from_value(e.payload).map_err(StorageError::from))
            .collect()
    }

    /// Most recent manifest written for content with `original_hash`
    pub fn latest_manifest_for(
        &self,
        original_hash: &str,
    ) -> Result<Option<CompressionManifest>, StorageError> {
        Ok(self
            .manifests()?
            .into_iter()
            .rev()
            .find(|r| r.manifest.original_hash == original_hash)
            .map(|r| r.manifest))
    }
}

fn backend(e: rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl Persistence for DiskStore {
    fn append(&self, entry: &LogEntry) -> Result<(), StorageError> {
        self.log.append(entry)?;
        Ok(())
    }

    fn read_by_hash(&self, hash: &str) -> Result<Vec<u8>, StorageError> {
        self.conn()
            .query_row(
                "SELECT bytes FROM blobs WHERE hash = ?1",
                params![hash],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound(hash.to_string()))
    }

    fn write_by_hash(&self, hash: &str, data: &[u8]) -> Result<(), StorageError> {
        if content_hash(data) != hash {
            return Err(StorageError::HashMismatch(hash.to_string()));
        }
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO blobs (hash, bytes, stored_at) VALUES (?1, ?2, ?3)",
                params![hash, data, Utc::now().to_rfc3339()],
            )
            .map_err(backend)?;
        Ok(())
    }
}
