//! Compression manifest: the reversible record of one compression pass

use chrono::{DateTime, Utc};
use headroom_core::{Category, CompressionLevel};
use headroom_telemetry::content_hash;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub segment_id: String,
    pub position: usize,
    pub category: Category,
    pub original_chars: usize,
    pub storage_hash: String,
    /// Byte offset of this entry's marker in the compressed content
    #[serde(default)]
    pub marker_offset: usize,
}

/// Immutable once written; later passes produce new manifests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionManifest {
    pub original_hash: String,
    pub level: CompressionLevel,
    pub entries: Vec<ManifestEntry>,
    pub reduction: usize,
    pub reduction_percent: f64,
    pub created_at: DateTime<Utc>,
}

impl CompressionManifest {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn removed_chars(&self) -> usize {
        self.entries.iter().map(|e| e.original_chars).sum()
    }

    /// Serialized form plus the hash it is stored under
    pub fn to_stored(&self) -> Result<(String, Vec<u8>), serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok((content_hash(&bytes), bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Payload of a `manifest` log record, tagged with the original hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub manifest_hash: String,
    pub manifest: CompressionManifest,
}
