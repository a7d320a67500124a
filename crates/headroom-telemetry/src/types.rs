//! Log record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of record appended to the log collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Snapshot,
    TierTransition,
    PreCompression,
    Manifest,
    CompressionResult,
}

/// One append-only log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: RecordKind,
    pub timestamp: DateTime<Utc>,
    /// Content hash this record is tagged with, when it refers to stored content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub payload: serde_json::Value,
}

impl LogEntry {
    pub fn new(kind: RecordKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            tag: None,
            payload,
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
