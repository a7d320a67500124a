//! Auto-compression orchestrator: decides when to compress and runs the
//! score, compress, verify and persist pipeline

use headroom_compress::{
    CompressionManifest, Compressor, ExpansionResult, Expander, ManifestRecord,
};
use headroom_core::{
    Category, CompressionLevel, Config, ConfigError, ContentSegment, NoTask, PressureMonitor,
    ScoringConfig, TaskContext, Tier, UsageInput,
};
use headroom_telemetry::{content_hash, LogEntry, Persistence, RecordKind, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    BelowThreshold,
    Compressing,
    Compressed,
    /// Last pass could not persist its rollback data
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Skipped,
    Compressed,
    /// Stopped early because only task-direct content remained
    PartiallyCompressed,
    /// Rollback data or removed segments could not be stored
    CompressedNotPersisted,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Skipped => "skipped",
            ProcessStatus::Compressed => "compressed",
            ProcessStatus::PartiallyCompressed => "partially_compressed",
            ProcessStatus::CompressedNotPersisted => "compressed_not_persisted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    pub tier_before: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_after: Option<Tier>,
    pub level: CompressionLevel,
    pub original_hash: String,
    pub compressed_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<CompressionManifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
    pub reduction: usize,
    pub reduction_percent: f64,
    pub segments_compressed: usize,
    pub recommendation: String,
    pub warnings: Vec<String>,
}

impl ProcessResult {
    pub fn tier_improved(&self) -> bool {
        self.tier_after.is_some_and(|after| after < self.tier_before)
    }

    pub fn compressed(&self) -> bool {
        self.status != ProcessStatus::Skipped
    }
}

pub struct Orchestrator {
    monitor: PressureMonitor,
    compressor: Compressor,
    expander: Expander,
    store: Arc<dyn Persistence>,
    task: Arc<dyn TaskContext>,
    segment_size: usize,
    state: OrchestratorState,
    last_manifest: Option<CompressionManifest>,
}

impl Orchestrator {
    pub fn new(config: &Config, store: Arc<dyn Persistence>) -> Result<Self, ConfigError> {
        let monitor = PressureMonitor::new(config)?.with_log(store.clone());
        let compressor = Compressor::new(config, store.clone())?;
        Ok(Self {
            monitor,
            compressor,
            expander: Expander::new(store.clone()),
            store,
            task: Arc::new(NoTask),
            segment_size: config.segment_size,
            state: OrchestratorState::BelowThreshold,
            last_manifest: None,
        })
    }

    pub fn with_task(mut self, task: Arc<dyn TaskContext>) -> Self {
        self.task = task;
        self
    }

    pub fn set_task(&mut self, task: Arc<dyn TaskContext>) {
        self.task = task;
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn last_manifest(&self) -> Option<&CompressionManifest> {
        self.last_manifest.as_ref()
    }

    pub fn monitor(&self) -> &PressureMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut PressureMonitor {
        &mut self.monitor
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    pub fn scoring(&self) -> &ScoringConfig {
        self.compressor.scorer().scoring()
    }

    /// Segments of `content` in score order, highest first
    pub fn score(&self, content: &str) -> Vec<ContentSegment> {
        self.compressor
            .scorer()
            .score_content(content, self.segment_size, self.task.as_ref())
    }

    pub fn expand(
        &self,
        content: &str,
        manifest: Option<&CompressionManifest>,
        categories: Option<&[Category]>,
    ) -> ExpansionResult {
        self.expander.expand_filtered(content, manifest, categories)
    }

    /// Content as it was before the pass that compressed `original_hash`
    pub fn rollback(&self, original_hash: &str) -> Result<String, StorageError> {
        let bytes = self.store.read_by_hash(original_hash)?;
        String::from_utf8(bytes).map_err(|e| StorageError::Corrupt {
            hash: original_hash.to_string(),
            reason: e.to_string(),
        })
    }

    /// Run at most one compression pass over `content`.
    ///
    /// Compresses when forced, when the monitor says so, or at URGENT and
    /// above. `level` overrides the tier's default level.
    pub fn process(
        &mut self,
        content: &str,
        force: bool,
        level: Option<CompressionLevel>,
    ) -> ProcessResult {
        let original_hash = content_hash(content.as_bytes());
        let mut warnings = Vec::new();

        let tier_before = match self.monitor.check(UsageInput::Content(content)) {
            Ok(reading) => {
                warnings.extend(
                    reading
                        .callback_failures
                        .iter()
                        .map(|f| format!("{} callback {} failed: {}", f.tier, f.index, f.message)),
                );
                reading.tier()
            }
            Err(e) => {
                warnings.push(e.to_string());
                self.monitor.current_tier()
            }
        };

        let triggered =
            force || self.monitor.should_compress() || tier_before >= Tier::Urgent;
        if !triggered {
            self.state = OrchestratorState::BelowThreshold;
            return ProcessResult {
                status: ProcessStatus::Skipped,
                tier_before,
                tier_after: None,
                level: CompressionLevel::None,
                original_hash,
                compressed_content: content.to_string(),
                manifest: None,
                manifest_hash: None,
                reduction: 0,
                reduction_percent: 0.0,
                segments_compressed: 0,
                recommendation: tier_before.recommendation().to_string(),
                warnings,
            };
        }

        self.state = OrchestratorState::Compressing;
        let mut persisted = true;

        if let Err(e) = self.persist_original(content, &original_hash, tier_before) {
            warn!(hash = %original_hash, error = %e, "failed to persist pre-compression content");
            warnings.push(format!("pre-compression content not persisted: {e}"));
            persisted = false;
        }

        let segments = self
            .compressor
            .scorer()
            .segments(content, self.segment_size, self.task.as_ref());

        let mut level = level.unwrap_or_else(|| CompressionLevel::for_tier(tier_before));
        if force && level == CompressionLevel::None {
            level = CompressionLevel::Light;
        }

        let result = self.compressor.compress_segments(content, &segments, level);
        warnings.extend(result.warnings.iter().cloned());
        if result.storage_failures > 0 {
            warn!(
                hash = %original_hash,
                failures = result.storage_failures,
                "segments kept because they could not be stored"
            );
            persisted = false;
        }

        let tier_after = match self
            .monitor
            .check(UsageInput::Content(&result.compressed_content))
        {
            Ok(reading) => Some(reading.tier()),
            Err(e) => {
                warnings.push(e.to_string());
                None
            }
        };

        let manifest_hash = match self.persist_manifest(&result.manifest) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(hash = %original_hash, error = %e, "failed to persist manifest");
                warnings.push(format!("manifest not persisted: {e}"));
                persisted = false;
                None
            }
        };

        let status = if !persisted {
            ProcessStatus::CompressedNotPersisted
        } else if result.partial {
            ProcessStatus::PartiallyCompressed
        } else {
            ProcessStatus::Compressed
        };

        let record = json!({
            "status": status,
            "level": level,
            "tier_before": tier_before,
            "tier_after": tier_after,
            "original_hash": original_hash,
            "manifest_hash": manifest_hash,
            "reduction": result.reduction,
            "reduction_percent": result.reduction_percent,
            "segments_compressed": result.segments_compressed,
        });
        if let Err(e) = self
            .store
            .append(&LogEntry::new(RecordKind::CompressionResult, record).tagged(&original_hash))
        {
            warn!(error = %e, "failed to append compression result");
            warnings.push(format!("result record not appended: {e}"));
        }

        self.state = if persisted {
            OrchestratorState::Compressed
        } else {
            OrchestratorState::Failed
        };
        self.last_manifest = Some(result.manifest.clone());

        info!(
            status = %status,
            level = %level,
            tier_before = %tier_before,
            tier_after = ?tier_after,
            reduction = result.reduction,
            "compression processed"
        );

        let recommendation = tier_after
            .unwrap_or(tier_before)
            .recommendation()
            .to_string();

        ProcessResult {
            status,
            tier_before,
            tier_after,
            level,
            original_hash,
            compressed_content: result.compressed_content,
            manifest: Some(result.manifest),
            manifest_hash,
            reduction: result.reduction,
            reduction_percent: result.reduction_percent,
            segments_compressed: result.segments_compressed,
            recommendation,
            warnings,
        }
    }

    fn persist_original(
        &self,
        content: &str,
        original_hash: &str,
        tier: Tier,
    ) -> Result<(), StorageError> {
        self.store.write_by_hash(original_hash, content.as_bytes())?;
        self.store.append(
            &LogEntry::new(
                RecordKind::PreCompression,
                json!({
                    "original_hash": original_hash,
                    "chars": content.chars().count(),
                    "tier": tier,
                }),
            )
            .tagged(original_hash),
        )
    }

    fn persist_manifest(&self, manifest: &CompressionManifest) -> Result<String, StorageError> {
        let (manifest_hash, bytes) = manifest.to_stored()?;
        self.store.write_by_hash(&manifest_hash, &bytes)?;
        let record = ManifestRecord {
            manifest_hash: manifest_hash.clone(),
            manifest: manifest.clone(),
        };
        self.store.append(
            &LogEntry::new(RecordKind::Manifest, serde_json::to_value(&record)?)
                .tagged(&manifest.original_hash),
        )?;
        Ok(manifest_hash)
    }
}
