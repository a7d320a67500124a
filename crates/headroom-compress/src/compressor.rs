//! Compressor: replace low-scoring segments with markers until a target
//! retained fraction is reached

use crate::manifest::{CompressionManifest, ManifestEntry};
use crate::marker::Marker;
use chrono::Utc;
use headroom_core::{
    Category, CompressionLevel, Config, ConfigError, ContentSegment, Scorer, TaskContext,
};
use headroom_telemetry::{content_hash, Persistence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    pub compressed_content: String,
    pub manifest: CompressionManifest,
    /// Characters removed from the retained text
    pub reduction: usize,
    pub reduction_percent: f64,
    pub segments_compressed: usize,
    pub original_chars: usize,
    /// Size of the retained segments, markers excluded
    pub retained_chars: usize,
    /// Size of `compressed_content`, markers included
    pub compressed_chars: usize,
    /// Target not reached because only task-direct content remained
    pub partial: bool,
    /// Segments kept in place because their text could not be stored
    pub storage_failures: usize,
    pub warnings: Vec<String>,
}

pub struct Compressor {
    scorer: Scorer,
    segment_size: usize,
    retained_fractions: BTreeMap<CompressionLevel, f64>,
    store: Arc<dyn Persistence>,
}

impl Compressor {
    pub fn new(config: &Config, store: Arc<dyn Persistence>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            scorer: Scorer::new(config.scoring.clone()),
            segment_size: config.segment_size,
            retained_fractions: config.retained_fractions.clone(),
            store,
        })
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn retained_fraction(&self, level: CompressionLevel) -> f64 {
        if level == CompressionLevel::None {
            return 1.0;
        }
        self.retained_fractions.get(&level).copied().unwrap_or(1.0)
    }

    /// Score `content` against `task` and compress it to `level`
    pub fn compress(
        &self,
        content: &str,
        level: CompressionLevel,
        task: &dyn TaskContext,
    ) -> CompressionResult {
        let segments = self.scorer.segments(content, self.segment_size, task);
        self.compress_segments(content, &segments, level)
    }

    /// Compress `content` using segments already scored from it.
    ///
    /// `segments` may be in any order but must partition `content`.
    pub fn compress_segments(
        &self,
        content: &str,
        segments: &[ContentSegment],
        level: CompressionLevel,
    ) -> CompressionResult {
        let original_chars = content.chars().count();
        let original_hash = content_hash(content.as_bytes());

        let mut ordered: Vec<&ContentSegment> = segments.iter().collect();
        ordered.sort_by_key(|s| s.position);

        if level == CompressionLevel::None || ordered.is_empty() {
            return identity(content, original_hash, level);
        }

        let fraction = self.retained_fraction(level);
        let target = (original_chars as f64 * fraction).floor() as usize;

        let mut candidates: Vec<usize> = (0..ordered.len())
            .filter(|&i| ordered[i].category != Category::TaskDirect)
            .collect();
        candidates.sort_by(|&a, &b| {
            ordered[a]
                .score
                .total_cmp(&ordered[b].score)
                .then_with(|| ordered[a].position.cmp(&ordered[b].position))
        });

        let mut removed = vec![false; ordered.len()];
        let mut retained_chars = original_chars;
        let mut warnings = Vec::new();
        let mut storage_failures = 0;

        for idx in candidates {
            if retained_chars <= target {
                break;
            }
            let segment = ordered[idx];
            let hash = content_hash(segment.text.as_bytes());
            match self.store.write_by_hash(&hash, segment.text.as_bytes()) {
                Ok(()) => {
                    debug!(
                        segment = %segment.id,
                        category = %segment.category,
                        score = segment.score,
                        chars = segment.chars,
                        "segment removed"
                    );
                    removed[idx] = true;
                    retained_chars -= segment.chars;
                }
                Err(e) => {
                    warn!(segment = %segment.id, error = %e, "failed to store segment, keeping it");
                    warnings.push(format!("segment {} retained: {e}", segment.id));
                    storage_failures += 1;
                }
            }
        }

        let partial = retained_chars > target && storage_failures == 0;
        let mut compressed_content = String::with_capacity(retained_chars);
        let mut entries = Vec::new();

        for (segment, &was_removed) in ordered.iter().zip(&removed) {
            if !was_removed {
                compressed_content.push_str(&segment.text);
                continue;
            }
            let hash = content_hash(segment.text.as_bytes());
            let marker = Marker::new(segment.category, segment.chars, &hash);
            let marker_offset = compressed_content.len();
            compressed_content.push_str(&marker.encode());
            if segment.text.ends_with('\n') {
                compressed_content.push('\n');
            }
            entries.push(ManifestEntry {
                segment_id: segment.id.clone(),
                position: segment.position,
                category: segment.category,
                original_chars: segment.chars,
                storage_hash: hash,
                marker_offset,
            });
        }

        let reduction = original_chars - retained_chars;
        let reduction_percent = percent(reduction, original_chars);

        info!(
            level = %level,
            removed = entries.len(),
            reduction,
            reduction_percent,
            partial,
            storage_failures,
            "compression pass complete"
        );

        CompressionResult {
            compressed_chars: compressed_content.chars().count(),
            compressed_content,
            segments_compressed: entries.len(),
            manifest: CompressionManifest {
                original_hash,
                level,
                entries,
                reduction,
                reduction_percent,
                created_at: Utc::now(),
            },
            reduction,
            reduction_percent,
            original_chars,
            retained_chars,
            partial,
            storage_failures,
            warnings,
        }
    }
}

fn identity(content: &str, original_hash: String, level: CompressionLevel) -> CompressionResult {
    let chars = content.chars().count();
    CompressionResult {
        compressed_content: content.to_string(),
        manifest: CompressionManifest {
            original_hash,
            level,
            entries: Vec::new(),
            reduction: 0,
            reduction_percent: 0.0,
            created_at: Utc::now(),
        },
        reduction: 0,
        reduction_percent: 0.0,
        segments_compressed: 0,
        original_chars: chars,
        retained_chars: chars,
        compressed_chars: chars,
        partial: false,
        storage_failures: 0,
        warnings: Vec::new(),
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
