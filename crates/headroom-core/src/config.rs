//! Session configuration and validation

use crate::types::CompressionLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tier thresholds must be strictly increasing, got {0:?}")]
    ThresholdsNotIncreasing([f64; 4]),

    #[error("tier threshold {0} is outside (0, 1)")]
    ThresholdOutOfRange(f64),

    #[error("compression level {0} is missing from the retained-fraction table")]
    MissingLevel(CompressionLevel),

    #[error("retained fraction {fraction} for {level} is outside (0, 1]")]
    RetainedFractionOutOfRange {
        level: CompressionLevel,
        fraction: f64,
    },

    #[error("retained fraction for {0} is larger than for the level below it")]
    LevelsNotDecreasing(CompressionLevel),

    #[error("capacity must be greater than zero")]
    ZeroCapacity,

    #[error("reserved headroom {headroom} leaves no usable capacity out of {capacity}")]
    HeadroomExceedsCapacity { headroom: u64, capacity: u64 },

    #[error("{0} must be at least {1}")]
    InvalidCount(&'static str, usize),

    #[error("{0} must be a finite, non-negative number")]
    InvalidNumber(&'static str),

    #[error("chars_per_unit must be finite and positive, got {0}")]
    InvalidRatio(f64),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Weights and cut-offs used by the segment scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the task keyword overlap term
    pub keyword_weight: f64,
    /// Weight of the per-category base weight
    pub category_weight: f64,
    /// Weight of the recency factor
    pub recency_weight: f64,
    /// Scores at or above this count as high-value in summaries
    pub high_threshold: f64,
    /// Scores below this count as low-value in summaries
    pub low_threshold: f64,
    /// Keyword overlap at which a segment is classified task-direct
    pub task_direct_overlap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            category_weight: 0.3,
            recency_weight: 0.2,
            high_threshold: 0.6,
            low_threshold: 0.3,
            task_direct_overlap: 0.2,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Budget capacity in usage units
    pub capacity: u64,

    /// Units held back from the capacity before ratios are computed
    pub reserved_headroom: u64,

    /// Characters per usage unit when estimating from content
    pub chars_per_unit: f64,

    /// PLAN, URGENT, CRITICAL and EMERGENCY lower bounds, as usage ratios
    pub thresholds: [f64; 4],

    /// Lines per segment
    pub segment_size: usize,

    /// Completed operations between checkpoint signals
    pub checkpoint_every: usize,

    /// Maximum cached operation results
    pub cache_capacity: usize,

    /// Maximum operations executed in parallel
    pub worker_pool_size: usize,

    /// Queued operations of one type that trigger an automatic flush
    pub batch_threshold: usize,

    /// Target retained fraction per compression level
    pub retained_fractions: BTreeMap<CompressionLevel, f64>,

    pub scoring: ScoringConfig,

    /// Snapshots kept in memory by the monitor
    pub history_limit: usize,

    /// At PLAN, compress early if EMERGENCY is projected within this many minutes
    pub compress_lookahead_minutes: f64,
}

impl Config {
    pub fn new() -> Self {
        let retained_fractions = BTreeMap::from([
            (CompressionLevel::None, 1.0),
            (CompressionLevel::Light, 0.80),
            (CompressionLevel::Moderate, 0.60),
            (CompressionLevel::Aggressive, 0.35),
            (CompressionLevel::Maximum, 0.15),
        ]);

        Self {
            capacity: 200_000,
            reserved_headroom: 0,
            chars_per_unit: 4.0,
            thresholds: [0.60, 0.75, 0.85, 0.95],
            segment_size: 50,
            checkpoint_every: 8,
            cache_capacity: 128,
            worker_pool_size: 4,
            batch_threshold: 8,
            retained_fractions,
            scoring: ScoringConfig::default(),
            history_limit: 1000,
            compress_lookahead_minutes: 10.0,
        }
    }

    /// Load from a JSON file, using defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::new();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Capacity left after the reserved headroom
    pub fn effective_capacity(&self) -> u64 {
        self.capacity.saturating_sub(self.reserved_headroom)
    }

    /// Target retained fraction for `level`; NONE always retains everything
    pub fn retained_fraction(&self, level: CompressionLevel) -> f64 {
        if level == CompressionLevel::None {
            return 1.0;
        }
        self.retained_fractions.get(&level).copied().unwrap_or(1.0)
    }

    /// Reject any configuration the components cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.reserved_headroom >= self.capacity {
            return Err(ConfigError::HeadroomExceedsCapacity {
                headroom: self.reserved_headroom,
                capacity: self.capacity,
            });
        }
        if !self.chars_per_unit.is_finite() || self.chars_per_unit <= 0.0 {
            return Err(ConfigError::InvalidRatio(self.chars_per_unit));
        }

        for &threshold in &self.thresholds {
            if !(threshold > 0.0 && threshold < 1.0) {
                return Err(ConfigError::ThresholdOutOfRange(threshold));
            }
        }
        if self.thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::ThresholdsNotIncreasing(self.thresholds));
        }

        let mut previous = f64::INFINITY;
        for level in CompressionLevel::ALL {
            let fraction = *self
                .retained_fractions
                .get(&level)
                .ok_or(ConfigError::MissingLevel(level))?;
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(ConfigError::RetainedFractionOutOfRange { level, fraction });
            }
            if fraction > previous {
                return Err(ConfigError::LevelsNotDecreasing(level));
            }
            previous = fraction;
        }

        let counts = [
            ("segment_size", self.segment_size, 1),
            ("checkpoint_every", self.checkpoint_every, 1),
            ("cache_capacity", self.cache_capacity, 1),
            ("worker_pool_size", self.worker_pool_size, 1),
            ("batch_threshold", self.batch_threshold, 1),
            ("history_limit", self.history_limit, 2),
        ];
        for (name, value, minimum) in counts {
            if value < minimum {
                return Err(ConfigError::InvalidCount(name, minimum));
            }
        }

        let numbers = [
            ("scoring.keyword_weight", self.scoring.keyword_weight),
            ("scoring.category_weight", self.scoring.category_weight),
            ("scoring.recency_weight", self.scoring.recency_weight),
            ("scoring.high_threshold", self.scoring.high_threshold),
            ("scoring.low_threshold", self.scoring.low_threshold),
            ("scoring.task_direct_overlap", self.scoring.task_direct_overlap),
            ("compress_lookahead_minutes", self.compress_lookahead_minutes),
        ];
        for (name, value) in numbers {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidNumber(name));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
