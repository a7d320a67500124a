//! Budget pressure monitoring, configuration, and segment scoring

mod config;
mod monitor;
mod scorer;
mod segment;
mod task;
mod types;

pub use config::{Config, ConfigError, ScoringConfig};
pub use monitor::{
    BudgetState, CallbackError, CallbackFailure, CallbackHandle, MonitorError, PressureMonitor,
    Reading, Snapshot, TierCallback, TierChange, Trend, UsageInput,
};
pub use scorer::{get_summary, keyword_overlap, ScoreSummary, Scorer};
pub use segment::{partition, segment_id, segment_ids, ContentSegment, Window};
pub use task::{extract_keywords, vocabulary, NoTask, SharedTask, StaticTask, TaskContext};
pub use types::{Category, CompressionLevel, Tier};
