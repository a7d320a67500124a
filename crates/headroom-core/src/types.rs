//! Closed enumerations shared across headroom

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pressure tier, ordered from least to most pressure
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    #[default]
    Safe,
    Plan,
    Urgent,
    Critical,
    Emergency,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Safe,
        Tier::Plan,
        Tier::Urgent,
        Tier::Critical,
        Tier::Emergency,
    ];

    /// Classify a usage ratio against four increasing thresholds.
    ///
    /// Intervals are half-open: a ratio equal to a threshold belongs to the
    /// higher tier. NaN is treated as maximal pressure.
    pub fn from_ratio(ratio: f64, thresholds: &[f64; 4]) -> Self {
        if ratio < thresholds[0] {
            Tier::Safe
        } else if ratio < thresholds[1] {
            Tier::Plan
        } else if ratio < thresholds[2] {
            Tier::Urgent
        } else if ratio < thresholds[3] {
            Tier::Critical
        } else {
            Tier::Emergency
        }
    }

    /// Position in [`Tier::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Safe => "SAFE",
            Tier::Plan => "PLAN",
            Tier::Urgent => "URGENT",
            Tier::Critical => "CRITICAL",
            Tier::Emergency => "EMERGENCY",
        }
    }

    /// Human-readable advice for an operator at this tier
    pub fn recommendation(self) -> &'static str {
        match self {
            Tier::Safe => "Usage is comfortable; continue normally.",
            Tier::Plan => "Plan a handoff; light compression is available if usage keeps rising.",
            Tier::Urgent => "Compress now to recover headroom.",
            Tier::Critical => "Compress aggressively and prepare a handoff.",
            Tier::Emergency => "Stop accepting new work and hand off immediately.",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression level, ordered by how much content it removes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressionLevel {
    #[default]
    None,
    Light,
    Moderate,
    Aggressive,
    Maximum,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 5] = [
        CompressionLevel::None,
        CompressionLevel::Light,
        CompressionLevel::Moderate,
        CompressionLevel::Aggressive,
        CompressionLevel::Maximum,
    ];

    /// Fixed tier-to-level table used when the caller does not override
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Safe => CompressionLevel::None,
            Tier::Plan => CompressionLevel::Light,
            Tier::Urgent => CompressionLevel::Moderate,
            Tier::Critical => CompressionLevel::Aggressive,
            Tier::Emergency => CompressionLevel::Maximum,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionLevel::None => "NONE",
            CompressionLevel::Light => "LIGHT",
            CompressionLevel::Moderate => "MODERATE",
            CompressionLevel::Aggressive => "AGGRESSIVE",
            CompressionLevel::Maximum => "MAXIMUM",
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompressionLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown compression level '{s}'"))
    }
}

/// Segment category (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TaskDirect,
    Historical,
    Boilerplate,
    ToolResult,
    Background,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::TaskDirect,
        Category::Historical,
        Category::Boilerplate,
        Category::ToolResult,
        Category::Background,
    ];

    /// Fixed base weight fed into the composite score
    pub fn base_weight(self) -> f64 {
        match self {
            Category::TaskDirect => 1.0,
            Category::Background => 0.5,
            Category::Historical => 0.4,
            Category::ToolResult => 0.3,
            Category::Boilerplate => 0.1,
        }
    }

    /// Single-character code used inside compression markers
    pub fn code(self) -> char {
        match self {
            Category::TaskDirect => 'D',
            Category::Historical => 'H',
            Category::Boilerplate => 'B',
            Category::ToolResult => 'T',
            Category::Background => 'G',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::TaskDirect => "task_direct",
            Category::Historical => "historical",
            Category::Boilerplate => "boilerplate",
            Category::ToolResult => "tool_result",
            Category::Background => "background",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}
