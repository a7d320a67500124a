//! Segment scorer: classify and rank line-bounded segments

use crate::config::ScoringConfig;
use crate::segment::{partition, segment_id, ContentSegment, Window};
use crate::task::{vocabulary, TaskContext};
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const TOOL_OUTPUT_PREFIXES: &[&str] = &[
    "[tool",
    "tool_result",
    "Tool result",
    "$ ",
    ">>> ",
    "stdout:",
    "stderr:",
    "exit code",
];

#[derive(Debug, Clone)]
pub struct Scorer {
    scoring: ScoringConfig,
}

impl Scorer {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Segment, classify and score `content`, highest score first.
    ///
    /// Ties are broken by earliest position, so the order is deterministic.
    pub fn score_content(
        &self,
        content: &str,
        segment_size: usize,
        task: &dyn TaskContext,
    ) -> Vec<ContentSegment> {
        let mut segments = self.segments(content, segment_size, task);
        segments.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        segments
    }

    /// Segment, classify and score `content`, in position order
    pub fn segments(
        &self,
        content: &str,
        segment_size: usize,
        task: &dyn TaskContext,
    ) -> Vec<ContentSegment> {
        let keywords = task.keywords();
        let windows = partition(content, segment_size);
        let count = windows.len();

        windows
            .iter()
            .map(|window| self.score_window(window, count, &keywords))
            .collect()
    }

    fn score_window(
        &self,
        window: &Window<'_>,
        count: usize,
        keywords: &HashSet<String>,
    ) -> ContentSegment {
        let overlap = keyword_overlap(window.text, keywords);
        let category = self.classify(window, count, keywords, overlap);
        let recency = (window.position + 1) as f64 / count.max(1) as f64;

        let score = self.scoring.keyword_weight * overlap
            + self.scoring.category_weight * category.base_weight()
            + self.scoring.recency_weight * recency;

        ContentSegment {
            id: segment_id(window.position, window.text),
            position: window.position,
            category,
            text: window.text.to_string(),
            chars: window.text.chars().count(),
            line_start: window.line_start,
            line_end: window.line_end,
            keyword_overlap: overlap,
            score,
        }
    }

    fn classify(
        &self,
        window: &Window<'_>,
        count: usize,
        keywords: &HashSet<String>,
        overlap: f64,
    ) -> Category {
        if !keywords.is_empty() && overlap >= self.scoring.task_direct_overlap && overlap > 0.0 {
            return Category::TaskDirect;
        }

        let first_line = window
            .text
            .lines()
            .map(str::trim_start)
            .find(|line| !line.is_empty());
        if let Some(line) = first_line {
            if TOOL_OUTPUT_PREFIXES.iter().any(|p| line.starts_with(p)) {
                return Category::ToolResult;
            }
        }

        let total_lines = window.text.lines().count().max(1);
        let filler_lines = window
            .text
            .lines()
            .filter(|line| !line.chars().any(char::is_alphanumeric))
            .count();
        if filler_lines * 2 >= total_lines {
            return Category::Boilerplate;
        }

        if (window.position + 1) * 2 <= count {
            Category::Historical
        } else {
            Category::Background
        }
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

/// Fraction of the segment's vocabulary that appears in `keywords`
pub fn keyword_overlap(text: &str, keywords: &HashSet<String>) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let vocab = vocabulary(text);
    if vocab.is_empty() {
        return 0.0;
    }
    let shared = vocab.iter().filter(|w| keywords.contains(*w)).count();
    shared as f64 / vocab.len() as f64
}

/// Aggregate view over a set of scored segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub segments: usize,
    pub above_high: usize,
    pub below_low: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub mean_score: f64,
    pub total_chars: usize,
}

impl ScoreSummary {
    /// Pure reduction over `segments` using the given cut-offs
    pub fn from_segments(segments: &[ContentSegment], high: f64, low: f64) -> Self {
        let mut summary = ScoreSummary {
            segments: segments.len(),
            ..Default::default()
        };

        let mut score_sum = 0.0;
        for segment in segments {
            if segment.score >= high {
                summary.above_high += 1;
            }
            if segment.score < low {
                summary.below_low += 1;
            }
            *summary.by_category.entry(segment.category).or_insert(0) += 1;
            summary.total_chars += segment.chars;
            score_sum += segment.score;
        }

        if !segments.is_empty() {
            summary.mean_score = score_sum / segments.len() as f64;
        }
        summary
    }
}

/// Summarize `segments` with the scorer's configured cut-offs
pub fn get_summary(segments: &[ContentSegment], scoring: &ScoringConfig) -> ScoreSummary {
    ScoreSummary::from_segments(segments, scoring.high_threshold, scoring.low_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NoTask, StaticTask};

    fn prose_block(word: &str, lines: usize) -> String {
        (0..lines)
            .map(|i| format!("{word} paragraph {i} discusses general material here\n"))
            .collect()
    }

    #[test]
    fn test_scores_sorted_descending_with_position_ties() {
        let content = prose_block("alpha", 40);
        let scorer = Scorer::default();
        let scored = scorer.score_content(&content, 10, &NoTask);

        assert_eq!(scored.len(), 4);
        for pair in scored.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].position < pair[1].position);
            }
        }
    }

    #[test]
    fn test_recency_is_non_decreasing_toward_the_end() {
        let content = prose_block("beta", 60);
        let scorer = Scorer::default();
        let segments = scorer.segments(&content, 10, &NoTask);

        let background: Vec<_> = segments
            .iter()
            .filter(|s| s.category == Category::Background)
            .collect();
        for pair in background.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
        assert!(segments.last().unwrap().score > segments.first().unwrap().score);
    }

    #[test]
    fn test_scenario_no_task_context_scores_on_category_and_recency_only() {
        // 200 lines of 50 chars: a 10,000-char document in four 50-line segments
        let content: String = (0..200)
            .map(|i| format!("{i:04} routine log entry with ordinary details.....\n"))
            .collect();
        assert_eq!(content.len(), 10_000);

        let scoring = ScoringConfig::default();
        let scorer = Scorer::new(scoring.clone());
        let segments = scorer.segments(&content, 50, &NoTask);
        let count = segments.len();
        assert_eq!(count, 4);

        for segment in &segments {
            assert_eq!(segment.keyword_overlap, 0.0);
            assert_ne!(segment.category, Category::TaskDirect);
            let recency = (segment.position + 1) as f64 / count as f64;
            let expected = scoring.category_weight * segment.category.base_weight()
                + scoring.recency_weight * recency;
            assert!((segment.score - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_task_keywords_mark_segments_task_direct() {
        let mut content = prose_block("filler", 10);
        content.push_str(&"refactor tokenizer lexer refactor tokenizer\n".repeat(10));
        content.push_str(&prose_block("filler", 10));

        let task = StaticTask::new("refactor the tokenizer and lexer");
        let scorer = Scorer::default();
        let segments = scorer.segments(&content, 10, &task);

        assert_eq!(segments[1].category, Category::TaskDirect);
        assert!(segments[1].keyword_overlap > 0.9);
        assert_ne!(segments[0].category, Category::TaskDirect);

        let ranked = scorer.score_content(&content, 10, &task);
        assert_eq!(ranked[0].position, 1);
    }

    #[test]
    fn test_classifies_tool_output_and_boilerplate() {
        let mut content = String::new();
        content.push_str("$ cargo test\nrunning 3 tests\ntest ok\n");
        content.push_str("----\n\n====\nheader\n");
        content.push_str("older discussion about scheduling\nmore discussion\nend\n");
        content.push_str("latest discussion about scheduling\nmore discussion\nend\n");

        let segments = Scorer::default().segments(&content, 3, &NoTask);
        assert_eq!(segments[0].category, Category::ToolResult);
        assert_eq!(segments[1].category, Category::Boilerplate);
        assert_eq!(segments[3].category, Category::Background);
    }

    #[test]
    fn test_keyword_overlap_fraction() {
        let keywords: HashSet<String> =
            ["cache", "eviction"].iter().map(|s| s.to_string()).collect();
        let overlap = keyword_overlap("Cache eviction policy review", &keywords);
        // vocabulary: cache, eviction, policy, review
        assert!((overlap - 0.5).abs() < 1e-12);
        assert_eq!(keyword_overlap("", &keywords), 0.0);
        assert_eq!(keyword_overlap("cache", &HashSet::new()), 0.0);
    }

    #[test]
    fn test_empty_content_has_no_segments() {
        assert!(Scorer::default().score_content("", 10, &NoTask).is_empty());
    }

    #[test]
    fn test_summary_reducer() {
        let mut content = prose_block("gamma", 20);
        content.push_str("$ ls\nfile\n");
        let scoring = ScoringConfig::default();
        let segments = Scorer::new(scoring.clone()).segments(&content, 5, &NoTask);

        let summary = get_summary(&segments, &scoring);
        assert_eq!(summary.segments, segments.len());
        assert_eq!(summary.total_chars, content.len());
        assert_eq!(
            summary.by_category.values().sum::<usize>(),
            segments.len()
        );
        assert_eq!(summary.by_category.get(&Category::ToolResult), Some(&1));

        let mean = segments.iter().map(|s| s.score).sum::<f64>() / segments.len() as f64;
        assert!((summary.mean_score - mean).abs() < 1e-12);

        let everything_high = ScoreSummary::from_segments(&segments, 0.0, 0.0);
        assert_eq!(everything_high.above_high, segments.len());
        assert_eq!(everything_high.below_low, 0);
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = ScoreSummary::from_segments(&[], 0.6, 0.3);
        assert_eq!(summary.segments, 0);
        assert_eq!(summary.mean_score, 0.0);
    }
}
