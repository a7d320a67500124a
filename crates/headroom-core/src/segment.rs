//! Line-bounded partitioning of the working context

use crate::types::Category;
use serde::{Deserialize, Serialize};

/// A contiguous, line-bounded chunk of content with its relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSegment {
    pub id: String,
    /// Zero-based ordinal position within the content
    pub position: usize,
    pub category: Category,
    pub text: String,
    pub chars: usize,
    /// First line, 1-based
    pub line_start: usize,
    /// Last line, 1-based and inclusive
    pub line_end: usize,
    /// Fraction of the segment vocabulary shared with the task keywords
    pub keyword_overlap: f64,
    pub score: f64,
}

/// A window of content before classification and scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    pub position: usize,
    pub text: &'a str,
    pub line_start: usize,
    pub line_end: usize,
}

/// Split `content` into windows of `segment_size` lines.
///
/// Line terminators stay attached to their line, so concatenating the
/// windows in order reproduces `content` exactly. Empty content has no
/// windows.
pub fn partition(content: &str, segment_size: usize) -> Vec<Window<'_>> {
    let segment_size = segment_size.max(1);
    let mut windows = Vec::new();

    let mut start = 0;
    let mut end = 0;
    let mut lines_in_window = 0;
    let mut line_number = 0;

    for line in content.split_inclusive('\n') {
        end += line.len();
        lines_in_window += 1;
        line_number += 1;

        if lines_in_window == segment_size {
            windows.push(Window {
                position: windows.len(),
                text: &content[start..end],
                line_start: line_number + 1 - lines_in_window,
                line_end: line_number,
            });
            start = end;
            lines_in_window = 0;
        }
    }

    if lines_in_window > 0 {
        windows.push(Window {
            position: windows.len(),
            text: &content[start..end],
            line_start: line_number + 1 - lines_in_window,
            line_end: line_number,
        });
    }

    windows
}

/// Stable identifier for the segment at `position` holding `text`
pub fn segment_id(position: usize, text: &str) -> String {
    format!(
        "seg-{position}-{}",
        headroom_telemetry::short_hash(text.as_bytes())
    )
}

/// Segment ids for `content`, in position order
pub fn segment_ids(content: &str, segment_size: usize) -> Vec<String> {
    partition(content, segment_size)
        .iter()
        .map(|w| segment_id(w.position, w.text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_lines(count: usize) -> String {
        (1..=count).map(|i| format!("line {i}\n")).collect()
    }

    #[test]
    fn test_partition_counts_and_ranges() {
        let content = numbered_lines(23);
        let windows = partition(&content, 10);

        assert_eq!(windows.len(), 3);
        assert_eq!((windows[0].line_start, windows[0].line_end), (1, 10));
        assert_eq!((windows[1].line_start, windows[1].line_end), (11, 20));
        assert_eq!((windows[2].line_start, windows[2].line_end), (21, 23));
        assert!(windows[0].text.starts_with("line 1\n"));
        assert!(windows[2].text.ends_with("line 23\n"));
    }

    #[test]
    fn test_partition_reproduces_content_for_any_size() {
        let samples = [
            String::new(),
            "no newline at all".to_string(),
            "trailing\n".to_string(),
            "a\n\n\nb\r\nc".to_string(),
            numbered_lines(101),
            "ünïcödé line\nsecond ✓\n".to_string(),
        ];

        for content in &samples {
            for size in 1..=12 {
                let windows = partition(content, size);
                let joined: String = windows.iter().map(|w| w.text).collect();
                assert_eq!(&joined, content, "size {size}");

                let total_lines = content.split_inclusive('\n').count();
                assert_eq!(windows.len(), total_lines.div_ceil(size));
                for (i, w) in windows.iter().enumerate() {
                    assert_eq!(w.position, i);
                }
            }
        }
    }

    #[test]
    fn test_partition_never_splits_lines() {
        let content = numbered_lines(9);
        for window in partition(&content, 4) {
            assert!(window.text.ends_with('\n'));
            assert!(window.text.starts_with("line "));
        }
    }

    #[test]
    fn test_partition_zero_size_treated_as_one() {
        let windows = partition("a\nb\n", 0);
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn test_segment_ids_are_stable() {
        let content = numbered_lines(6);
        assert_eq!(segment_ids(&content, 2), segment_ids(&content, 2));
        let ids = segment_ids(&content, 2);
        assert_eq!(ids.len(), 3);
        assert!(ids[0].starts_with("seg-0-"));
        assert_eq!(ids[0].len(), "seg-0-".len() + 12);
    }
}
