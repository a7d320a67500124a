#![allow(dead_code)]

use headroom_compress::DiskStore;
use headroom_core::{segment_id, Category, Config, ContentSegment};
use headroom_telemetry::Paths;
use std::sync::Arc;
use tempfile::TempDir;

pub fn sample_config() -> Config {
    Config::new()
}

/// Config whose budget is 4,000 chars (1,000 units at 4 chars per unit)
pub fn small_config() -> Config {
    let mut config = Config::new();
    config.capacity = 1_000;
    config.segment_size = 10;
    config
}

pub fn disk_store() -> (TempDir, Arc<DiskStore>) {
    let dir = TempDir::new().unwrap();
    let store = DiskStore::open(&Paths::at(dir.path())).unwrap();
    (dir, Arc::new(store))
}

/// Transcript-like document: history, a tool run, separators, task notes
pub fn transcript() -> String {
    let mut doc = String::new();
    for i in 0..40 {
        doc.push_str(&format!("user asked about release notes, item {i}\n"));
    }
    doc.push_str("[tool] cargo test\n");
    for i in 0..39 {
        doc.push_str(&format!("test case_{i} ... ok\n"));
    }
    for _ in 0..20 {
        doc.push_str("========\n");
    }
    for i in 0..60 {
        doc.push_str(&format!("parser refactor step {i}: tokenizer emits spans\n"));
    }
    doc
}

/// Ten 1,000-char segments; the first `direct` are task-direct
pub fn fixed_segments(direct: usize) -> (String, Vec<ContentSegment>) {
    let segments: Vec<ContentSegment> = (0..10)
        .map(|i| {
            let text = format!("{i}{}\n", "z".repeat(98)).repeat(10);
            ContentSegment {
                id: segment_id(i, &text),
                position: i,
                category: if i < direct {
                    Category::TaskDirect
                } else {
                    Category::Historical
                },
                chars: text.chars().count(),
                line_start: i * 10 + 1,
                line_end: i * 10 + 10,
                keyword_overlap: 0.0,
                score: i as f64 / 10.0,
                text,
            }
        })
        .collect();
    let content = segments.iter().map(|s| s.text.as_str()).collect();
    (content, segments)
}
