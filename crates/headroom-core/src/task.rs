//! Task-context collaborator supplying keywords to the scorer

use std::collections::HashSet;
use std::sync::RwLock;

static STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "to", "of",
    "in", "for", "on", "with", "at", "by", "from", "as", "into", "through", "then", "here",
    "there", "when", "where", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "some", "such", "not", "only", "just", "but", "and", "or", "if", "about", "what", "which",
    "who", "this", "that", "these", "those", "it", "its", "my", "me", "we", "our", "you", "your",
    "up", "down", "no", "so", "very", "too", "than", "please", "also", "now", "still", "already",
];

/// Lowercased significant words of `text`, in order of appearance
pub fn extract_keywords(text: &str) -> Vec<String> {
    let stop_set: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .map(|w| w.trim_matches('-'))
        .filter(|w| w.chars().count() >= 3 && !stop_set.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Unique significant words of `text`
pub fn vocabulary(text: &str) -> HashSet<String> {
    extract_keywords(text).into_iter().collect()
}

/// Supplies the active task's keywords; may change between scoring calls
pub trait TaskContext: Send + Sync {
    fn keywords(&self) -> HashSet<String>;
}

/// No active task: the keyword term is always zero
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTask;

impl TaskContext for NoTask {
    fn keywords(&self) -> HashSet<String> {
        HashSet::new()
    }
}

/// Fixed task description plus explicit keywords
#[derive(Debug, Clone, Default)]
pub struct StaticTask {
    pub description: String,
    pub keywords: Vec<String>,
}

impl StaticTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }
}

impl TaskContext for StaticTask {
    fn keywords(&self) -> HashSet<String> {
        let mut set = vocabulary(&self.description);
        set.extend(self.keywords.iter().map(|k| k.trim().to_lowercase()));
        set.retain(|k| !k.is_empty());
        set
    }
}

/// Task context that can be swapped while other components hold it
#[derive(Debug, Default)]
pub struct SharedTask {
    current: RwLock<StaticTask>,
}

impl SharedTask {
    pub fn new(task: StaticTask) -> Self {
        Self {
            current: RwLock::new(task),
        }
    }

    pub fn update(&self, task: StaticTask) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = task;
    }

    pub fn clear(&self) {
        self.update(StaticTask::default());
    }
}

impl TaskContext for SharedTask {
    fn keywords(&self) -> HashSet<String> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keywords()
    }
}
