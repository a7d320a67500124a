//! Expander: restore removed segments from a manifest or from inline markers

use crate::manifest::{CompressionManifest, ManifestEntry};
use crate::marker::{find_markers, MarkerSpan};
use headroom_core::Category;
use headroom_telemetry::{content_hash, Persistence};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionResult {
    pub expanded_content: String,
    pub segments_expanded: usize,
    pub warnings: Vec<String>,
}

pub struct Expander {
    store: Arc<dyn Persistence>,
}

impl Expander {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }

    pub fn expand(
        &self,
        content: &str,
        manifest: Option<&CompressionManifest>,
    ) -> ExpansionResult {
        self.expand_filtered(content, manifest, None)
    }

    /// Expand only markers whose category is in `categories` (all when `None`).
    ///
    /// With a manifest, each entry claims the marker at its recorded offset
    /// when hash and category agree there, otherwise the first unclaimed
    /// marker carrying the same hash and category. Markers already present
    /// before the pass are never confused with the pass's own. Without a
    /// manifest, every marker is resolved through the store by its embedded
    /// hash. Markers that cannot be resolved stay in place and produce a
    /// warning.
    pub fn expand_filtered(
        &self,
        content: &str,
        manifest: Option<&CompressionManifest>,
        categories: Option<&[Category]>,
    ) -> ExpansionResult {
        let spans = find_markers(content);
        if spans.is_empty() {
            return ExpansionResult {
                expanded_content: content.to_string(),
                segments_expanded: 0,
                warnings: Vec::new(),
            };
        }

        let wanted = |category: Category| categories.map_or(true, |c| c.contains(&category));
        let mut replacements: Vec<Option<String>> = vec![None; spans.len()];
        let mut claimed = vec![false; spans.len()];
        let mut warnings = Vec::new();

        match manifest {
            Some(manifest) => {
                let entries: Vec<&ManifestEntry> =
                    manifest.entries.iter().filter(|e| wanted(e.category)).collect();
                let matches = |span: &MarkerSpan, entry: &ManifestEntry| {
                    span.marker.hash == entry.storage_hash && span.marker.category == entry.category
                };

                let mut placed: Vec<Option<usize>> = entries
                    .iter()
                    .map(|entry| {
                        let i = spans.binary_search_by_key(&entry.marker_offset, |s| s.start).ok()?;
                        if claimed[i] || !matches(&spans[i], *entry) {
                            return None;
                        }
                        claimed[i] = true;
                        Some(i)
                    })
                    .collect();

                // Content edited since the pass: fall back to hash order
                for (slot, entry) in placed.iter_mut().zip(&entries) {
                    if slot.is_some() {
                        continue;
                    }
                    let found =
                        (0..spans.len()).find(|&i| !claimed[i] && matches(&spans[i], *entry));
                    if let Some(i) = found {
                        claimed[i] = true;
                        *slot = Some(i);
                    }
                }

                for (slot, entry) in placed.into_iter().zip(&entries) {
                    match slot {
                        Some(i) => replacements[i] = self.resolve(&spans[i], &mut warnings),
                        None => warnings
                            .push(format!("no marker found for segment {}", entry.segment_id)),
                    }
                }
                for (i, span) in spans.iter().enumerate() {
                    if !claimed[i] && wanted(span.marker.category) {
                        warnings.push(format!(
                            "marker {} at byte {} is not in the manifest",
                            short(&span.marker.hash),
                            span.start
                        ));
                    }
                }
            }
            None => {
                for (i, span) in spans.iter().enumerate() {
                    if wanted(span.marker.category) {
                        replacements[i] = self.resolve(span, &mut warnings);
                    }
                }
            }
        }

        let mut expanded = String::with_capacity(content.len());
        let mut cursor = 0;
        let mut segments_expanded = 0;

        for (span, replacement) in spans.iter().zip(replacements) {
            let Some(text) = replacement else {
                continue;
            };
            expanded.push_str(&content[cursor..span.start]);
            expanded.push_str(&text);
            cursor = span.end;
            if text.ends_with('\n') && content[cursor..].starts_with('\n') {
                cursor += 1;
            }
            segments_expanded += 1;
        }
        expanded.push_str(&content[cursor..]);

        debug!(segments_expanded, warnings = warnings.len(), "expansion complete");

        ExpansionResult {
            expanded_content: expanded,
            segments_expanded,
            warnings,
        }
    }

    fn resolve(&self, span: &MarkerSpan, warnings: &mut Vec<String>) -> Option<String> {
        let hash = &span.marker.hash;
        let bytes = match self.store.read_by_hash(hash) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(hash = %short(hash), error = %e, "marker could not be resolved");
                warnings.push(format!("marker {} unresolved: {e}", short(hash)));
                return None;
            }
        };

        if content_hash(&bytes) != *hash {
            warnings.push(format!("stored content for {} does not match its hash", short(hash)));
            return None;
        }
        let Ok(text) = String::from_utf8(bytes) else {
            warnings.push(format!("stored content for {} is not UTF-8", short(hash)));
            return None;
        };

        let chars = text.chars().count();
        if chars != span.marker.original_chars {
            warnings.push(format!(
                "stored content for {} is {chars} chars, marker says {}",
                short(hash),
                span.marker.original_chars
            ));
            return None;
        }
        Some(text)
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Compressor;
    use crate::marker::Marker;
    use headroom_core::{CompressionLevel, Config, NoTask};
    use headroom_telemetry::MemoryStore;

    fn store_text(store: &MemoryStore, text: &str) -> Marker {
        let hash = store.store(text.as_bytes()).unwrap();
        Marker::new(Category::Historical, text.chars().count(), hash)
    }

    #[test]
    fn test_marker_free_content_unchanged() {
        let expander = Expander::new(Arc::new(MemoryStore::new()));
        let content = "nothing to see here\n⟦ not a marker ⟧\n";
        let result = expander.expand(content, None);
        assert_eq!(result.expanded_content, content);
        assert_eq!(result.segments_expanded, 0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_marker_driven_consumes_trailing_newline() {
        let store = Arc::new(MemoryStore::new());
        let marker = store_text(&store, "old line one\nold line two\n");
        let content = format!("head\n{marker}\ntail\n");

        let result = Expander::new(store).expand(&content, None);
        assert_eq!(result.expanded_content, "head\nold line one\nold line two\ntail\n");
        assert_eq!(result.segments_expanded, 1);
    }

    #[test]
    fn test_unmatched_marker_left_with_warning() {
        let store = Arc::new(MemoryStore::new());
        let missing = Marker::new(Category::ToolResult, 5, content_hash(b"gone!"));
        let content = format!("a\n{missing}\nb\n");

        let result = Expander::new(store).expand(&content, None);
        assert_eq!(result.expanded_content, content);
        assert_eq!(result.segments_expanded, 0);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_length_mismatch_is_not_expanded() {
        let store = Arc::new(MemoryStore::new());
        let hash = store.store(b"twelve chars").unwrap();
        let wrong = Marker::new(Category::Background, 3, hash);
        let content = wrong.encode();

        let result = Expander::new(store).expand(&content, None);
        assert_eq!(result.expanded_content, content);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_category_filter() {
        let store = Arc::new(MemoryStore::new());
        let hist = store_text(&store, "history\n");
        let hash = store.store(b"$ ls\n").unwrap();
        let tool = Marker::new(Category::ToolResult, 5, hash);
        let content = format!("{hist}\n{tool}\n");

        let result =
            Expander::new(store).expand_filtered(&content, None, Some(&[Category::ToolResult]));
        assert_eq!(result.expanded_content, format!("{hist}\n$ ls\n"));
        assert_eq!(result.segments_expanded, 1);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_manifest_entry_without_marker_warns() {
        let store = Arc::new(MemoryStore::new());
        let mut doc = String::new();
        for i in 0..200 {
            doc.push_str(&format!("line {i} of routine notes\n"));
        }
        let compressor = Compressor::new(&Config::new(), store.clone()).unwrap();
        let result = compressor.compress(&doc, CompressionLevel::Aggressive, &NoTask);
        assert!(result.segments_compressed >= 2);

        // Drop the first marker from the compressed text
        let first = find_markers(&result.compressed_content).remove(0);
        let mut edited = result.compressed_content.clone();
        edited.replace_range(first.start..first.end + 1, "");

        let expanded = Expander::new(store).expand(&edited, Some(&result.manifest));
        assert_eq!(expanded.segments_expanded, result.segments_compressed - 1);
        assert_eq!(expanded.warnings.len(), 1);
        assert!(expanded.warnings[0].contains(&result.manifest.entries[0].segment_id));
    }

    #[test]
    fn test_manifest_ignores_foreign_markers() {
        let store = Arc::new(MemoryStore::new());
        let foreign = store_text(&store, "older pass\n");
        let manifest = CompressionManifest {
            original_hash: content_hash(b""),
            level: CompressionLevel::Light,
            entries: Vec::new(),
            reduction: 0,
            reduction_percent: 0.0,
            created_at: chrono::Utc::now(),
        };
        let content = format!("{foreign}\n");
        let result = Expander::new(store).expand(&content, Some(&manifest));
        assert_eq!(result.expanded_content, content);
        assert_eq!(result.warnings.len(), 1);
    }
}
