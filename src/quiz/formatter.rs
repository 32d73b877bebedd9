//! Question text normalization and display formatting
//!
//! The formatter holds an immutable snapshot, taken once at startup, that maps
//! a normalized question key to the preferred rendering of that question.

use crate::types::{CorpusEntry, Question};
use std::collections::HashMap;
use tracing::debug;

/// Inline-emphasis markers stripped during normalization
const EMPHASIS_MARKERS: [char; 3] = ['*', '_', '`'];

/// Normalize text for fuzzy comparison
///
/// Removes emphasis markers, lowercases, trims, and collapses whitespace runs
/// to single spaces. Idempotent.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !EMPHASIS_MARKERS.contains(c))
        .collect();

    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Snapshot of canonical question renderings keyed by normalized text
#[derive(Debug, Clone, Default)]
pub struct QuestionFormatter {
    renderings: HashMap<String, String>,
}

impl QuestionFormatter {
    /// Formatter with no renderings; `apply_formatting` is the identity
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the snapshot from corpus entries carrying a `formatted_text`
    ///
    /// When two entries normalize to the same key the first one wins.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a CorpusEntry>,
    {
        let mut renderings = HashMap::new();
        for entry in entries {
            let Some(formatted) = entry.formatted_text.as_deref() else {
                continue;
            };
            if formatted.trim().is_empty() {
                continue;
            }
            let key = normalize(&entry.question_text);
            if key.is_empty() {
                continue;
            }
            renderings
                .entry(key)
                .or_insert_with(|| formatted.to_string());
        }

        debug!("Question formatter loaded {} renderings", renderings.len());
        Self { renderings }
    }

    pub fn len(&self) -> usize {
        self.renderings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderings.is_empty()
    }

    /// Stored rendering for raw question text, if any
    pub fn rendering_for(&self, question_text: &str) -> Option<&str> {
        self.renderings
            .get(&normalize(question_text))
            .map(String::as_str)
    }

    /// Copy of `question` with its text replaced by the stored rendering
    pub fn apply_formatting(&self, question: &Question) -> Question {
        let mut formatted = question.clone();
        if let Some(rendering) = self.rendering_for(&question.question_text) {
            formatted.question_text = rendering.to_string();
        }
        formatted
    }
}
