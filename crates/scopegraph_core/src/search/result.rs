//! Search hits.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Entity id in the searched category.
    pub id: String,
    /// Relevance; higher is better.
    pub score: f64,
    /// Matched values per field label.
    pub matches: BTreeMap<String, Vec<String>>,
}

impl SearchResult {
    /// A hit without matched fields.
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
            matches: BTreeMap::new(),
        }
    }

    /// Adds matched values, skipping duplicates.
    pub fn merge_matches(&mut self, other: &BTreeMap<String, Vec<String>>) {
        for (label, values) in other {
            let slot = self.matches.entry(label.clone()).or_default();
            for value in values {
                if !slot.contains(value) {
                    slot.push(value.clone());
                }
            }
        }
    }
}

/// Orders by score descending, then id ascending.
pub fn by_score(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

/// Ids of `results`, in order.
#[must_use]
pub fn ids(results: &[SearchResult]) -> Vec<String> {
    results.iter().map(|r| r.id.clone()).collect()
}
