//! Description similarity used to cluster findings across models.

use std::collections::HashSet;

/// Pluggable similarity between two finding descriptions, in `[0, 1]`.
///
/// Implementations must be symmetric. Clustering only compares findings of
/// the same category, so metrics need not consider category themselves.
pub trait SimilarityMetric: Send + Sync + std::fmt::Debug {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Jaccard index over normalized word sets.
///
/// Words are lowercased, split on non-alphanumerics, and filtered to length
/// ≥ 3 minus a small stopword list.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenJaccard;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "are", "was", "not", "but", "from", "into",
    "can", "may", "should", "could", "would", "there", "their", "has", "have", "been", "which",
    "when", "where", "any", "all", "its", "use", "used", "using", "also", "via",
];

impl TokenJaccard {
    pub fn tokens(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 3)
            .map(str::to_lowercase)
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .collect()
    }
}

impl SimilarityMetric for TokenJaccard {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let left = Self::tokens(a);
        let right = Self::tokens(b);
        if left.is_empty() && right.is_empty() {
            // Nothing comparable; fall back to exact text equality.
            return if a.trim().eq_ignore_ascii_case(b.trim()) { 1.0 } else { 0.0 };
        }
        let intersection = left.intersection(&right).count();
        let union = left.union(&right).count();
        intersection as f64 / union as f64
    }
}
