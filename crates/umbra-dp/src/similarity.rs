//! Token similarity strategies.
//!
//! Similarity is resolved through an ordered [`SimilarityChain`]: each
//! strategy may decline to score a pair by returning `None`, and the first
//! strategy that produces a score wins. The default chain consults word
//! embeddings when both tokens have a vector and otherwise falls back to a
//! normalized edit distance, which always answers.

use crate::embeddings::EmbeddingTable;
use std::fmt;

/// A way of scoring how alike two tokens are, in `[0, 1]`.
pub trait SimilarityStrategy: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Score the pair, or `None` if this strategy has no opinion.
    fn score(&self, a: &str, b: &str) -> Option<f64>;
}

/// Levenshtein-based similarity: `(max_len - distance) / max_len`.
///
/// Lengths are measured in characters. Two empty strings are identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistanceSimilarity;

impl SimilarityStrategy for EditDistanceSimilarity {
    fn name(&self) -> &'static str {
        "edit_distance"
    }

    fn score(&self, a: &str, b: &str) -> Option<f64> {
        Some(edit_similarity(a, b))
    }
}

/// Cosine similarity over an injected token → vector table.
///
/// Declines to score unless both tokens (case-folded) have a vector.
#[derive(Debug, Clone)]
pub struct EmbeddingSimilarity {
    table: EmbeddingTable,
}

impl EmbeddingSimilarity {
    /// Wrap an embedding table.
    #[must_use]
    pub fn new(table: EmbeddingTable) -> Self {
        Self { table }
    }
}

impl SimilarityStrategy for EmbeddingSimilarity {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn score(&self, a: &str, b: &str) -> Option<f64> {
        let va = self.table.get(a)?;
        let vb = self.table.get(b)?;
        Some(cosine_similarity(va, vb))
    }
}

/// Ordered list of strategies; the first present score wins.
#[derive(Debug, Default)]
pub struct SimilarityChain {
    strategies: Vec<Box<dyn SimilarityStrategy>>,
}

impl SimilarityChain {
    /// An empty chain. Scores everything as `0.0` until strategies are pushed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with only the edit-distance strategy.
    #[must_use]
    pub fn edit_distance_only() -> Self {
        Self::new().with(EditDistanceSimilarity)
    }

    /// Embeddings first, then edit distance.
    #[must_use]
    pub fn with_embeddings(table: EmbeddingTable) -> Self {
        Self::new()
            .with(EmbeddingSimilarity::new(table))
            .with(EditDistanceSimilarity)
    }

    /// Append a strategy at the lowest priority.
    #[must_use]
    pub fn with(mut self, strategy: impl SimilarityStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Insert a strategy ahead of all existing ones.
    pub fn prepend(&mut self, strategy: impl SimilarityStrategy + 'static) {
        self.strategies.insert(0, Box::new(strategy));
    }

    /// Names of the strategies in priority order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Score a pair with the first strategy that answers, clamped to `[0, 1]`.
    #[must_use]
    pub fn score(&self, a: &str, b: &str) -> f64 {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.score(a, b))
            .map_or(0.0, |score| if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) })
    }
}

/// Normalized edit-distance similarity between two strings.
///
/// `1 - distance / max_len`, counted in characters.
#[must_use]
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Levenshtein distance counted in characters.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Cosine similarity; `0.0` for vectors of different length or zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
