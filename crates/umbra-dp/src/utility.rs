//! Utility scoring for replacement candidates.
//!
//! The score is a raw weighted sum of four terms: semantic similarity,
//! length proximity, contextual fit and a small random jitter. When no
//! context is supplied the context term is simply absent; the remaining
//! weights are not renormalized.

use crate::cluster::ClusterIndex;
use crate::error::{DpError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use umbra_core::WeightsConfig;

/// Contextual score when the candidate already appears in the context.
const REPEATED_IN_CONTEXT: f64 = 0.2;

struct Theme {
    /// Context words that signal the theme (substring match)
    keywords: &'static [&'static str],
    /// Candidates that fit the theme (exact match)
    exemplars: &'static [&'static str],
}

const THEMES: &[Theme] = &[
    // professional
    Theme {
        keywords: &["business", "office", "work", "company", "meeting"],
        exemplars: &["manager", "director", "analyst", "consultant", "executive"],
    },
    // personal
    Theme {
        keywords: &["family", "home", "personal", "private", "friend"],
        exemplars: &["friend", "family", "parent", "child", "spouse"],
    },
    // technical
    Theme {
        keywords: &["system", "software", "code", "program", "data"],
        exemplars: &["developer", "engineer", "programmer", "architect", "specialist"],
    },
    // medical
    Theme {
        keywords: &["health", "doctor", "hospital", "medical", "patient"],
        exemplars: &["doctor", "nurse", "surgeon", "therapist", "physician"],
    },
];

/// Weights of the four utility terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Semantic similarity weight
    pub semantic: f64,
    /// Length proximity weight
    pub length: f64,
    /// Contextual fit weight
    pub context: f64,
    /// Jitter weight; the jitter term is `jitter * U[0, 1)`
    pub jitter: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            length: 0.3,
            context: 0.2,
            jitter: 0.1,
        }
    }
}

impl ScoringWeights {
    /// Check every weight is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("weights.semantic", self.semantic),
            ("weights.length", self.length),
            ("weights.context", self.context),
            ("weights.jitter", self.jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DpError::invalid(
                    name,
                    format!("{value} is not a finite value >= 0"),
                ));
            }
        }
        Ok(())
    }

    /// Upper bound of a score under these weights.
    ///
    /// Every term is at most 1, so this bounds how far apart two utilities
    /// can be, i.e. the utility sensitivity.
    #[must_use]
    pub fn max_score(&self) -> f64 {
        self.semantic + self.length + self.context + self.jitter
    }
}

impl From<&WeightsConfig> for ScoringWeights {
    fn from(config: &WeightsConfig) -> Self {
        Self {
            semantic: config.semantic,
            length: config.length,
            context: config.context,
            jitter: config.jitter,
        }
    }
}

/// Scores how well a candidate stands in for an original token.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtilityScorer {
    weights: ScoringWeights,
}

impl UtilityScorer {
    /// Create a scorer with validated weights.
    ///
    /// # Errors
    /// Returns [`DpError::InvalidParameter`] for negative or non-finite weights.
    pub fn new(weights: ScoringWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// The weights in use.
    #[must_use]
    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Utility of `candidate` as a replacement for `original`.
    ///
    /// `jitter_rng` only feeds the tie-break term. It must not be the
    /// generator that drives the exponential mechanism.
    pub fn score<R: Rng + ?Sized>(
        &self,
        index: &ClusterIndex,
        original: &str,
        candidate: &str,
        context: Option<&str>,
        jitter_rng: &mut R,
    ) -> f64 {
        let mut utility = self.weights.semantic * index.similarity(original, candidate);
        utility += self.weights.length * length_proximity(original, candidate);

        if let Some(context) = context {
            utility += self.weights.context * contextual_fit(candidate, context);
        }

        utility + self.weights.jitter * jitter_rng.gen::<f64>()
    }
}

/// `1 / (1 + |len(a) - len(b)|)` with lengths in characters.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn length_proximity(a: &str, b: &str) -> f64 {
    let diff = a.chars().count().abs_diff(b.chars().count());
    1.0 / (1.0 + diff as f64)
}

/// How well a candidate fits the surrounding text, in `[0, 1]`.
///
/// A candidate already present as a context word scores a flat 0.2 to
/// discourage repetition. Otherwise a theme scores 1 when some context word
/// contains one of its keywords and the candidate is one of its exemplars;
/// the best theme wins.
#[must_use]
pub fn contextual_fit(candidate: &str, context: &str) -> f64 {
    let context = context.to_lowercase();
    let context_words: Vec<&str> = context.split_whitespace().collect();
    let candidate = candidate.to_lowercase();

    if context_words.iter().any(|w| *w == candidate) {
        return REPEATED_IN_CONTEXT;
    }

    let fits = THEMES.iter().any(|theme| {
        theme.exemplars.contains(&candidate.as_str())
            && theme
                .keywords
                .iter()
                .any(|kw| context_words.iter().any(|w| w.contains(kw)))
    });
    if fits {
        1.0
    } else {
        0.0
    }
}
