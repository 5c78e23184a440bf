//! Exponential mechanism for differentially-private discrete selection.
//!
//! Each candidate gets weight `exp(ε·u / (2·Δu))` where `u` is its utility
//! and `Δu` the utility sensitivity. Weights are computed after subtracting
//! the largest exponent so large `ε·u` products cannot overflow; the shift
//! cancels out in normalization.
//!
//! An empty candidate set or an exhausted budget is refused. The caller then
//! censors the token, which carries no formal privacy guarantee.

use crate::cluster::ClusterIndex;
use crate::error::{DpError, Result};
use crate::ledger::PrivacyBudget;
use crate::utility::UtilityScorer;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of one draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// The chosen candidate
    pub token: String,
    /// Position of the choice in the candidate list
    pub position: usize,
    /// Probability the mechanism assigned to the choice
    pub probability: f64,
    /// Utility of every candidate, in candidate order
    pub utilities: Vec<f64>,
}

/// Draws replacements under the exponential mechanism.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialSelector {
    scorer: UtilityScorer,
}

impl ExponentialSelector {
    /// Create a selector around a utility scorer.
    #[must_use]
    pub fn new(scorer: UtilityScorer) -> Self {
        Self { scorer }
    }

    /// The scorer in use.
    #[must_use]
    pub fn scorer(&self) -> &UtilityScorer {
        &self.scorer
    }

    /// Utility of each candidate for this request.
    pub fn utilities<J: Rng + ?Sized>(
        &self,
        index: &ClusterIndex,
        original: &str,
        candidates: &[String],
        context: Option<&str>,
        jitter_rng: &mut J,
    ) -> Vec<f64> {
        candidates
            .iter()
            .map(|candidate| self.scorer.score(index, original, candidate, context, jitter_rng))
            .collect()
    }

    /// Turn utilities into selection probabilities.
    ///
    /// Every probability is positive as long as `exp` of the largest
    /// exponent gap stays above `f64` underflow, roughly
    /// `epsilon / (2 * sensitivity) * (max_u - min_u) < 700`. Past that,
    /// low-utility candidates round to exactly `0.0` and the draw becomes an
    /// argmax over the best candidates. The sum stays `1`.
    ///
    /// # Errors
    /// - [`DpError::EmptyCandidateSet`] when `utilities` is empty
    /// - [`DpError::BudgetExhausted`] when epsilon is zero
    /// - [`DpError::InvalidParameter`] for a non-positive sensitivity, an
    ///   infinite epsilon, or non-finite utilities
    pub fn distribution(utilities: &[f64], budget: &PrivacyBudget) -> Result<Vec<f64>> {
        if utilities.is_empty() {
            return Err(DpError::EmptyCandidateSet);
        }
        if budget.is_exhausted() {
            return Err(DpError::BudgetExhausted {
                epsilon: budget.epsilon,
            });
        }
        if !budget.epsilon.is_finite() {
            return Err(DpError::invalid("epsilon", "must be finite"));
        }
        if !budget.sensitivity.is_finite() || budget.sensitivity <= 0.0 {
            return Err(DpError::invalid(
                "sensitivity",
                format!("{} is not > 0", budget.sensitivity),
            ));
        }

        let scale = budget.epsilon / (2.0 * budget.sensitivity);
        let exponents: Vec<f64> = utilities.iter().map(|u| scale * u).collect();
        if exponents.iter().any(|e| !e.is_finite()) {
            return Err(DpError::invalid("utility", "utilities must be finite"));
        }

        let max = exponents.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = exponents.iter().map(|e| (e - max).exp()).collect();
        // The max term contributes exactly 1, so the sum is >= 1
        let total: f64 = weights.iter().sum();

        Ok(weights.into_iter().map(|w| w / total).collect())
    }

    /// Inverse-CDF draw from a probability vector.
    ///
    /// Returns the first position whose cumulative probability reaches a
    /// uniform `r` in `[0, 1)`, or the last position if rounding leaves the
    /// cumulative sum short of `r`. `None` only for an empty vector.
    pub fn sample<R: Rng + ?Sized>(probabilities: &[f64], rng: &mut R) -> Option<usize> {
        let last = probabilities.len().checked_sub(1)?;
        let r: f64 = rng.gen();
        let mut cumulative = 0.0;
        for (position, p) in probabilities.iter().enumerate() {
            cumulative += p;
            if r <= cumulative {
                return Some(position);
            }
        }
        Some(last)
    }

    /// Score the candidates and draw one.
    ///
    /// `mechanism_rng` drives the privacy-relevant draw; `jitter_rng` only
    /// feeds the scorer's tie-break term.
    ///
    /// # Errors
    /// See [`ExponentialSelector::distribution`].
    #[allow(clippy::too_many_arguments)]
    pub fn select<M: Rng + ?Sized, J: Rng + ?Sized>(
        &self,
        index: &ClusterIndex,
        original: &str,
        candidates: &[String],
        budget: &PrivacyBudget,
        context: Option<&str>,
        mechanism_rng: &mut M,
        jitter_rng: &mut J,
    ) -> Result<Selection> {
        if candidates.is_empty() {
            return Err(DpError::EmptyCandidateSet);
        }
        if budget.is_exhausted() {
            return Err(DpError::BudgetExhausted {
                epsilon: budget.epsilon,
            });
        }

        let utilities = self.utilities(index, original, candidates, context, jitter_rng);
        let probabilities = Self::distribution(&utilities, budget)?;
        let position =
            Self::sample(&probabilities, mechanism_rng).ok_or(DpError::EmptyCandidateSet)?;

        debug!(
            candidates = candidates.len(),
            position,
            probability = probabilities[position],
            epsilon = budget.epsilon,
            "exponential mechanism draw"
        );

        Ok(Selection {
            token: candidates[position].clone(),
            position,
            probability: probabilities[position],
            utilities,
        })
    }
}

/// Mask every character of `token`, keeping its length in characters.
#[must_use]
pub fn censor(token: &str, mask: char) -> String {
    std::iter::repeat(mask).take(token.chars().count()).collect()
}
