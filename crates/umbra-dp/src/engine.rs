//! Replacement engine: the single entry point hosts talk to.
//!
//! The engine owns its cluster index, budget ledger and random generators.
//! A replacement request looks up candidates, scores them and draws one under
//! the exponential mechanism. When there is nothing to draw from, or the
//! budget has run out, the token is censored instead.

use crate::cluster::{ClusterIndex, Taxonomy};
use crate::embeddings::EmbeddingTable;
use crate::error::{DpError, Result};
use crate::ledger::{
    BudgetReport, ComposedBudget, PrivacyBudget, PrivacyBudgetLedger, QueryCost,
};
use crate::noise::{NoiseMechanism, ScalarQuery};
use crate::selector::{censor, ExponentialSelector};
use crate::utility::{ScoringWeights, UtilityScorer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use umbra_core::{AppConfig, SpendPolicy};

/// Default mask character for censored tokens.
pub const DEFAULT_MASK: char = '*';

/// Default epsilon charged per accepted replacement.
pub const DEFAULT_EPSILON_PER_REPLACEMENT: f64 = 0.1;

/// Unaccepted draws remembered under [`SpendPolicy::OnAccept`]; the oldest
/// is forgotten past this.
const MAX_PENDING_DRAWS: usize = 4096;

/// Mixed into a fixed seed so the jitter stream differs from the mechanism stream.
const JITTER_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

fn missing_index() -> DpError {
    DpError::Configuration("no cluster index attached".to_string())
}

/// Why a token was censored instead of replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CensorReason {
    /// Clustering found nothing to replace the token with
    EmptyCandidates,
    /// Epsilon was zero at request time
    BudgetExhausted,
}

/// How the replacement text was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ReplacementMethod {
    /// Drawn by the exponential mechanism
    Exponential {
        /// Probability of the drawn candidate
        probability: f64,
        /// Size of the candidate set
        candidates: usize,
    },
    /// Masked; carries no formal privacy guarantee
    Censored {
        /// Why the mechanism was not used
        reason: CensorReason,
    },
}

/// Outcome of one replacement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    /// Token as supplied by the host
    pub original: String,
    /// Text to substitute
    pub text: String,
    /// How `text` was produced
    #[serde(flatten)]
    pub method: ReplacementMethod,
    /// Mechanism draw number, unique within the engine that produced it.
    /// `None` for censored outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<u64>,
}

impl Replacement {
    /// Whether the text came from the mechanism rather than censoring.
    #[must_use]
    pub fn is_private(&self) -> bool {
        matches!(self.method, ReplacementMethod::Exponential { .. })
    }
}

/// Engine counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplacementStats {
    /// Replacement requests served
    pub requests: u64,
    /// Requests answered by the exponential mechanism
    pub mechanism: u64,
    /// Requests answered by censoring
    pub censored: u64,
    /// Suggestions the host accepted
    pub accepted: u64,
    /// Epsilon deducted from the ledger, by any path
    pub epsilon_spent: f64,
}

/// Differentially-private token replacement engine.
#[derive(Debug)]
pub struct ReplacementEngine {
    index: Option<ClusterIndex>,
    ledger: PrivacyBudgetLedger,
    selector: ExponentialSelector,
    mask: char,
    spend_policy: SpendPolicy,
    epsilon_per_replacement: f64,
    mechanism_rng: ChaCha20Rng,
    jitter_rng: StdRng,
    stats: ReplacementStats,
    next_draw: u64,
    pending: BTreeSet<u64>,
}

impl Default for ReplacementEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplacementEngine {
    /// Engine over the built-in taxonomy with default budget and weights.
    #[must_use]
    pub fn new() -> Self {
        let settings = ReplacementEngineBuilder::default();
        Self::from_parts(
            Some(ClusterIndex::new()),
            settings,
            UtilityScorer::default(),
        )
    }

    /// Start configuring an engine. No cluster index is attached by default.
    #[must_use]
    pub fn builder() -> ReplacementEngineBuilder {
        ReplacementEngineBuilder::default()
    }

    /// Build an engine from host configuration.
    ///
    /// Loads the taxonomy and embedding files named in `[clustering]`, or the
    /// built-in taxonomy when no file is given.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or a file fails to load.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let taxonomy = match &config.clustering.taxonomy_path {
            Some(path) => Taxonomy::load(path)?,
            None => Taxonomy::builtin(),
        };
        let mut index = ClusterIndex::from_taxonomy(taxonomy);
        if let Some(path) = &config.clustering.embeddings_path {
            index = index.with_embeddings(EmbeddingTable::load(path)?);
        }

        let replacement = &config.replacement;
        let mut builder = Self::builder()
            .index(index)
            .budget(PrivacyBudget::try_from(&config.privacy)?)
            .weights(ScoringWeights::from(&replacement.weights))
            .mask_char(replacement.mask_char)
            .spend_policy(replacement.spend_policy)
            .epsilon_per_replacement(replacement.epsilon_per_replacement);
        if let Some(seed) = replacement.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    fn from_parts(
        index: Option<ClusterIndex>,
        settings: ReplacementEngineBuilder,
        scorer: UtilityScorer,
    ) -> Self {
        let (mechanism_rng, jitter_rng) = match settings.seed {
            Some(seed) => (
                ChaCha20Rng::seed_from_u64(seed),
                StdRng::seed_from_u64(seed ^ JITTER_SEED_SALT),
            ),
            None => (ChaCha20Rng::from_entropy(), StdRng::from_entropy()),
        };

        info!(
            epsilon = settings.budget.epsilon,
            delta = settings.budget.delta,
            policy = %settings.spend_policy,
            seeded = settings.seed.is_some(),
            "replacement engine ready"
        );

        Self {
            index,
            ledger: PrivacyBudgetLedger::new(settings.budget),
            selector: ExponentialSelector::new(scorer),
            mask: settings.mask,
            spend_policy: settings.spend_policy,
            epsilon_per_replacement: settings.epsilon_per_replacement,
            mechanism_rng,
            jitter_rng,
            stats: ReplacementStats::default(),
            next_draw: 0,
            pending: BTreeSet::new(),
        }
    }

    fn index_ref(&self) -> Result<&ClusterIndex> {
        self.index.as_ref().ok_or_else(missing_index)
    }

    /// Attach or swap the cluster index.
    pub fn attach_index(&mut self, index: ClusterIndex) {
        self.index = Some(index);
    }

    /// The attached cluster index, if any.
    #[must_use]
    pub fn index(&self) -> Option<&ClusterIndex> {
        self.index.as_ref()
    }

    /// Replacement text for `token`.
    ///
    /// # Errors
    /// Returns [`DpError::Configuration`] without a cluster index. Exhaustion
    /// and empty candidate sets are not errors; they produce a censored token.
    pub fn replace(&mut self, token: &str, context: Option<&str>) -> Result<String> {
        self.suggest(token, context).map(|replacement| replacement.text)
    }

    /// Full replacement outcome for `token`.
    ///
    /// Under [`SpendPolicy::PerReplacement`] a mechanism draw is charged
    /// immediately. Censored outcomes are never charged.
    ///
    /// # Errors
    /// Returns [`DpError::Configuration`] without a cluster index, or
    /// [`DpError::InvalidParameter`] if the budget cannot parameterize the
    /// mechanism.
    pub fn suggest(&mut self, token: &str, context: Option<&str>) -> Result<Replacement> {
        let index = self.index.as_ref().ok_or_else(missing_index)?;
        let candidates = index.find_candidates(token);
        let budget = self.ledger.status();

        let outcome = self.selector.select(
            index,
            token,
            &candidates,
            &budget,
            context,
            &mut self.mechanism_rng,
            &mut self.jitter_rng,
        );

        self.stats.requests += 1;
        let replacement = match outcome {
            Ok(selection) => {
                self.stats.mechanism += 1;
                let draw = self.next_draw;
                self.next_draw += 1;
                if self.spend_policy == SpendPolicy::OnAccept {
                    self.pending.insert(draw);
                    if self.pending.len() > MAX_PENDING_DRAWS {
                        self.pending.pop_first();
                    }
                }
                Replacement {
                    original: token.to_string(),
                    text: selection.token,
                    method: ReplacementMethod::Exponential {
                        probability: selection.probability,
                        candidates: candidates.len(),
                    },
                    draw: Some(draw),
                }
            }
            Err(DpError::EmptyCandidateSet) => self.censored(token, CensorReason::EmptyCandidates),
            Err(DpError::BudgetExhausted { .. }) => {
                self.censored(token, CensorReason::BudgetExhausted)
            }
            Err(e) => return Err(e),
        };

        if replacement.is_private() && self.spend_policy == SpendPolicy::PerReplacement {
            self.charge();
        }
        Ok(replacement)
    }

    fn censored(&mut self, token: &str, reason: CensorReason) -> Replacement {
        self.stats.censored += 1;
        match reason {
            CensorReason::BudgetExhausted => {
                warn!("privacy budget exhausted, censoring token");
            }
            CensorReason::EmptyCandidates => {
                debug!(len = token.chars().count(), "no candidates, censoring token");
            }
        }
        Replacement {
            original: token.to_string(),
            text: censor(token, self.mask),
            method: ReplacementMethod::Censored { reason },
            draw: None,
        }
    }

    fn charge(&mut self) {
        let before = self.ledger.total_spent();
        self.ledger.spend(self.epsilon_per_replacement);
        debug!(
            charged = self.ledger.total_spent() - before,
            remaining = self.ledger.epsilon(),
            "charged replacement"
        );
    }

    /// Record that the host applied a suggestion.
    ///
    /// Under [`SpendPolicy::OnAccept`] this charges the per-replacement
    /// epsilon for mechanism outcomes. Each draw is charged at most once: a
    /// repeated accept, or a draw this engine has no record of, is ignored.
    /// Draw numbers are only unique per engine, so a replacement produced by
    /// another engine may still match a pending draw here.
    ///
    /// Returns whether the ledger was charged.
    pub fn accept(&mut self, replacement: &Replacement) -> bool {
        if self.spend_policy != SpendPolicy::OnAccept || !replacement.is_private() {
            self.stats.accepted += 1;
            return false;
        }

        let pending = replacement
            .draw
            .is_some_and(|draw| self.pending.remove(&draw));
        if !pending {
            debug!(draw = ?replacement.draw, "draw not pending, not charging");
            return false;
        }
        self.stats.accepted += 1;
        self.charge();
        true
    }

    /// Release a numeric value with additive noise.
    ///
    /// A Gaussian release without an explicit delta uses the ledger's delta.
    /// The budget is not charged.
    ///
    /// # Errors
    /// Returns [`DpError::InvalidParameter`] for out-of-range parameters.
    pub fn perturb_numeric(
        &mut self,
        value: f64,
        sensitivity: f64,
        epsilon: f64,
        delta: Option<f64>,
        mechanism: NoiseMechanism,
    ) -> Result<f64> {
        let delta = match mechanism {
            NoiseMechanism::Gaussian => Some(delta.unwrap_or(self.ledger.status().delta)),
            NoiseMechanism::Laplace => delta,
        };
        let query = ScalarQuery {
            value,
            sensitivity,
            epsilon,
            delta,
            mechanism,
        };
        query.perturb(&mut self.mechanism_rng)
    }

    /// Current budget snapshot.
    #[must_use]
    pub fn budget_status(&self) -> PrivacyBudget {
        self.ledger.status()
    }

    /// Deduct epsilon from the budget, clamping at zero.
    pub fn spend(&mut self, amount: f64) {
        self.ledger.spend(amount);
    }

    /// Overwrite the remaining epsilon.
    pub fn reset(&mut self, new_epsilon: f64) {
        self.ledger.reset(new_epsilon);
    }

    /// Budget report for display.
    #[must_use]
    pub fn report(&self) -> BudgetReport {
        self.ledger.report()
    }

    /// The budget ledger, including its event history.
    #[must_use]
    pub fn ledger(&self) -> &PrivacyBudgetLedger {
        &self.ledger
    }

    /// See [`PrivacyBudgetLedger::compose_basic`].
    #[must_use]
    pub fn compose_basic(&self, queries: &[QueryCost]) -> ComposedBudget {
        self.ledger.compose_basic(queries)
    }

    /// See [`PrivacyBudgetLedger::compose_advanced`].
    ///
    /// # Errors
    /// Returns [`DpError::InvalidParameter`] unless `0 < delta_prime < 1`.
    pub fn compose_advanced(
        &self,
        queries: &[QueryCost],
        delta_prime: f64,
    ) -> Result<ComposedBudget> {
        self.ledger.compose_advanced(queries, delta_prime)
    }

    /// Candidate replacements for a token.
    ///
    /// # Errors
    /// Returns [`DpError::Configuration`] without a cluster index.
    pub fn find_candidates(&self, token: &str) -> Result<Vec<String>> {
        Ok(self.index_ref()?.find_candidates(token))
    }

    /// Add a token to an existing category. Returns whether it was added.
    ///
    /// # Errors
    /// Returns [`DpError::Configuration`] without a cluster index.
    pub fn add_token(&mut self, token: &str, category: &str) -> Result<bool> {
        let index = self.index.as_mut().ok_or_else(missing_index)?;
        Ok(index.add_token(token, category))
    }

    /// Member count per category.
    ///
    /// # Errors
    /// Returns [`DpError::Configuration`] without a cluster index.
    pub fn cluster_stats(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self.index_ref()?.cluster_stats())
    }

    /// Counters since construction.
    #[must_use]
    pub fn stats(&self) -> ReplacementStats {
        ReplacementStats {
            epsilon_spent: self.ledger.total_spent(),
            ..self.stats
        }
    }

    /// Active spend policy.
    #[must_use]
    pub fn spend_policy(&self) -> SpendPolicy {
        self.spend_policy
    }
}

/// Builder for [`ReplacementEngine`].
#[derive(Debug)]
pub struct ReplacementEngineBuilder {
    index: Option<ClusterIndex>,
    budget: PrivacyBudget,
    weights: ScoringWeights,
    mask: char,
    spend_policy: SpendPolicy,
    epsilon_per_replacement: f64,
    seed: Option<u64>,
}

impl Default for ReplacementEngineBuilder {
    fn default() -> Self {
        Self {
            index: None,
            budget: PrivacyBudget::default(),
            weights: ScoringWeights::default(),
            mask: DEFAULT_MASK,
            spend_policy: SpendPolicy::default(),
            epsilon_per_replacement: DEFAULT_EPSILON_PER_REPLACEMENT,
            seed: None,
        }
    }
}

impl ReplacementEngineBuilder {
    /// Cluster index to draw candidates from.
    #[must_use]
    pub fn index(mut self, index: ClusterIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Initial privacy budget.
    #[must_use]
    pub fn budget(mut self, budget: PrivacyBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Utility weights.
    #[must_use]
    pub fn weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Character used to censor tokens.
    #[must_use]
    pub fn mask_char(mut self, mask: char) -> Self {
        self.mask = mask;
        self
    }

    /// When replacements are charged to the budget.
    #[must_use]
    pub fn spend_policy(mut self, policy: SpendPolicy) -> Self {
        self.spend_policy = policy;
        self
    }

    /// Epsilon charged per replacement under the automatic policies.
    #[must_use]
    pub fn epsilon_per_replacement(mut self, epsilon: f64) -> Self {
        self.epsilon_per_replacement = epsilon;
        self
    }

    /// Seed both generators for reproducible output.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the settings and build the engine.
    ///
    /// # Errors
    /// Returns [`DpError::InvalidParameter`] for invalid weights or a
    /// negative per-replacement epsilon.
    pub fn build(mut self) -> Result<ReplacementEngine> {
        let scorer = UtilityScorer::new(self.weights)?;
        if !self.epsilon_per_replacement.is_finite() || self.epsilon_per_replacement < 0.0 {
            return Err(DpError::invalid(
                "epsilon_per_replacement",
                format!("{} is not a finite value >= 0", self.epsilon_per_replacement),
            ));
        }
        let index = self.index.take();
        Ok(ReplacementEngine::from_parts(index, self, scorer))
    }
}
