//! Privacy budget ledger.
//!
//! Owns a single mutable (ε, δ, sensitivity) triple. Spending only ever
//! lowers epsilon and clamps at zero; zero means exhausted, which is a normal
//! state that selection has to check, not an error. Only an explicit
//! [`PrivacyBudgetLedger::reset`] raises epsilon again.
//!
//! The composition helpers are reporting utilities. They never touch the
//! live budget; feed their result back through `reset` to apply it.

use crate::error::{DpError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use umbra_core::PrivacyConfig;

/// Mechanism named in budget reports.
pub const MECHANISM_NAME: &str = "Exponential Mechanism";

const REPORT_DESCRIPTION: &str =
    "Provides formal privacy guarantees for word replacement while maintaining utility";

/// Snapshot of the budget triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    /// Remaining epsilon, never negative
    pub epsilon: f64,
    /// Failure probability in `[0, 1)`
    pub delta: f64,
    /// Utility sensitivity, strictly positive
    pub sensitivity: f64,
}

impl PrivacyBudget {
    /// Create a validated budget.
    ///
    /// # Errors
    /// Returns [`DpError::InvalidParameter`] if epsilon is negative, delta is
    /// outside `[0, 1)`, sensitivity is not positive, or any value is not
    /// finite.
    pub fn new(epsilon: f64, delta: f64, sensitivity: f64) -> Result<Self> {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(DpError::invalid("epsilon", format!("{epsilon} is not >= 0")));
        }
        if !(0.0..1.0).contains(&delta) {
            return Err(DpError::invalid("delta", format!("{delta} is not in [0, 1)")));
        }
        if !sensitivity.is_finite() || sensitivity <= 0.0 {
            return Err(DpError::invalid(
                "sensitivity",
                format!("{sensitivity} is not > 0"),
            ));
        }
        Ok(Self {
            epsilon,
            delta,
            sensitivity,
        })
    }

    /// Whether epsilon has run out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.epsilon <= 0.0
    }
}

impl Default for PrivacyBudget {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            delta: 0.001,
            sensitivity: 1.0,
        }
    }
}

impl TryFrom<&PrivacyConfig> for PrivacyBudget {
    type Error = DpError;

    fn try_from(config: &PrivacyConfig) -> Result<Self> {
        Self::new(config.epsilon, config.delta, config.sensitivity)
    }
}

/// Privacy cost of one past query, input to the composition helpers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryCost {
    /// Epsilon the query consumed
    pub epsilon: f64,
    /// Delta the query consumed
    pub delta: f64,
}

impl QueryCost {
    /// Create a query cost.
    #[must_use]
    pub fn new(epsilon: f64, delta: f64) -> Self {
        Self { epsilon, delta }
    }
}

/// Which composition theorem produced a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionKind {
    /// Sum of epsilons, max of deltas
    Basic,
    /// Dwork–Rothblum–Vadhan advanced composition
    Advanced,
}

/// Total privacy cost of a batch of queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComposedBudget {
    /// Composed epsilon
    pub epsilon: f64,
    /// Composed delta
    pub delta: f64,
    /// Theorem used
    pub kind: CompositionKind,
}

/// Read-only view of the ledger for hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    /// Mechanism the budget protects
    pub mechanism: String,
    /// Remaining epsilon
    pub epsilon: f64,
    /// Delta
    pub delta: f64,
    /// Sensitivity
    pub sensitivity: f64,
    /// Human-readable guarantee, e.g. `(1, 0.001)-differential privacy`
    pub guarantee: String,
    /// What the guarantee covers
    pub description: String,
    /// Whether epsilon has run out
    pub exhausted: bool,
}

/// What happened to the budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BudgetEventKind {
    /// Epsilon was deducted
    Spent {
        /// Amount requested
        amount: f64,
    },
    /// Epsilon was overwritten
    Reset {
        /// Value before the reset
        previous: f64,
    },
    /// A spend drove epsilon to zero
    Exhausted,
}

/// Timestamped ledger history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetEvent {
    /// Event kind
    pub kind: BudgetEventKind,
    /// Epsilon after the event
    pub epsilon_after: f64,
    /// When it happened
    pub at: DateTime<Utc>,
}

/// Owner of the live privacy budget.
#[derive(Debug, Clone)]
pub struct PrivacyBudgetLedger {
    budget: PrivacyBudget,
    total_spent: f64,
    history: Vec<BudgetEvent>,
}

impl Default for PrivacyBudgetLedger {
    fn default() -> Self {
        Self::new(PrivacyBudget::default())
    }
}

impl PrivacyBudgetLedger {
    /// Create a ledger from an initial budget.
    #[must_use]
    pub fn new(budget: PrivacyBudget) -> Self {
        Self {
            budget,
            total_spent: 0.0,
            history: Vec::new(),
        }
    }

    /// Current budget snapshot.
    #[must_use]
    pub fn status(&self) -> PrivacyBudget {
        self.budget
    }

    /// Remaining epsilon.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.budget.epsilon
    }

    /// Whether epsilon has run out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.budget.is_exhausted()
    }

    /// Epsilon actually deducted since creation, across resets.
    #[must_use]
    pub fn total_spent(&self) -> f64 {
        self.total_spent
    }

    /// Budget events, oldest first.
    #[must_use]
    pub fn history(&self) -> &[BudgetEvent] {
        &self.history
    }

    /// Deduct `amount` from epsilon, clamping at zero.
    ///
    /// Never fails. Negative and NaN amounts are ignored so epsilon cannot
    /// grow through this path.
    pub fn spend(&mut self, amount: f64) {
        if amount.is_nan() || amount <= 0.0 {
            return;
        }
        let before = self.budget.epsilon;
        let after = (before - amount).max(0.0);
        self.budget.epsilon = after;
        self.total_spent += before - after;
        self.record(BudgetEventKind::Spent { amount });

        if after <= 0.0 && before > 0.0 {
            warn!(
                "Privacy budget exhausted. Consider resetting or using stricter privacy parameters."
            );
            self.record(BudgetEventKind::Exhausted);
        }
    }

    /// Overwrite epsilon unconditionally.
    ///
    /// Negative or NaN values are stored as zero, an infinite value is
    /// stored as is.
    pub fn reset(&mut self, new_epsilon: f64) {
        let previous = self.budget.epsilon;
        self.budget.epsilon = if new_epsilon.is_nan() {
            0.0
        } else {
            new_epsilon.max(0.0)
        };
        info!(epsilon = self.budget.epsilon, previous, "privacy budget reset");
        self.record(BudgetEventKind::Reset { previous });
    }

    /// Basic composition: sum of epsilons and max of deltas.
    ///
    /// An empty batch composes to zero cost.
    #[must_use]
    pub fn compose_basic(&self, queries: &[QueryCost]) -> ComposedBudget {
        ComposedBudget {
            epsilon: queries.iter().map(|q| q.epsilon).sum(),
            delta: queries.iter().map(|q| q.delta).fold(0.0, f64::max),
            kind: CompositionKind::Basic,
        }
    }

    /// Advanced composition for `k` queries with `ε_max` the largest epsilon:
    ///
    /// `ε' = sqrt(2k·ln(1/δ'))·ε_max + k·ε_max·(e^ε_max − 1)`
    ///
    /// The returned delta is the ledger's delta plus `delta_prime`.
    ///
    /// # Errors
    /// Returns [`DpError::InvalidParameter`] unless `0 < delta_prime < 1`.
    #[allow(clippy::cast_precision_loss)]
    pub fn compose_advanced(
        &self,
        queries: &[QueryCost],
        delta_prime: f64,
    ) -> Result<ComposedBudget> {
        if delta_prime.is_nan() || delta_prime <= 0.0 || delta_prime >= 1.0 {
            return Err(DpError::invalid(
                "delta_prime",
                format!("{delta_prime} is not in (0, 1)"),
            ));
        }
        let k = queries.len() as f64;
        let eps_max = queries.iter().map(|q| q.epsilon).fold(0.0, f64::max);
        let epsilon = (2.0 * k * (1.0 / delta_prime).ln()).sqrt() * eps_max
            + k * eps_max * eps_max.exp_m1();

        Ok(ComposedBudget {
            epsilon,
            delta: self.budget.delta + delta_prime,
            kind: CompositionKind::Advanced,
        })
    }

    /// Snapshot plus a formatted guarantee string.
    #[must_use]
    pub fn report(&self) -> BudgetReport {
        let PrivacyBudget {
            epsilon,
            delta,
            sensitivity,
        } = self.budget;
        BudgetReport {
            mechanism: MECHANISM_NAME.to_string(),
            epsilon,
            delta,
            sensitivity,
            guarantee: format!("({epsilon}, {delta})-differential privacy"),
            description: REPORT_DESCRIPTION.to_string(),
            exhausted: self.is_exhausted(),
        }
    }

    fn record(&mut self, kind: BudgetEventKind) {
        self.history.push(BudgetEvent {
            kind,
            epsilon_after: self.budget.epsilon,
            at: Utc::now(),
        });
    }
}
