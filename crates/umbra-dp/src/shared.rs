//! Thread-safe handle to a replacement engine.

use crate::engine::{Replacement, ReplacementEngine, ReplacementStats};
use crate::error::Result;
use crate::ledger::{BudgetReport, PrivacyBudget};
use crate::noise::NoiseMechanism;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cloneable handle sharing one engine across threads.
///
/// Anything that draws randomness or touches the budget takes the write
/// lock; pure lookups take the read lock. Every engine mutation leaves the
/// ledger consistent, so a poisoned lock is recovered rather than propagated.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    engine: Arc<RwLock<ReplacementEngine>>,
}

impl SharedEngine {
    /// Wrap an engine.
    #[must_use]
    pub fn new(engine: ReplacementEngine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ReplacementEngine> {
        self.engine.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReplacementEngine> {
        self.engine.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`ReplacementEngine::replace`].
    pub fn replace(&self, token: &str, context: Option<&str>) -> Result<String> {
        self.write().replace(token, context)
    }

    /// See [`ReplacementEngine::suggest`].
    pub fn suggest(&self, token: &str, context: Option<&str>) -> Result<Replacement> {
        self.write().suggest(token, context)
    }

    /// See [`ReplacementEngine::accept`].
    pub fn accept(&self, replacement: &Replacement) -> bool {
        self.write().accept(replacement)
    }

    /// See [`ReplacementEngine::perturb_numeric`].
    pub fn perturb_numeric(
        &self,
        value: f64,
        sensitivity: f64,
        epsilon: f64,
        delta: Option<f64>,
        mechanism: NoiseMechanism,
    ) -> Result<f64> {
        self.write().perturb_numeric(value, sensitivity, epsilon, delta, mechanism)
    }

    /// See [`ReplacementEngine::spend`].
    pub fn spend(&self, amount: f64) {
        self.write().spend(amount);
    }

    /// See [`ReplacementEngine::reset`].
    pub fn reset(&self, new_epsilon: f64) {
        self.write().reset(new_epsilon);
    }

    /// See [`ReplacementEngine::add_token`].
    pub fn add_token(&self, token: &str, category: &str) -> Result<bool> {
        self.write().add_token(token, category)
    }

    /// See [`ReplacementEngine::find_candidates`].
    pub fn find_candidates(&self, token: &str) -> Result<Vec<String>> {
        self.read().find_candidates(token)
    }

    /// See [`ReplacementEngine::budget_status`].
    #[must_use]
    pub fn budget_status(&self) -> PrivacyBudget {
        self.read().budget_status()
    }

    /// See [`ReplacementEngine::report`].
    #[must_use]
    pub fn report(&self) -> BudgetReport {
        self.read().report()
    }

    /// See [`ReplacementEngine::cluster_stats`].
    pub fn cluster_stats(&self) -> Result<BTreeMap<String, usize>> {
        self.read().cluster_stats()
    }

    /// See [`ReplacementEngine::stats`].
    #[must_use]
    pub fn stats(&self) -> ReplacementStats {
        self.read().stats()
    }
}

impl From<ReplacementEngine> for SharedEngine {
    fn from(engine: ReplacementEngine) -> Self {
        Self::new(engine)
    }
}
