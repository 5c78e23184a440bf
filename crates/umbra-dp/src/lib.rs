//! Umbra DP - Differentially-private token replacement.
//!
//! Replaces sensitive tokens with semantically related alternatives drawn by
//! the exponential mechanism, and perturbs numeric values with Laplace or
//! Gaussian noise. A single ledger tracks the remaining privacy budget.
//!
//! # Modules
//!
//! - [`cluster`] - Category taxonomy and candidate lookup
//! - [`similarity`] - Ordered similarity strategies (embeddings, edit distance)
//! - [`embeddings`] - Word vector table loaded from `.vec` files
//! - [`utility`] - Candidate utility scoring
//! - [`selector`] - Exponential mechanism and censoring fallback
//! - [`ledger`] - Privacy budget, composition and reporting
//! - [`noise`] - Laplace and Gaussian mechanisms
//! - [`engine`] - The replacement engine facade
//! - [`shared`] - Thread-safe engine handle
//!
//! # Example
//!
//! ```rust
//! use umbra_dp::{ClusterIndex, ReplacementEngine};
//!
//! # fn main() -> Result<(), umbra_dp::DpError> {
//! let mut engine = ReplacementEngine::builder()
//!     .index(ClusterIndex::new())
//!     .seed(42)
//!     .build()?;
//!
//! let countries = engine.find_candidates("Canada")?;
//! let replacement = engine.replace("Canada", None)?;
//! assert!(countries.contains(&replacement));
//!
//! engine.reset(0.0);
//! assert_eq!(engine.replace("Canada", None)?, "******");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cluster;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod noise;
pub mod selector;
pub mod shared;
pub mod similarity;
pub mod utility;

// Re-export commonly used types
pub use cluster::{Category, ClusterIndex, Taxonomy};
pub use embeddings::EmbeddingTable;
pub use engine::{
    CensorReason, Replacement, ReplacementEngine, ReplacementEngineBuilder, ReplacementMethod,
    ReplacementStats,
};
pub use error::{DpError, Result};
pub use ledger::{
    BudgetEvent, BudgetEventKind, BudgetReport, ComposedBudget, CompositionKind, PrivacyBudget,
    PrivacyBudgetLedger, QueryCost,
};
pub use noise::{NoiseMechanism, ScalarQuery};
pub use selector::{censor, ExponentialSelector, Selection};
pub use shared::SharedEngine;
pub use similarity::{
    EditDistanceSimilarity, EmbeddingSimilarity, SimilarityChain, SimilarityStrategy,
};
pub use umbra_core::SpendPolicy;
pub use utility::{ScoringWeights, UtilityScorer};
