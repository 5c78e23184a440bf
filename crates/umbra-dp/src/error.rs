//! Error types for the replacement engine.

use thiserror::Error;
use umbra_core::UmbraError;

/// Error types for the replacement engine.
///
/// `BudgetExhausted` and `EmptyCandidateSet` are recoverable: the engine
/// handles them by censoring and never returns them from `replace`. They are
/// still variants so the selector can report why it refused to draw.
#[derive(Debug, Error)]
pub enum DpError {
    /// The engine was used without a required collaborator attached.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Epsilon is zero, probabilistic selection is refused.
    #[error("privacy budget exhausted (epsilon = {epsilon})")]
    BudgetExhausted {
        /// Epsilon observed at selection time
        epsilon: f64,
    },

    /// A mechanism parameter is out of range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Clustering produced no candidates for the token.
    #[error("no replacement candidates available")]
    EmptyCandidateSet,

    /// Reading a taxonomy or embedding file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON taxonomy could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML taxonomy could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A line of a `.vec` embedding file is malformed.
    #[error("malformed embedding at line {line}: {reason}")]
    MalformedEmbedding {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Host configuration was invalid.
    #[error(transparent)]
    Config(#[from] umbra_core::ConfigError),
}

impl DpError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether the engine recovers from this error by censoring.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. } | Self::EmptyCandidateSet)
    }
}

impl From<DpError> for UmbraError {
    fn from(err: DpError) -> Self {
        match err {
            DpError::Config(e) => Self::Config(e),
            DpError::Io(e) => Self::Io(e),
            DpError::InvalidParameter { .. } | DpError::MalformedEmbedding { .. } => {
                Self::Validation(err.to_string())
            }
            other => Self::Privacy(other.to_string()),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, DpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DpError::invalid("epsilon", "must be > 0");
        assert_eq!(err.to_string(), "invalid parameter epsilon: must be > 0");

        let err = DpError::BudgetExhausted { epsilon: 0.0 };
        assert_eq!(err.to_string(), "privacy budget exhausted (epsilon = 0)");
    }

    #[test]
    fn test_recoverable_variants() {
        assert!(DpError::EmptyCandidateSet.is_recoverable());
        assert!(DpError::BudgetExhausted { epsilon: 0.0 }.is_recoverable());
        assert!(!DpError::invalid("delta", "too large").is_recoverable());
        assert!(!DpError::Configuration("no index".into()).is_recoverable());
    }

    #[test]
    fn test_into_umbra_error() {
        let err: UmbraError = DpError::invalid("delta", "too large").into();
        assert!(matches!(err, UmbraError::Validation(_)));

        let err: UmbraError = DpError::Configuration("no index".into()).into();
        assert_eq!(
            err.to_string(),
            "privacy engine error: configuration error: no index"
        );

        let err: UmbraError = DpError::Config(umbra_core::ConfigError::NoConfigDir).into();
        assert!(matches!(err, UmbraError::Config(_)));
    }
}
