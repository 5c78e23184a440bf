//! Shared enums used by the engine and its configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Additive noise mechanism for scalar queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMechanism {
    /// Laplace noise calibrated to `sensitivity / epsilon`, pure ε-DP
    Laplace,
    /// Gaussian noise calibrated to (ε, δ)
    Gaussian,
}

impl NoiseMechanism {
    /// Get the string representation of the mechanism.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Laplace => "laplace",
            Self::Gaussian => "gaussian",
        }
    }
}

impl fmt::Display for NoiseMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoiseMechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "laplace" => Ok(Self::Laplace),
            "gaussian" => Ok(Self::Gaussian),
            other => Err(format!("unknown noise mechanism '{other}'")),
        }
    }
}

/// When the engine deducts epsilon for a replacement drawn by the
/// exponential mechanism.
///
/// Censored fallbacks never spend budget under any policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendPolicy {
    /// Never spend automatically; the host calls `spend` itself
    Manual,
    /// Spend after every mechanism-selected replacement
    PerReplacement,
    /// Spend when the host accepts a suggested replacement
    #[default]
    OnAccept,
}

impl SpendPolicy {
    /// Get the string representation of the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::PerReplacement => "per_replacement",
            Self::OnAccept => "on_accept",
        }
    }
}

impl fmt::Display for SpendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpendPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "per_replacement" => Ok(Self::PerReplacement),
            "on_accept" => Ok(Self::OnAccept),
            other => Err(format!("unknown spend policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mechanism_serialization() {
        let json = serde_json::to_string(&NoiseMechanism::Gaussian).expect("serialize mechanism");
        assert_eq!(json, r#""gaussian""#);

        let parsed: NoiseMechanism =
            serde_json::from_str(r#""laplace""#).expect("deserialize mechanism");
        assert_eq!(parsed, NoiseMechanism::Laplace);
    }

    #[test]
    fn test_mechanism_from_str() {
        assert_eq!("Laplace".parse::<NoiseMechanism>(), Ok(NoiseMechanism::Laplace));
        assert!("uniform".parse::<NoiseMechanism>().is_err());
    }

    #[test]
    fn test_spend_policy_round_trip_names() {
        for policy in [
            SpendPolicy::Manual,
            SpendPolicy::PerReplacement,
            SpendPolicy::OnAccept,
        ] {
            assert_eq!(policy.as_str().parse::<SpendPolicy>(), Ok(policy));
        }
        assert_eq!(SpendPolicy::default(), SpendPolicy::OnAccept);
    }
}
