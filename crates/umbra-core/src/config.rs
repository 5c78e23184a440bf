//! Configuration management for Umbra.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::SpendPolicy;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/umbra/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial differential-privacy budget
    pub privacy: PrivacyConfig,
    /// Cluster taxonomy and embedding sources
    pub clustering: ClusteringConfig,
    /// Replacement behavior
    pub replacement: ReplacementConfig,
    /// Log filtering
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path.
    ///
    /// Unlike [`AppConfig::load`], a missing file is an error here.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `UMBRA_EPSILON`: Override the initial epsilon
    /// - `UMBRA_DELTA`: Override delta
    /// - `UMBRA_SENSITIVITY`: Override sensitivity
    /// - `UMBRA_SEED`: Fix the random seed (tests and reproducible runs)
    /// - `UMBRA_TAXONOMY`: Path to a cluster taxonomy file
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `UMBRA_*` environment overrides in place.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("UMBRA_EPSILON") {
            if let Ok(epsilon) = val.parse() {
                self.privacy.epsilon = epsilon;
                tracing::debug!("Override privacy.epsilon from env: {}", epsilon);
            }
        }

        if let Ok(val) = std::env::var("UMBRA_DELTA") {
            if let Ok(delta) = val.parse() {
                self.privacy.delta = delta;
                tracing::debug!("Override privacy.delta from env: {}", delta);
            }
        }

        if let Ok(val) = std::env::var("UMBRA_SENSITIVITY") {
            if let Ok(sensitivity) = val.parse() {
                self.privacy.sensitivity = sensitivity;
                tracing::debug!("Override privacy.sensitivity from env: {}", sensitivity);
            }
        }

        if let Ok(val) = std::env::var("UMBRA_SEED") {
            if let Ok(seed) = val.parse() {
                self.replacement.seed = Some(seed);
                tracing::debug!("Override replacement.seed from env: {}", seed);
            }
        }

        if let Ok(val) = std::env::var("UMBRA_TAXONOMY") {
            tracing::debug!("Override clustering.taxonomy_path from env: {}", val);
            self.clustering.taxonomy_path = Some(PathBuf::from(val));
        }
    }

    /// Check value ranges that the engine relies on.
    pub fn validate(&self) -> ConfigResult<()> {
        let privacy = &self.privacy;
        if !privacy.epsilon.is_finite() || privacy.epsilon < 0.0 {
            return Err(ConfigError::invalid(
                "privacy.epsilon",
                "must be a finite value >= 0",
            ));
        }
        if !(0.0..1.0).contains(&privacy.delta) {
            return Err(ConfigError::invalid("privacy.delta", "must be in [0, 1)"));
        }
        if !privacy.sensitivity.is_finite() || privacy.sensitivity <= 0.0 {
            return Err(ConfigError::invalid(
                "privacy.sensitivity",
                "must be a finite value > 0",
            ));
        }

        let replacement = &self.replacement;
        if !replacement.epsilon_per_replacement.is_finite()
            || replacement.epsilon_per_replacement < 0.0
        {
            return Err(ConfigError::invalid(
                "replacement.epsilon_per_replacement",
                "must be a finite value >= 0",
            ));
        }
        if replacement.mask_char.is_whitespace() {
            return Err(ConfigError::invalid(
                "replacement.mask_char",
                "must not be whitespace",
            ));
        }

        let weights = &replacement.weights;
        for (field, value) in [
            ("replacement.weights.semantic", weights.semantic),
            ("replacement.weights.length", weights.length),
            ("replacement.weights.context", weights.context),
            ("replacement.weights.jitter", weights.jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, "must be a finite value >= 0"));
            }
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config_dir = path
            .parent()
            .ok_or_else(|| ConfigError::invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/umbra/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "umbra", "umbra").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path, where taxonomy and embedding files live
    /// by convention.
    ///
    /// Uses XDG base directories: `~/.local/share/umbra`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "umbra", "umbra").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Initial (ε, δ, sensitivity) handed to the budget ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Privacy budget epsilon
    pub epsilon: f64,
    /// Probability of the guarantee failing
    pub delta: f64,
    /// Global sensitivity of the utility function
    pub sensitivity: f64,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            delta: 0.001,
            sensitivity: 1.0,
        }
    }
}

/// Where cluster data comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Taxonomy file (`.toml` or `.json`) replacing the built-in clusters
    pub taxonomy_path: Option<PathBuf>,
    /// Word vectors in fastText `.vec` text format
    pub embeddings_path: Option<PathBuf>,
}

/// Replacement behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementConfig {
    /// Character used when a token has to be censored
    pub mask_char: char,
    /// When epsilon is deducted for a replacement
    pub spend_policy: SpendPolicy,
    /// Epsilon deducted per replacement under the active policy
    pub epsilon_per_replacement: f64,
    /// Fixed seed for both random sources; `None` seeds from OS entropy
    pub seed: Option<u64>,
    /// Utility score weights
    pub weights: WeightsConfig,
}

impl Default for ReplacementConfig {
    fn default() -> Self {
        Self {
            mask_char: '*',
            spend_policy: SpendPolicy::OnAccept,
            epsilon_per_replacement: 0.1,
            seed: None,
            weights: WeightsConfig::default(),
        }
    }
}

/// Weights of the four utility terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    /// Weight of semantic similarity
    pub semantic: f64,
    /// Weight of length proximity
    pub length: f64,
    /// Weight of contextual fit
    pub context: f64,
    /// Weight of the random tie-break jitter
    pub jitter: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            length: 0.3,
            context: 0.2,
            jitter: 0.1,
        }
    }
}

/// Log filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,umbra=debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!((config.privacy.epsilon - 1.0).abs() < f64::EPSILON);
        assert!((config.privacy.delta - 0.001).abs() < f64::EPSILON);
        assert!((config.privacy.sensitivity - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.replacement.mask_char, '*');
        assert!(config.clustering.taxonomy_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = WeightsConfig::default();
        let sum = w.semantic + w.length + w.context + w.jitter;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[privacy]"));
        assert!(toml_str.contains("[replacement]"));
        assert!(toml_str.contains("spend_policy = \"on_accept\""));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.replacement.spend_policy, config.replacement.spend_policy);
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.privacy.epsilon = 2.5;
        config.replacement.spend_policy = SpendPolicy::PerReplacement;
        config.replacement.seed = Some(42);

        config.save_to(&config_path).expect("save config");
        let loaded = AppConfig::load_from(&config_path).expect("load config");

        assert!((loaded.privacy.epsilon - 2.5).abs() < f64::EPSILON);
        assert_eq!(loaded.replacement.spend_policy, SpendPolicy::PerReplacement);
        assert_eq!(loaded.replacement.seed, Some(42));
    }

    #[test]
    fn test_load_from_missing_path() {
        let tmp = TempDir::new().expect("create temp dir");
        let result = AppConfig::load_from(&tmp.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_load_from_rejects_invalid_delta() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");
        fs::write(&config_path, "[privacy]\ndelta = 1.5\n").expect("write config file");

        let result = AppConfig::load_from(&config_path);
        match result {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "privacy.delta"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.privacy.sensitivity = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.privacy.epsilon = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.replacement.weights.jitter = -0.1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.replacement.mask_char = ' ';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("UMBRA_EPSILON", "0.5");
        std::env::set_var("UMBRA_SEED", "7");
        std::env::set_var("UMBRA_DELTA", "not-a-number");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert!((config.privacy.epsilon - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.replacement.seed, Some(7));
        // Unparseable values are ignored
        assert!((config.privacy.delta - 0.001).abs() < f64::EPSILON);

        std::env::remove_var("UMBRA_EPSILON");
        std::env::remove_var("UMBRA_SEED");
        std::env::remove_var("UMBRA_DELTA");
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r##"
[privacy]
epsilon = 3.0

[replacement]
mask_char = "#"

[replacement.weights]
jitter = 0.0
"##;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert!((config.privacy.epsilon - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.replacement.mask_char, '#');
        assert!(config.replacement.weights.jitter.abs() < f64::EPSILON);
        // These should be defaults
        assert!((config.privacy.delta - 0.001).abs() < f64::EPSILON);
        assert!((config.replacement.weights.semantic - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.replacement.spend_policy, SpendPolicy::OnAccept);
    }
}
