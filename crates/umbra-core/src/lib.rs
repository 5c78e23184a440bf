//! Umbra Core - Foundation crate for the Umbra replacement engine.
//!
//! This crate provides the configuration surface and shared types that the
//! differential-privacy engine and the command line shell both depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Shared enums (`NoiseMechanism`, `SpendPolicy`)
//!
//! # Example
//!
//! ```rust
//! use umbra_core::{AppConfig, SpendPolicy};
//!
//! let config = AppConfig::default();
//! assert!((config.privacy.epsilon - 1.0).abs() < f64::EPSILON);
//! assert_eq!(config.replacement.spend_policy, SpendPolicy::OnAccept);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, ClusteringConfig, LoggingConfig, PrivacyConfig, ReplacementConfig, WeightsConfig,
};
pub use error::{ConfigError, ConfigResult, Result, UmbraError};
pub use types::{NoiseMechanism, SpendPolicy};
