//! Additive noise for numeric values.
//!
//! Laplace noise is drawn by inverse CDF, Gaussian noise by Box–Muller.
//! Neither mechanism touches the privacy budget; callers that want the cost
//! recorded spend it on the ledger themselves.

use crate::error::{DpError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub use umbra_core::NoiseMechanism;

fn check_sensitivity(sensitivity: f64) -> Result<()> {
    if !sensitivity.is_finite() || sensitivity <= 0.0 {
        return Err(DpError::invalid(
            "sensitivity",
            format!("{sensitivity} is not > 0"),
        ));
    }
    Ok(())
}

fn check_epsilon(epsilon: f64) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(DpError::invalid("epsilon", format!("{epsilon} is not > 0")));
    }
    Ok(())
}

/// Laplace scale `b = sensitivity / epsilon`.
///
/// # Errors
/// Returns [`DpError::InvalidParameter`] unless both inputs are finite and
/// strictly positive.
pub fn laplace_scale(sensitivity: f64, epsilon: f64) -> Result<f64> {
    check_sensitivity(sensitivity)?;
    check_epsilon(epsilon)?;
    Ok(sensitivity / epsilon)
}

/// Gaussian standard deviation `σ = sqrt(2·ln(1.25/δ))·sensitivity / epsilon`.
///
/// # Errors
/// Returns [`DpError::InvalidParameter`] for a non-positive sensitivity or
/// epsilon, or a delta outside `(0, 1)`.
pub fn gaussian_sigma(sensitivity: f64, epsilon: f64, delta: f64) -> Result<f64> {
    check_sensitivity(sensitivity)?;
    check_epsilon(epsilon)?;
    if delta.is_nan() || delta <= 0.0 || delta >= 1.0 {
        return Err(DpError::invalid("delta", format!("{delta} is not in (0, 1)")));
    }
    Ok((2.0 * (1.25 / delta).ln()).sqrt() * sensitivity / epsilon)
}

/// One Laplace draw with the given scale, centred at zero.
pub fn sample_laplace<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.gen::<f64>() - 0.5;
    // u = -0.5 would hit ln(0)
    let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    scale * u.signum() * tail.ln()
}

/// One standard-normal draw scaled by `sigma`, centred at zero.
pub fn sample_gaussian<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    let mut u1: f64 = rng.gen();
    while u1 == 0.0 {
        u1 = rng.gen();
    }
    let u2: f64 = rng.gen();
    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// `value` plus Laplace noise with scale `sensitivity / epsilon`.
///
/// # Errors
/// See [`laplace_scale`].
pub fn laplace<R: Rng + ?Sized>(
    rng: &mut R,
    value: f64,
    sensitivity: f64,
    epsilon: f64,
) -> Result<f64> {
    let scale = laplace_scale(sensitivity, epsilon)?;
    Ok(value + sample_laplace(rng, scale))
}

/// `value` plus Gaussian noise calibrated for (ε, δ)-DP.
///
/// # Errors
/// See [`gaussian_sigma`].
pub fn gaussian<R: Rng + ?Sized>(
    rng: &mut R,
    value: f64,
    sensitivity: f64,
    epsilon: f64,
    delta: f64,
) -> Result<f64> {
    let sigma = gaussian_sigma(sensitivity, epsilon, delta)?;
    Ok(value + sample_gaussian(rng, sigma))
}

/// A numeric value to release under one of the noise mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarQuery {
    /// True value
    pub value: f64,
    /// Sensitivity of the value
    pub sensitivity: f64,
    /// Epsilon for this release
    pub epsilon: f64,
    /// Delta, required by the Gaussian mechanism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    /// Mechanism to apply
    pub mechanism: NoiseMechanism,
}

impl ScalarQuery {
    /// Laplace release of `value`.
    #[must_use]
    pub fn laplace(value: f64, sensitivity: f64, epsilon: f64) -> Self {
        Self {
            value,
            sensitivity,
            epsilon,
            delta: None,
            mechanism: NoiseMechanism::Laplace,
        }
    }

    /// Gaussian release of `value`.
    #[must_use]
    pub fn gaussian(value: f64, sensitivity: f64, epsilon: f64, delta: f64) -> Self {
        Self {
            value,
            sensitivity,
            epsilon,
            delta: Some(delta),
            mechanism: NoiseMechanism::Gaussian,
        }
    }

    /// Draw a noisy release.
    ///
    /// # Errors
    /// Returns [`DpError::InvalidParameter`] for out-of-range parameters,
    /// including a Gaussian query with no delta.
    pub fn perturb<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        match self.mechanism {
            NoiseMechanism::Laplace => laplace(rng, self.value, self.sensitivity, self.epsilon),
            NoiseMechanism::Gaussian => {
                let delta = self.delta.ok_or_else(|| {
                    DpError::invalid("delta", "required by the Gaussian mechanism")
                })?;
                gaussian(rng, self.value, self.sensitivity, self.epsilon, delta)
            }
        }
    }
}
