//! Wasserstein gradient penalty.
//!
//! For interpolates `x̂ᵢ = εᵢ realᵢ + (1 − εᵢ) fakeᵢ`, `εᵢ ~ U(0, 1)`:
//!   GP = mean_i (‖∇ₓD(x̂ᵢ)‖ − 1)²
//!
//! The penalty is undefined where the input gradient vanishes or is not
//! finite; both cases surface as `DegeneratePenalty`.

use crate::core::{interpolate, norm, Signal};
use crate::critic::Regularizer;
use crate::error::{ensure_shape, ReconError, Result};
use rand::Rng;

/// Norms below this are treated as a vanishing input gradient.
pub const MIN_GRADIENT_NORM: f64 = 1e-12;

/// `(‖g‖ − 1)²` for one input gradient `g`, plus `‖g‖`.
pub fn gradient_penalty_term(input_grad: &Signal) -> Result<(f32, f64)> {
    let n = norm(input_grad);
    if !n.is_finite() {
        return Err(ReconError::DegeneratePenalty(format!(
            "input gradient norm is not finite ({n})"
        )));
    }
    if n < MIN_GRADIENT_NORM {
        return Err(ReconError::DegeneratePenalty(
            "input gradient vanishes at interpolate".to_string(),
        ));
    }
    Ok((((n - 1.0) * (n - 1.0)) as f32, n))
}

/// Draw one interpolation weight per pair and build the interpolates.
pub fn sample_interpolates<R: Rng + ?Sized>(
    real: &[Signal],
    fake: &[Signal],
    rng: &mut R,
) -> Result<Vec<Signal>> {
    if real.len() != fake.len() {
        return Err(ReconError::Configuration(format!(
            "gradient penalty needs paired batches, got {} real and {} fake",
            real.len(),
            fake.len()
        )));
    }
    real.iter()
        .zip(fake)
        .map(|(r, f)| {
            ensure_shape(r.shape(), f.shape())?;
            let eps: f32 = rng.gen_range(0.0..1.0);
            Ok(interpolate(r, f, eps))
        })
        .collect()
}

/// Mean gradient penalty of a critic over a batch of (real, fake) pairs.
pub fn gradient_penalty<R: Rng + ?Sized>(
    critic: &dyn Regularizer,
    real: &[Signal],
    fake: &[Signal],
    rng: &mut R,
) -> Result<f32> {
    let interpolates = sample_interpolates(real, fake, rng)?;
    if interpolates.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0f64;
    for x_hat in &interpolates {
        let g = critic.gradient(x_hat)?;
        let (p, _) = gradient_penalty_term(&g)?;
        total += p as f64;
    }
    Ok((total / interpolates.len() as f64) as f32)
}
