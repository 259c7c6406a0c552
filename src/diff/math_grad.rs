//! Derivatives of the scalar activations in `core::math`.
//!
//! The critic applies softplus pointwise, so its first and second derivatives
//! are all the backward passes need:
//!   softplus'(x)  = σ(x)
//!   softplus''(x) = σ(x) · (1 - σ(x))

use crate::core::sigmoid;

/// Derivative of sigmoid σ(x) = 1 / (1 + e^{-x}) with respect to x.
///
/// dσ/dx = σ(x) * (1 - σ(x))
pub fn sigmoid_grad_from_sigmoid(sigmoid_x: f32) -> f32 {
    sigmoid_x * (1.0 - sigmoid_x)
}

/// d/dx softplus(x).
pub fn softplus_grad(x: f32) -> f32 {
    sigmoid(x)
}
