//! Differentiable operations (backward passes).
//!
//! Gradients are hand-derived vector-Jacobian products, verified by the
//! finite-difference checks in `tests/gradient_check.rs`.

pub mod conv_grad;
pub mod fidelity_grad;
pub mod math_grad;
pub mod penalty;

pub use conv_grad::{conv_adjoint, conv_forward, conv_kernel_grad, ConvShape};
pub use fidelity_grad::{data_fidelity, data_fidelity_with_grad};
pub use penalty::{gradient_penalty, gradient_penalty_term, sample_interpolates};
