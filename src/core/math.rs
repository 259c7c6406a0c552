//! Scalar activation functions used by the critic.

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
///
/// Maps R → (0, 1). It is also the derivative of softplus.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        // Same value, but e^x cannot overflow for very negative x.
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Softplus activation: softplus(x) = ln(1 + e^x)
///
/// Smooth, so the critic has a well-defined second derivative (needed by the
/// gradient-penalty backward pass). Evaluated as max(x, 0) + ln(1 + e^(-|x|))
/// to stay finite for large |x|.
pub fn softplus(x: f32) -> f32 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}
