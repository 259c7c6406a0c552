//! Data-fidelity term `½‖Ax − y‖²` and its gradient `A*(Ax − y)`.

use crate::core::{squared_norm, Measurement, Signal};
use crate::error::{ensure_shape, Result};
use crate::forward::ForwardModel;

/// `½‖Ax − y‖²`.
pub fn data_fidelity(model: &dyn ForwardModel, x: &Signal, y: &Measurement) -> Result<f64> {
    ensure_shape(model.measurement_shape(), y.shape())?;
    let residual = model.forward(x)? - y;
    Ok(0.5 * squared_norm(&residual))
}

/// Value and gradient of the data-fidelity term, through the operator's
/// `(apply, vjp)` pair.
pub fn data_fidelity_with_grad(
    model: &dyn ForwardModel,
    x: &Signal,
    y: &Measurement,
) -> Result<(f64, Signal)> {
    ensure_shape(model.measurement_shape(), y.shape())?;
    let op = model.differentiable_forward();
    let residual = op.apply(x)? - y;
    let value = 0.5 * squared_norm(&residual);
    let grad = op.vjp(&residual)?;
    Ok((value, grad))
}
