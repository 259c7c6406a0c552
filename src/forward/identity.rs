//! Denoising: every operator is the identity.

use super::{DifferentiableOp, ForwardModel};
use crate::core::{Measurement, Signal};
use crate::error::{ensure_shape, ReconError, Result};

#[derive(Clone, Debug)]
pub struct Denoising {
    rows: usize,
    cols: usize,
}

impl Denoising {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ReconError::OperatorConstruction(
                "denoising grid must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            rows: size,
            cols: size,
        })
    }

    fn copy_checked(&self, v: &Signal) -> Result<Signal> {
        ensure_shape((self.rows, self.cols), v.shape())?;
        Ok(v.clone())
    }
}

impl ForwardModel for Denoising {
    fn name(&self) -> &str {
        "denoising"
    }

    fn signal_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn measurement_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn operator_norm(&self) -> f32 {
        1.0
    }

    fn forward(&self, signal: &Signal) -> Result<Measurement> {
        self.copy_checked(signal)
    }

    fn adjoint(&self, measurement: &Measurement) -> Result<Signal> {
        self.copy_checked(measurement)
    }

    fn baseline_inverse(&self, measurement: &Measurement) -> Result<Signal> {
        self.copy_checked(measurement)
    }

    fn differentiable_forward(&self) -> DifferentiableOp<'_> {
        DifferentiableOp::forward_of(self)
    }

    fn differentiable_adjoint(&self) -> DifferentiableOp<'_> {
        DifferentiableOp::adjoint_of(self)
    }
}
