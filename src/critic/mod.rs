//! Regularizers and learned critics.
//!
//! A [`Regularizer`] is any scalar functional `R(x)` with a gradient; the
//! reconstruction engine only needs that. A [`Critic`] is a regularizer with
//! trainable, versioned parameters and the parameter gradients the adversarial
//! trainer needs.

pub mod conv;
pub mod tv;

pub use conv::ConvCritic;
pub use tv::TotalVariation;

use crate::core::Signal;
use crate::error::{ReconError, Result};

pub trait Regularizer: Send + Sync {
    fn name(&self) -> &str;

    fn value(&self, x: &Signal) -> Result<f32>;

    /// `∇ₓR(x)`, same shape as `x`.
    fn gradient(&self, x: &Signal) -> Result<Signal>;
}

/// Flat parameter vector with a version bumped on every optimizer step.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSet {
    pub name: String,
    pub version: u64,
    pub values: Vec<f32>,
}

impl ParameterSet {
    pub fn new(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mark the values as changed.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

pub trait Critic: Regularizer {
    /// Signal shape the critic accepts.
    fn input_shape(&self) -> (usize, usize);

    /// Shape descriptor persisted with checkpoints; a checkpoint only loads
    /// into a critic with the same architecture.
    fn architecture(&self) -> Vec<u32>;

    fn parameters(&self) -> &ParameterSet;

    fn parameters_mut(&mut self) -> &mut ParameterSet;

    /// `grad += weight · ∂D(x)/∂θ`.
    fn accumulate_param_grad(&self, x: &Signal, weight: f32, grad: &mut [f32]) -> Result<()>;

    /// `grad += weight · ∂/∂θ (‖∇ₓD(x)‖ − 1)²`; returns the penalty value.
    fn accumulate_penalty_param_grad(
        &self,
        x: &Signal,
        weight: f32,
        grad: &mut [f32],
    ) -> Result<f32>;

    /// Replace the parameters wholesale (checkpoint resume).
    fn load_parameters(&mut self, architecture: &[u32], params: ParameterSet) -> Result<()> {
        if architecture != self.architecture().as_slice() {
            return Err(ReconError::Checkpoint(format!(
                "architecture mismatch: checkpoint {:?}, critic {:?}",
                architecture,
                self.architecture()
            )));
        }
        if params.len() != self.parameters().len() {
            return Err(ReconError::Checkpoint(format!(
                "parameter count mismatch: checkpoint {}, critic {}",
                params.len(),
                self.parameters().len()
            )));
        }
        *self.parameters_mut() = params;
        Ok(())
    }
}
