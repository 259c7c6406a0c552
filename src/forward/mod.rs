//! Forward models: the physical measurement process of an inverse problem.
//!
//! Every model exposes a forward operator `A`, its adjoint `A*` and a
//! non-learned baseline inverse. Operators are normalized once at
//! construction so that `‖A‖ ≈ 1`; the normalization is never recomputed.
//!
//! - `identity`: denoising (`A = A* = baseline = I`)
//! - `ray`: parallel-beam geometry and the sparse ray-driven projector
//! - `filter`: Ram-Lak ramp filter for filtered back-projection
//! - `tomography`: normalized CT model built from the two above

pub mod filter;
pub mod identity;
pub mod ray;
pub mod tomography;

pub use identity::Denoising;
pub use ray::{ParallelBeamGeometry, SparseProjector};
pub use tomography::Tomography;

use crate::config::ProblemConfig;
use crate::core::{norm, Measurement, Signal};
use crate::error::{ReconError, Result};
use rayon::prelude::*;

/// Power-iteration budget used when normalizing operators.
pub const OPNORM_MAX_ITERS: usize = 100;
pub const OPNORM_TOL: f64 = 1e-6;

/// A linear measurement process with adjoint and baseline inverse.
///
/// Implementations are stateless after construction and shared read-only
/// across rayon workers.
pub trait ForwardModel: Send + Sync {
    fn name(&self) -> &str;

    /// Shape of the reconstruction grid.
    fn signal_shape(&self) -> (usize, usize);

    /// Shape of a measurement.
    fn measurement_shape(&self) -> (usize, usize);

    /// Norm of the raw operator that was divided out at construction.
    fn operator_norm(&self) -> f32;

    fn forward(&self, signal: &Signal) -> Result<Measurement>;

    fn adjoint(&self, measurement: &Measurement) -> Result<Signal>;

    fn baseline_inverse(&self, measurement: &Measurement) -> Result<Signal>;

    /// `A` as an `(apply, vjp)` pair.
    fn differentiable_forward(&self) -> DifferentiableOp<'_>;

    /// `A*` as an `(apply, vjp)` pair.
    fn differentiable_adjoint(&self) -> DifferentiableOp<'_>;

    fn forward_batch(&self, signals: &[Signal]) -> Result<Vec<Measurement>> {
        signals.par_iter().map(|x| self.forward(x)).collect()
    }

    fn adjoint_batch(&self, measurements: &[Measurement]) -> Result<Vec<Signal>> {
        measurements.par_iter().map(|y| self.adjoint(y)).collect()
    }

    fn baseline_inverse_batch(&self, measurements: &[Measurement]) -> Result<Vec<Signal>> {
        measurements
            .par_iter()
            .map(|y| self.baseline_inverse(y))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Adjoint,
}

/// A linear operator in a gradient-computing context.
///
/// For a linear map the vector-Jacobian product is the transposed map, so
/// `vjp` of the forward operator is the adjoint and vice versa.
#[derive(Clone, Copy)]
pub struct DifferentiableOp<'a> {
    model: &'a dyn ForwardModel,
    direction: Direction,
}

impl<'a> DifferentiableOp<'a> {
    pub fn forward_of(model: &'a dyn ForwardModel) -> Self {
        Self {
            model,
            direction: Direction::Forward,
        }
    }

    pub fn adjoint_of(model: &'a dyn ForwardModel) -> Self {
        Self {
            model,
            direction: Direction::Adjoint,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn input_shape(&self) -> (usize, usize) {
        match self.direction {
            Direction::Forward => self.model.signal_shape(),
            Direction::Adjoint => self.model.measurement_shape(),
        }
    }

    pub fn output_shape(&self) -> (usize, usize) {
        match self.direction {
            Direction::Forward => self.model.measurement_shape(),
            Direction::Adjoint => self.model.signal_shape(),
        }
    }

    pub fn apply(&self, input: &Signal) -> Result<Measurement> {
        match self.direction {
            Direction::Forward => self.model.forward(input),
            Direction::Adjoint => self.model.adjoint(input),
        }
    }

    /// Pull a cotangent on the output back to the input.
    pub fn vjp(&self, cotangent: &Measurement) -> Result<Signal> {
        match self.direction {
            Direction::Forward => self.model.adjoint(cotangent),
            Direction::Adjoint => self.model.forward(cotangent),
        }
    }

    pub fn transpose(&self) -> DifferentiableOp<'a> {
        let direction = match self.direction {
            Direction::Forward => Direction::Adjoint,
            Direction::Adjoint => Direction::Forward,
        };
        Self {
            model: self.model,
            direction,
        }
    }
}

/// Estimate `‖A‖` by power iteration on `A*A`, starting from the all-ones
/// signal.
///
/// `normal` applies `A*A`. Returns `sqrt(λ_max)`.
pub fn power_iteration_opnorm<F>(
    shape: (usize, usize),
    max_iters: usize,
    tol: f64,
    normal: F,
) -> Result<f32>
where
    F: Fn(&Signal) -> Result<Signal>,
{
    let (rows, cols) = shape;
    if rows == 0 || cols == 0 {
        return Err(ReconError::OperatorConstruction(format!(
            "cannot estimate operator norm on empty grid {rows}x{cols}"
        )));
    }

    let mut x = Signal::from_element(rows, cols, 1.0);
    x /= norm(&x) as f32;

    let mut lambda = 0.0f64;
    for iter in 0..max_iters.max(1) {
        let y = normal(&x)?;
        let ny = norm(&y);
        if !ny.is_finite() {
            return Err(ReconError::OperatorConstruction(format!(
                "power iteration diverged at iteration {iter}"
            )));
        }
        if ny == 0.0 {
            return Err(ReconError::OperatorConstruction(
                "operator annihilates the start vector (zero norm)".to_string(),
            ));
        }
        let converged = (ny - lambda).abs() <= tol * ny;
        lambda = ny;
        x = y / ny as f32;
        if converged {
            break;
        }
    }

    let opnorm = lambda.sqrt() as f32;
    if !opnorm.is_finite() || opnorm <= 0.0 {
        return Err(ReconError::OperatorConstruction(format!(
            "invalid operator norm estimate {opnorm}"
        )));
    }
    Ok(opnorm)
}

/// Build the forward model named by a problem definition.
pub fn build_forward_model(problem: &ProblemConfig) -> Result<Box<dyn ForwardModel>> {
    match *problem {
        ProblemConfig::Tomography { size, num_angles } => {
            Ok(Box::new(Tomography::new(size, num_angles)?))
        }
        ProblemConfig::Denoising { size } => Ok(Box::new(Denoising::new(size)?)),
    }
}
