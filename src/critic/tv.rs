//! Smoothed isotropic total variation, a fixed (non-learned) regularizer.
//!
//! ```text
//! TV_ε(x) = Σ_{i,j} sqrt(dx² + dy² + ε²)
//! dx = x[i, j+1] − x[i, j],  dy = x[i+1, j] − x[i, j]
//! ```
//!
//! Forward differences with a Neumann boundary (differences across the last
//! row/column are zero).

use super::Regularizer;
use crate::core::Signal;
use crate::error::{ReconError, Result};

#[derive(Clone, Debug)]
pub struct TotalVariation {
    epsilon: f32,
}

impl TotalVariation {
    pub fn new(epsilon: f32) -> Result<Self> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(ReconError::Configuration(format!(
                "TV smoothing must be > 0, got {epsilon}"
            )));
        }
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    fn differences(x: &Signal, i: usize, j: usize) -> (f32, f32) {
        let (rows, cols) = x.shape();
        let dx = if j + 1 < cols { x[(i, j + 1)] - x[(i, j)] } else { 0.0 };
        let dy = if i + 1 < rows { x[(i + 1, j)] - x[(i, j)] } else { 0.0 };
        (dx, dy)
    }
}

impl Regularizer for TotalVariation {
    fn name(&self) -> &str {
        "total_variation"
    }

    fn value(&self, x: &Signal) -> Result<f32> {
        let e2 = self.epsilon * self.epsilon;
        let mut total = 0.0f64;
        for j in 0..x.ncols() {
            for i in 0..x.nrows() {
                let (dx, dy) = Self::differences(x, i, j);
                total += ((dx * dx + dy * dy + e2) as f64).sqrt();
            }
        }
        Ok(total as f32)
    }

    fn gradient(&self, x: &Signal) -> Result<Signal> {
        let (rows, cols) = x.shape();
        let e2 = self.epsilon * self.epsilon;
        let mut grad = Signal::zeros(rows, cols);
        for j in 0..cols {
            for i in 0..rows {
                let (dx, dy) = Self::differences(x, i, j);
                let m = (dx * dx + dy * dy + e2).sqrt();
                let (gx, gy) = (dx / m, dy / m);
                grad[(i, j)] -= gx + gy;
                if j + 1 < cols {
                    grad[(i, j + 1)] += gx;
                }
                if i + 1 < rows {
                    grad[(i + 1, j)] += gy;
                }
            }
        }
        Ok(grad)
    }
}
