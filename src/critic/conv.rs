//! Convolutional critic.
//!
//! ```text
//! z[c]  = b[c] + conv_K(x)[c]            (same padding, C channels, k×k)
//! D(x)  = Σ_{c,p} w[c,p] · softplus(z[c,p]) + b2
//! ```
//!
//! Flat parameter layout: `K (C·k²) | b (C) | w (C·P) | b2 (1)`.
//!
//! Backward passes, with `s = σ(z)` and `u = w ⊙ s`:
//! - input gradient:  `g = convᵀ(u)`
//! - parameters of D: `dK = kgrad(u, x)`, `db = Σ_p u`, `dw = softplus(z)`, `db2 = 1`
//! - parameters of `P = (‖g‖ − 1)²`, with `v = 2(‖g‖ − 1) g / ‖g‖` and
//!   `r = conv_K(v)`:
//!   `dw = r ⊙ s`, `dz = r ⊙ w ⊙ s(1 − s)`,
//!   `dK = kgrad(u, v) + kgrad(dz, x)`, `db = Σ_p dz`, `db2 = 0`

use super::{Critic, ParameterSet, Regularizer};
use crate::config::CriticConfig;
use crate::core::{softplus, Signal};
use crate::diff::math_grad::{sigmoid_grad_from_sigmoid, softplus_grad};
use crate::diff::penalty::gradient_penalty_term;
use crate::diff::{conv_adjoint, conv_forward, conv_kernel_grad, ConvShape};
use crate::error::{ensure_shape, ReconError, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};

#[derive(Clone, Debug)]
pub struct ConvCritic {
    shape: ConvShape,
    params: ParameterSet,
}

/// Activations of one forward pass.
struct Activations {
    /// Pre-activations `z`.
    z: Vec<f32>,
    /// `σ(z)`.
    s: Vec<f32>,
}

impl ConvCritic {
    pub fn new<R: Rng + ?Sized>(
        input_shape: (usize, usize),
        channels: usize,
        kernel_size: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let (rows, cols) = input_shape;
        if rows == 0 || cols == 0 || channels == 0 {
            return Err(ReconError::Configuration(format!(
                "critic needs a non-empty input and at least one channel, got {rows}x{cols}, {channels} channels"
            )));
        }
        if kernel_size % 2 == 0 {
            return Err(ReconError::Configuration(format!(
                "critic kernel size must be odd, got {kernel_size}"
            )));
        }
        let shape = ConvShape {
            rows,
            cols,
            channels,
            kernel: kernel_size,
        };

        let kernel_std = 1.0 / kernel_size as f32;
        let readout_std = 1.0 / (shape.feature_len() as f32).sqrt();
        let kernel_dist = Normal::new(0.0, kernel_std)
            .map_err(|e| ReconError::Configuration(format!("kernel init: {e}")))?;
        let readout_dist = Normal::new(0.0, readout_std)
            .map_err(|e| ReconError::Configuration(format!("readout init: {e}")))?;

        let mut values = Vec::with_capacity(Self::param_count(&shape));
        values.extend((0..shape.kernel_len()).map(|_| kernel_dist.sample(rng)));
        values.extend(std::iter::repeat(0.0).take(channels));
        values.extend((0..shape.feature_len()).map(|_| readout_dist.sample(rng)));
        values.push(0.0);

        Ok(Self {
            shape,
            params: ParameterSet::new("conv_critic", values),
        })
    }

    pub fn from_config<R: Rng + ?Sized>(
        config: &CriticConfig,
        input_shape: (usize, usize),
        rng: &mut R,
    ) -> Result<Self> {
        Self::new(input_shape, config.channels, config.kernel_size, rng)
    }

    fn param_count(shape: &ConvShape) -> usize {
        shape.kernel_len() + shape.channels + shape.feature_len() + 1
    }

    pub fn conv_shape(&self) -> ConvShape {
        self.shape
    }

    fn split(&self) -> (&[f32], &[f32], &[f32], f32) {
        let v = &self.params.values;
        let nk = self.shape.kernel_len();
        let nc = self.shape.channels;
        let nf = self.shape.feature_len();
        (
            &v[..nk],
            &v[nk..nk + nc],
            &v[nk + nc..nk + nc + nf],
            v[nk + nc + nf],
        )
    }

    fn forward(&self, x: &Signal) -> Result<Activations> {
        ensure_shape((self.shape.rows, self.shape.cols), x.shape())?;
        let (kernels, bias, _, _) = self.split();
        let p = self.shape.pixels();

        let mut z = vec![0.0f32; self.shape.feature_len()];
        conv_forward(&self.shape, kernels, x.as_slice(), &mut z);
        for (c, chunk) in z.chunks_mut(p).enumerate() {
            for v in chunk.iter_mut() {
                *v += bias[c];
            }
        }
        let s = z.iter().map(|v| softplus_grad(*v)).collect();
        Ok(Activations { z, s })
    }

    /// `w ⊙ σ(z)`: cotangent of the feature maps for `D`.
    fn readout_cotangent(&self, act: &Activations) -> Vec<f32> {
        let (_, _, readout, _) = self.split();
        readout.iter().zip(&act.s).map(|(w, s)| w * s).collect()
    }

    fn input_gradient_from(&self, u: &[f32]) -> Signal {
        let (kernels, _, _, _) = self.split();
        let mut g = vec![0.0f32; self.shape.pixels()];
        conv_adjoint(&self.shape, kernels, u, &mut g);
        Signal::from_vec(self.shape.rows, self.shape.cols, g)
    }

    fn check_grad_len(&self, grad: &[f32]) -> Result<()> {
        if grad.len() != self.params.len() {
            return Err(ReconError::ShapeMismatch {
                expected: (self.params.len(), 1),
                actual: (grad.len(), 1),
            });
        }
        Ok(())
    }
}

impl Regularizer for ConvCritic {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn value(&self, x: &Signal) -> Result<f32> {
        let act = self.forward(x)?;
        let (_, _, readout, b2) = self.split();
        let total: f64 = readout
            .iter()
            .zip(&act.z)
            .map(|(w, z)| *w as f64 * softplus(*z) as f64)
            .sum();
        Ok(total as f32 + b2)
    }

    fn gradient(&self, x: &Signal) -> Result<Signal> {
        let act = self.forward(x)?;
        let u = self.readout_cotangent(&act);
        Ok(self.input_gradient_from(&u))
    }
}

impl Critic for ConvCritic {
    fn input_shape(&self) -> (usize, usize) {
        (self.shape.rows, self.shape.cols)
    }

    fn architecture(&self) -> Vec<u32> {
        vec![
            self.shape.rows as u32,
            self.shape.cols as u32,
            self.shape.channels as u32,
            self.shape.kernel as u32,
        ]
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn accumulate_param_grad(&self, x: &Signal, weight: f32, grad: &mut [f32]) -> Result<()> {
        self.check_grad_len(grad)?;
        let act = self.forward(x)?;
        let u = self.readout_cotangent(&act);
        let p = self.shape.pixels();
        let nk = self.shape.kernel_len();
        let nc = self.shape.channels;

        let (dk, rest) = grad.split_at_mut(nk);
        let (db, rest) = rest.split_at_mut(nc);
        let (dw, db2) = rest.split_at_mut(self.shape.feature_len());

        let mut kgrad = vec![0.0f32; nk];
        conv_kernel_grad(&self.shape, &u, x.as_slice(), &mut kgrad);
        for (g, k) in dk.iter_mut().zip(&kgrad) {
            *g += weight * k;
        }
        for (c, chunk) in u.chunks(p).enumerate() {
            let sum: f64 = chunk.iter().map(|v| *v as f64).sum();
            db[c] += weight * sum as f32;
        }
        for (g, z) in dw.iter_mut().zip(&act.z) {
            *g += weight * softplus(*z);
        }
        db2[0] += weight;
        Ok(())
    }

    fn accumulate_penalty_param_grad(
        &self,
        x: &Signal,
        weight: f32,
        grad: &mut [f32],
    ) -> Result<f32> {
        self.check_grad_len(grad)?;
        let act = self.forward(x)?;
        let u = self.readout_cotangent(&act);
        let g = self.input_gradient_from(&u);
        let (penalty, n) = gradient_penalty_term(&g)?;

        let scale = (2.0 * (n - 1.0) / n) as f32;
        let v: Vec<f32> = g.iter().map(|gi| scale * gi).collect();

        let (kernels, _, readout, _) = self.split();
        let mut r = vec![0.0f32; self.shape.feature_len()];
        conv_forward(&self.shape, kernels, &v, &mut r);

        let p = self.shape.pixels();
        let nk = self.shape.kernel_len();
        let nc = self.shape.channels;
        let (dk, rest) = grad.split_at_mut(nk);
        let (db, rest) = rest.split_at_mut(nc);
        let (dw, _db2) = rest.split_at_mut(self.shape.feature_len());

        // Through the feature maps: u = w ⊙ σ(z).
        let mut dz = vec![0.0f32; self.shape.feature_len()];
        for idx in 0..dz.len() {
            let s = act.s[idx];
            dw[idx] += weight * r[idx] * s;
            dz[idx] = r[idx] * readout[idx] * sigmoid_grad_from_sigmoid(s);
        }

        // K appears twice: in convᵀ producing g, and in z.
        let mut kgrad = vec![0.0f32; nk];
        conv_kernel_grad(&self.shape, &u, &v, &mut kgrad);
        conv_kernel_grad(&self.shape, &dz, x.as_slice(), &mut kgrad);
        for (gk, k) in dk.iter_mut().zip(&kgrad) {
            *gk += weight * k;
        }
        for (c, chunk) in dz.chunks(p).enumerate() {
            let sum: f64 = chunk.iter().map(|v| *v as f64).sum();
            db[c] += weight * sum as f32;
        }

        if !penalty.is_finite() || grad.iter().any(|v| !v.is_finite()) {
            return Err(ReconError::DegeneratePenalty(
                "penalty parameter gradient is not finite".to_string(),
            ));
        }
        Ok(penalty)
    }
}
