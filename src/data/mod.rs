//! Training and evaluation data.
//!
//! A [`DataSource`] yields batches of ground truth, the noisy measurements
//! simulated from it, and the baseline inverse of those measurements.
//! [`PhantomSource`] is the synthetic source: random ellipse phantoms pushed
//! through a forward model.

use crate::core::{random_ellipse_phantom, Measurement, Signal};
use crate::error::{ReconError, Result};
use crate::forward::ForwardModel;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Training,
    Evaluation,
}

#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub signals: Vec<Signal>,
    pub measurements: Vec<Measurement>,
    pub baselines: Vec<Signal>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

pub trait DataSource {
    fn next_batch(&mut self, batch_size: usize, split: Split) -> Result<Batch>;
}

/// `forward(x) + noise_level · N(0, 1)` per entry.
pub fn simulate_measurement<R: Rng + ?Sized>(
    model: &dyn ForwardModel,
    signal: &Signal,
    noise_level: f32,
    rng: &mut R,
) -> Result<Measurement> {
    let clean = model.forward(signal)?;
    add_noise(clean, noise_level, rng)
}

fn add_noise<R: Rng + ?Sized>(
    mut clean: Measurement,
    noise_level: f32,
    rng: &mut R,
) -> Result<Measurement> {
    if noise_level == 0.0 {
        return Ok(clean);
    }
    let normal = Normal::new(0.0f32, noise_level)
        .map_err(|e| ReconError::Configuration(format!("noise_level {noise_level}: {e}")))?;
    for v in clean.iter_mut() {
        *v += normal.sample(rng);
    }
    Ok(clean)
}

/// Random ellipse phantoms with independent seeded streams per split.
pub struct PhantomSource<'m> {
    model: &'m dyn ForwardModel,
    noise_level: f32,
    max_ellipses: usize,
    train_rng: StdRng,
    eval_rng: StdRng,
}

impl<'m> PhantomSource<'m> {
    pub fn new(model: &'m dyn ForwardModel, noise_level: f32, seed: u64) -> Result<Self> {
        if !(noise_level.is_finite() && noise_level >= 0.0) {
            return Err(ReconError::Configuration(format!(
                "noise_level must be finite and >= 0, got {noise_level}"
            )));
        }
        Ok(Self {
            model,
            noise_level,
            max_ellipses: 5,
            train_rng: StdRng::seed_from_u64(seed),
            eval_rng: StdRng::seed_from_u64(seed ^ 0x5eed_e7a1),
        })
    }

    pub fn with_max_ellipses(mut self, max_ellipses: usize) -> Self {
        self.max_ellipses = max_ellipses.max(1);
        self
    }
}

impl DataSource for PhantomSource<'_> {
    fn next_batch(&mut self, batch_size: usize, split: Split) -> Result<Batch> {
        let (rows, cols) = self.model.signal_shape();
        let rng = match split {
            Split::Training => &mut self.train_rng,
            Split::Evaluation => &mut self.eval_rng,
        };

        let signals: Vec<Signal> = (0..batch_size)
            .map(|_| random_ellipse_phantom(rows, cols, self.max_ellipses, rng))
            .collect();
        let clean = self.model.forward_batch(&signals)?;
        let measurements = clean
            .into_iter()
            .map(|y| add_noise(y, self.noise_level, rng))
            .collect::<Result<Vec<_>>>()?;
        let baselines = self.model.baseline_inverse_batch(&measurements)?;

        Ok(Batch {
            signals,
            measurements,
            baselines,
        })
    }
}
