//! Reconstruction quality metrics and per-run evaluation reports.
//!
//! Scores are "higher is better" so the hyperparameter search can maximize
//! any metric.

use crate::core::{distance, squared_norm, Signal};
use crate::error::{ensure_shape, ReconError, Result};
use crate::optim::reconstruct::Reconstruction;
use tracing::info;

pub trait QualityMetric: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, truth: &Signal, candidate: &Signal) -> Result<f64>;
}

/// `−‖truth − candidate‖`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NegativeL2;

impl QualityMetric for NegativeL2 {
    fn name(&self) -> &str {
        "neg_l2"
    }

    fn score(&self, truth: &Signal, candidate: &Signal) -> Result<f64> {
        ensure_shape(truth.shape(), candidate.shape())?;
        Ok(-distance(truth, candidate))
    }
}

/// Peak signal-to-noise ratio in dB.
///
/// The peak is `data_range` when given, otherwise the dynamic range of the
/// ground truth (1.0 for a constant image). Identical images score `+∞`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Psnr {
    pub data_range: Option<f32>,
}

impl QualityMetric for Psnr {
    fn name(&self) -> &str {
        "psnr"
    }

    fn score(&self, truth: &Signal, candidate: &Signal) -> Result<f64> {
        ensure_shape(truth.shape(), candidate.shape())?;
        let mse = squared_norm(&(truth - candidate)) / truth.len().max(1) as f64;
        if mse == 0.0 {
            return Ok(f64::INFINITY);
        }
        let peak = match self.data_range {
            Some(r) => r as f64,
            None => {
                let range = (truth.max() - truth.min()) as f64;
                if range > 0.0 {
                    range
                } else {
                    1.0
                }
            }
        };
        Ok(10.0 * (peak * peak / mse).log10())
    }
}

/// Mean score over paired truths and candidates.
pub fn mean_score(
    metric: &dyn QualityMetric,
    truths: &[Signal],
    candidates: &[Signal],
) -> Result<f64> {
    if truths.len() != candidates.len() || truths.is_empty() {
        return Err(ReconError::Configuration(format!(
            "metric needs a non-empty paired batch, got {} truths and {} candidates",
            truths.len(),
            candidates.len()
        )));
    }
    let mut total = 0.0;
    for (t, c) in truths.iter().zip(candidates) {
        total += metric.score(t, c)?;
    }
    Ok(total / truths.len() as f64)
}

/// Quality along one reconstruction: baseline, snapshots and final iterate.
#[derive(Clone, Debug)]
pub struct EvaluationReport {
    pub metric: String,
    pub baseline: f64,
    pub snapshots: Vec<(usize, f64)>,
    pub final_score: f64,
    pub steps_run: usize,
}

impl EvaluationReport {
    /// Final score minus baseline score.
    pub fn improvement(&self) -> f64 {
        self.final_score - self.baseline
    }
}

pub fn evaluate_reconstruction(
    metric: &dyn QualityMetric,
    truth: &Signal,
    baseline: &Signal,
    reconstruction: &Reconstruction,
) -> Result<EvaluationReport> {
    let baseline_score = metric.score(truth, baseline)?;
    let snapshots = reconstruction
        .snapshots
        .iter()
        .map(|(step, x)| Ok((*step, metric.score(truth, x)?)))
        .collect::<Result<Vec<_>>>()?;
    let final_score = metric.score(truth, &reconstruction.iterate)?;

    for (step, score) in &snapshots {
        info!(metric = metric.name(), step, score, "snapshot quality");
    }
    info!(
        metric = metric.name(),
        baseline = baseline_score,
        final_score,
        steps = reconstruction.steps_run,
        "reconstruction quality"
    );

    Ok(EvaluationReport {
        metric: metric.name().to_string(),
        baseline: baseline_score,
        snapshots,
        final_score,
        steps_run: reconstruction.steps_run,
    })
}
