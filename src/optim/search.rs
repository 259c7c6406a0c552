//! Trade-off weight (`mu`) calibration.
//!
//! Each candidate is scored by one full reconstruction of a held-out batch;
//! the best mean quality wins. Strategies:
//! - explicit candidate list, evaluated exhaustively
//! - geometric grid between two bounds
//! - bracketing (ternary) search in log space for unimodal responses

use crate::core::{Measurement, Signal};
use crate::error::{ReconError, Result};
use crate::eval::{mean_score, QualityMetric};
use crate::optim::reconstruct::{ReconstructionSchedule, Reconstructor};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq)]
pub enum SearchStrategy {
    Candidates(Vec<f32>),
    Geometric { min: f32, max: f32, count: usize },
    Bracket { lo: f32, hi: f32, iterations: usize },
}

impl SearchStrategy {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        match self {
            SearchStrategy::Candidates(c) => {
                if c.is_empty() {
                    return Err(ReconError::Configuration(
                        "candidate set is empty".to_string(),
                    ));
                }
                if let Some(bad) = c.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                    return Err(ReconError::Configuration(format!(
                        "mu candidates must be finite and >= 0, got {bad}"
                    )));
                }
            }
            SearchStrategy::Geometric { min, max, count } => {
                if !(positive(*min) && positive(*max) && min <= max && *count > 0) {
                    return Err(ReconError::Configuration(format!(
                        "geometric grid needs 0 < min <= max and count > 0, got {min}..{max} x{count}"
                    )));
                }
            }
            SearchStrategy::Bracket { lo, hi, .. } => {
                if !(positive(*lo) && positive(*hi) && lo < hi) {
                    return Err(ReconError::Configuration(format!(
                        "bracket needs 0 < lo < hi, got [{lo}, {hi}]"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Discrete candidate set in ascending order (`None` for bracketing).
    pub fn grid(&self) -> Option<Vec<f32>> {
        match self {
            SearchStrategy::Candidates(c) => {
                let mut c = c.clone();
                c.sort_by(|a, b| a.total_cmp(b));
                c.dedup();
                Some(c)
            }
            SearchStrategy::Geometric { min, max, count } => {
                if *count == 1 {
                    return Some(vec![*min]);
                }
                let (lmin, lmax) = (min.ln(), max.ln());
                let step = (lmax - lmin) / (*count - 1) as f32;
                Some(
                    (0..*count)
                        .map(|i| (lmin + step * i as f32).exp())
                        .collect(),
                )
            }
            SearchStrategy::Bracket { .. } => None,
        }
    }
}

/// One evaluated candidate; `score` is `None` when the evaluation failed.
#[derive(Clone, Debug, PartialEq)]
pub struct Trial {
    pub mu: f32,
    pub score: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub best_mu: f32,
    pub best_score: f64,
    pub trials: Vec<Trial>,
}

pub struct MuSearch {
    strategy: SearchStrategy,
}

impl MuSearch {
    pub fn new(strategy: SearchStrategy) -> Result<Self> {
        strategy.validate()?;
        Ok(Self { strategy })
    }

    /// Maximize `evaluate(mu)`.
    ///
    /// Recoverable evaluation errors and non-finite scores are recorded as
    /// failed trials; other errors abort the search.
    pub fn run<F>(&self, mut evaluate: F) -> Result<SearchOutcome>
    where
        F: FnMut(f32) -> Result<f64>,
    {
        let mut trials: Vec<Trial> = Vec::new();
        let mut probe = |mu: f32, trials: &mut Vec<Trial>| -> Result<Option<f64>> {
            if let Some(t) = trials.iter().find(|t| t.mu == mu) {
                return Ok(t.score);
            }
            let score = match evaluate(mu) {
                Ok(s) if s.is_finite() || s == f64::INFINITY => {
                    info!(mu, score = s, "mu trial");
                    Some(s)
                }
                Ok(s) => {
                    warn!(mu, score = s, "mu trial produced a non-finite score");
                    None
                }
                Err(err) if err.is_recoverable() => {
                    warn!(mu, error = %err, "mu trial failed");
                    None
                }
                Err(err) => return Err(err),
            };
            trials.push(Trial { mu, score });
            Ok(score)
        };

        match &self.strategy {
            SearchStrategy::Bracket { lo, hi, iterations } => {
                let mut a = lo.ln();
                let mut b = hi.ln();
                for _ in 0..*iterations {
                    let m1 = a + (b - a) / 3.0;
                    let m2 = b - (b - a) / 3.0;
                    let s1 = probe(m1.exp(), &mut trials)?.unwrap_or(f64::NEG_INFINITY);
                    let s2 = probe(m2.exp(), &mut trials)?.unwrap_or(f64::NEG_INFINITY);
                    if s1 < s2 {
                        a = m1;
                    } else {
                        b = m2;
                    }
                }
                probe((0.5 * (a + b)).exp(), &mut trials)?;
            }
            strategy => {
                for mu in strategy.grid().unwrap_or_default() {
                    probe(mu, &mut trials)?;
                }
            }
        }

        let mut best: Option<(f32, f64)> = None;
        for t in &trials {
            if let Some(s) = t.score {
                if best.map_or(true, |(_, b)| s > b) {
                    best = Some((t.mu, s));
                }
            }
        }
        match best {
            Some((best_mu, best_score)) => {
                info!(best_mu, best_score, trials = trials.len(), "mu search done");
                Ok(SearchOutcome {
                    best_mu,
                    best_score,
                    trials,
                })
            }
            None => Err(ReconError::SearchExhausted {
                tried: trials.len(),
            }),
        }
    }
}

/// Choose `mu` by mean held-out quality of full reconstructions.
pub fn calibrate_mu(
    engine: &Reconstructor<'_>,
    schedule: &ReconstructionSchedule,
    truths: &[Signal],
    measurements: &[Measurement],
    metric: &dyn QualityMetric,
    strategy: SearchStrategy,
) -> Result<SearchOutcome> {
    MuSearch::new(strategy)?.run(|mu| {
        let recs = engine.reconstruct_batch(measurements, &schedule.clone().with_mu(mu))?;
        let iterates: Vec<Signal> = recs.into_iter().map(|r| r.iterate).collect();
        mean_score(metric, truths, &iterates)
    })
}
