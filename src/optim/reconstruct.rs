//! Iterative reconstruction.
//!
//! Gradient descent on `J(x) = ½‖Ax − y‖² + mu · R(x)`:
//!
//! ```text
//! x_{k+1} = x_k − η_k (A*(A x_k − y) + mu ∇R(x_k))
//! η_k     = step_size · step_size_decay^⌊k / decay_every⌋
//! ```
//!
//! Mini and full reconstructions are the same loop with a different step
//! budget (`early_stop`). The output is not clipped.

use crate::config::StartingPoint;
use crate::core::{all_finite, Measurement, Signal};
use crate::critic::Regularizer;
use crate::diff::data_fidelity_with_grad;
use crate::error::{ensure_shape, ReconError, Result};
use crate::forward::ForwardModel;
use rayon::prelude::*;
use tracing::debug;

/// Step size of the unregularized warm start behind `StartingPoint::Mini`.
pub const WARM_START_STEP_SIZE: f32 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructionSchedule {
    pub total_steps: usize,
    pub step_size: f32,
    pub step_size_decay: f32,
    pub decay_every: usize,
    pub mu: f32,
    pub starting_point: StartingPoint,
    /// Budget of the unregularized warm start used by `StartingPoint::Mini`,
    /// and of the critic-regularized fakes in mini mode.
    pub mini_steps: usize,
    /// Optional cap below `total_steps`.
    pub early_stop: Option<usize>,
    /// Keep a copy of the iterate every N steps.
    pub snapshot_every: Option<usize>,
}

impl ReconstructionSchedule {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(ReconError::Configuration(msg));
        if self.total_steps == 0 {
            return bad("total_steps must be > 0".to_string());
        }
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return bad(format!("step_size must be > 0, got {}", self.step_size));
        }
        if !(self.step_size_decay.is_finite() && self.step_size_decay > 0.0) {
            return bad(format!(
                "step_size_decay must be > 0, got {}",
                self.step_size_decay
            ));
        }
        if self.decay_every == 0 {
            return bad("decay_every must be > 0".to_string());
        }
        if !(self.mu.is_finite() && self.mu >= 0.0) {
            return bad(format!("mu must be finite and >= 0, got {}", self.mu));
        }
        if self.starting_point == StartingPoint::Mini && self.mini_steps == 0 {
            return bad("starting_point 'mini' needs mini_steps > 0".to_string());
        }
        if self.early_stop == Some(0) {
            return bad("early_stop must be > 0 when set".to_string());
        }
        if self.snapshot_every == Some(0) {
            return bad("snapshot_every must be > 0 when set".to_string());
        }
        Ok(())
    }

    pub fn with_mu(mut self, mu: f32) -> Self {
        self.mu = mu;
        self
    }

    pub fn with_early_stop(mut self, steps: usize) -> Self {
        self.early_stop = Some(steps);
        self
    }

    pub fn with_snapshots(mut self, every: usize) -> Self {
        self.snapshot_every = Some(every);
        self
    }

    pub fn with_starting_point(mut self, start: StartingPoint) -> Self {
        self.starting_point = start;
        self
    }

    /// Early-stopped run of `mini_steps` seeded from the baseline.
    pub fn mini(&self) -> Self {
        self.clone()
            .with_starting_point(StartingPoint::Baseline)
            .with_early_stop(self.mini_steps)
    }

    /// Unregularized warm start behind `StartingPoint::Mini`: `mini_steps`
    /// plain descent steps of size [`WARM_START_STEP_SIZE`] from the baseline,
    /// independent of `total_steps`.
    pub fn warm_start(&self) -> Self {
        Self {
            total_steps: self.mini_steps,
            step_size: WARM_START_STEP_SIZE,
            step_size_decay: 1.0,
            mu: 0.0,
            starting_point: StartingPoint::Baseline,
            early_stop: None,
            snapshot_every: None,
            ..self.clone()
        }
    }

    /// Number of steps actually taken.
    pub fn steps(&self) -> usize {
        match self.early_stop {
            Some(cap) => cap.min(self.total_steps),
            None => self.total_steps,
        }
    }

    /// `η_k`.
    pub fn step_size_at(&self, k: usize) -> f32 {
        let exponent = (k / self.decay_every.max(1)) as i32;
        self.step_size * self.step_size_decay.powi(exponent)
    }
}

/// Result of one reconstruction.
#[derive(Clone, Debug)]
pub struct Reconstruction {
    pub iterate: Signal,
    /// `½‖Ax_k − y‖²` for k = 0..=steps.
    pub objective_trace: Vec<f64>,
    /// `(step, iterate)` pairs when snapshots were requested.
    pub snapshots: Vec<(usize, Signal)>,
    pub steps_run: usize,
}

/// Reconstruction engine over one forward model and an optional regularizer.
///
/// Holds only shared borrows, so batches reconstruct in parallel.
#[derive(Clone, Copy)]
pub struct Reconstructor<'a> {
    model: &'a dyn ForwardModel,
    regularizer: Option<&'a dyn Regularizer>,
}

impl<'a> Reconstructor<'a> {
    pub fn new(model: &'a dyn ForwardModel, regularizer: Option<&'a dyn Regularizer>) -> Self {
        Self { model, regularizer }
    }

    pub fn model(&self) -> &'a dyn ForwardModel {
        self.model
    }

    /// Starting iterate for `y` under the schedule's starting point.
    pub fn initial_guess(&self, y: &Measurement, schedule: &ReconstructionSchedule) -> Result<Signal> {
        match schedule.starting_point {
            StartingPoint::Zero => {
                let (rows, cols) = self.model.signal_shape();
                Ok(Signal::zeros(rows, cols))
            }
            StartingPoint::Baseline => self.model.baseline_inverse(y),
            StartingPoint::Mini => {
                let warm = schedule.warm_start();
                let x0 = self.model.baseline_inverse(y)?;
                Ok(self.run_from(x0, y, &warm)?.iterate)
            }
        }
    }

    pub fn reconstruct(&self, y: &Measurement, schedule: &ReconstructionSchedule) -> Result<Reconstruction> {
        schedule.validate()?;
        ensure_shape(self.model.measurement_shape(), y.shape())?;
        if schedule.mu > 0.0 && self.regularizer.is_none() {
            return Err(ReconError::Configuration(format!(
                "mu = {} needs a regularizer",
                schedule.mu
            )));
        }
        let x0 = self.initial_guess(y, schedule)?;
        self.run_from(x0, y, schedule)
    }

    /// Reconstruct every measurement of a batch, in parallel.
    pub fn reconstruct_batch(
        &self,
        measurements: &[Measurement],
        schedule: &ReconstructionSchedule,
    ) -> Result<Vec<Reconstruction>> {
        measurements
            .par_iter()
            .map(|y| self.reconstruct(y, schedule))
            .collect()
    }

    /// Run the descent loop from an explicit starting iterate.
    pub fn run_from(
        &self,
        x0: Signal,
        y: &Measurement,
        schedule: &ReconstructionSchedule,
    ) -> Result<Reconstruction> {
        ensure_shape(self.model.signal_shape(), x0.shape())?;
        if !all_finite(&x0) {
            return Err(ReconError::instability(0, "initial iterate is not finite"));
        }

        let steps = schedule.steps();
        let regularizer = if schedule.mu > 0.0 {
            Some(self.regularizer.ok_or_else(|| {
                ReconError::Configuration(format!("mu = {} needs a regularizer", schedule.mu))
            })?)
        } else {
            None
        };

        let mut x = x0;
        let mut trace = Vec::with_capacity(steps + 1);
        let mut snapshots = Vec::new();

        let (f0, mut fidelity_grad) = data_fidelity_with_grad(self.model, &x, y)?;
        if !f0.is_finite() {
            return Err(ReconError::instability(0, "data-fidelity objective is not finite"));
        }
        trace.push(f0);

        for k in 0..steps {
            let mut direction = fidelity_grad;
            if let Some(reg) = regularizer {
                let reg_grad = reg.gradient(&x)?;
                if !all_finite(&reg_grad) {
                    return Err(ReconError::instability(
                        k,
                        format!("{} gradient is not finite", reg.name()),
                    ));
                }
                direction += &reg_grad * schedule.mu;
            }
            if !all_finite(&direction) {
                return Err(ReconError::instability(k, "descent direction is not finite"));
            }

            let eta = schedule.step_size_at(k);
            x -= &direction * eta;
            if !all_finite(&x) {
                return Err(ReconError::instability(k + 1, "iterate is not finite"));
            }

            let (f, g) = data_fidelity_with_grad(self.model, &x, y)?;
            if !f.is_finite() {
                return Err(ReconError::instability(
                    k + 1,
                    "data-fidelity objective is not finite",
                ));
            }
            trace.push(f);
            fidelity_grad = g;

            if let Some(every) = schedule.snapshot_every {
                if (k + 1) % every == 0 {
                    snapshots.push((k + 1, x.clone()));
                }
            }
            debug!(step = k + 1, eta, fidelity = f, "reconstruction step");
        }

        Ok(Reconstruction {
            iterate: x,
            objective_trace: trace,
            snapshots,
            steps_run: steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::Denoising;

    fn schedule() -> ReconstructionSchedule {
        ReconstructionSchedule {
            total_steps: 20,
            step_size: 0.5,
            step_size_decay: 0.5,
            decay_every: 5,
            mu: 0.0,
            starting_point: StartingPoint::Zero,
            mini_steps: 3,
            early_stop: None,
            snapshot_every: None,
        }
    }

    #[test]
    fn test_step_size_decays_in_blocks() {
        let s = schedule();
        assert_eq!(s.step_size_at(0), 0.5);
        assert_eq!(s.step_size_at(4), 0.5);
        assert_eq!(s.step_size_at(5), 0.25);
        assert_eq!(s.step_size_at(12), 0.125);
    }

    #[test]
    fn test_early_stop_caps_steps() {
        let s = schedule();
        assert_eq!(s.steps(), 20);
        assert_eq!(s.clone().with_early_stop(7).steps(), 7);
        assert_eq!(s.clone().with_early_stop(70).steps(), 20);
        let mini = s.mini();
        assert_eq!(mini.steps(), 3);
        assert_eq!(mini.starting_point, StartingPoint::Baseline);
    }

    #[test]
    fn test_warm_start_uses_unit_steps_without_regularizer() {
        let warm = schedule().with_mu(0.4).with_early_stop(2).warm_start();
        assert_eq!(warm.step_size, WARM_START_STEP_SIZE);
        assert_eq!(warm.step_size_at(17), WARM_START_STEP_SIZE);
        assert_eq!(warm.mu, 0.0);
        assert_eq!(warm.steps(), 3);
        assert_eq!(warm.starting_point, StartingPoint::Baseline);
    }

    #[test]
    fn test_update_combines_fidelity_and_regularizer() {
        use crate::critic::TotalVariation;
        let model = Denoising::new(3).unwrap();
        let tv = TotalVariation::new(0.1).unwrap();
        let r = Reconstructor::new(&model, Some(&tv as &dyn Regularizer));
        let y = Signal::from_fn(3, 3, |i, j| (i * 3 + j) as f32 * 0.1);
        let x0 = Signal::zeros(3, 3);
        let s = ReconstructionSchedule {
            total_steps: 1,
            mu: 0.5,
            ..schedule()
        };
        let rec = r.run_from(x0.clone(), &y, &s).unwrap();
        let direction = (&x0 - &y) + tv.gradient(&x0).unwrap() * 0.5;
        let expected = &x0 - direction * s.step_size;
        assert!((rec.iterate - expected).abs().max() < 1e-6);
    }

    #[test]
    fn test_mu_without_regularizer_is_config_error() {
        let model = Denoising::new(4).unwrap();
        let r = Reconstructor::new(&model, None);
        let y = Signal::zeros(4, 4);
        let res = r.reconstruct(&y, &schedule().with_mu(0.1));
        assert!(matches!(res, Err(ReconError::Configuration(_))));
    }

    #[test]
    fn test_trace_and_snapshots_recorded() {
        let model = Denoising::new(4).unwrap();
        let r = Reconstructor::new(&model, None);
        let y = Signal::from_element(4, 4, 1.0);
        let rec = r.reconstruct(&y, &schedule().with_snapshots(5)).unwrap();
        assert_eq!(rec.steps_run, 20);
        assert_eq!(rec.objective_trace.len(), 21);
        let steps: Vec<usize> = rec.snapshots.iter().map(|(k, _)| *k).collect();
        assert_eq!(steps, vec![5, 10, 15, 20]);
    }

    #[test]
    fn test_nonfinite_start_is_instability_at_step_zero() {
        let model = Denoising::new(2).unwrap();
        let r = Reconstructor::new(&model, None);
        let y = Signal::zeros(2, 2);
        let x0 = Signal::from_element(2, 2, f32::NAN);
        match r.run_from(x0, &y, &schedule()) {
            Err(ReconError::NumericalInstability { step, .. }) => assert_eq!(step, 0),
            other => panic!("expected instability, got {other:?}"),
        }
    }
}
