//! Adversarial critic training.
//!
//! Per iteration:
//! 1. sample ground truth and noisy measurements from the data source
//! 2. produce fakes (baseline inverse, or a mini/full reconstruction with the
//!    current critic)
//! 3. take `critic_steps_per_batch` Adam steps on
//!    `mean D(fake) − mean D(real) + λ · mean (‖∇ₓD(x̂)‖ − 1)²`
//!
//! Recoverable failures (non-finite values, degenerate penalty) skip the
//! batch and roll back any critic updates made on it; the loop gives up after `max_consecutive_failures` in a row.

use crate::config::{ExperimentConfig, FakeMode};
use crate::core::Signal;
use crate::critic::{Critic, Regularizer};
use crate::data::{DataSource, Split};
use crate::diff::sample_interpolates;
use crate::error::{ensure_shape, ReconError, Result};
use crate::forward::ForwardModel;
use crate::io::{CheckpointStore, CriticCheckpoint};
use crate::optim::adam::AdamF32;
use crate::optim::reconstruct::Reconstructor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

/// Outcome of one critic update.
#[derive(Clone, Debug)]
pub struct StepReport {
    pub iteration: usize,
    pub loss: f32,
    /// `mean D(real) − mean D(fake)`.
    pub wasserstein: f32,
    pub gradient_penalty: f32,
    pub parameter_version: u64,
}

#[derive(Clone, Debug)]
pub struct TrainingSummary {
    pub completed: usize,
    pub skipped: usize,
    pub final_iteration: usize,
    pub last: Option<StepReport>,
}

pub struct AdversarialTrainer<'m, C: Critic> {
    model: &'m dyn ForwardModel,
    critic: C,
    optimizer: AdamF32,
    config: ExperimentConfig,
    rng: StdRng,
    iteration: usize,
}

impl<'m, C: Critic> AdversarialTrainer<'m, C> {
    pub fn new(model: &'m dyn ForwardModel, critic: C, config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        ensure_shape(model.signal_shape(), critic.input_shape())?;
        let optimizer = AdamF32::with_lr(config.learning_rate);
        let rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
        Ok(Self {
            model,
            critic,
            optimizer,
            config,
            rng,
            iteration: 0,
        })
    }

    pub fn critic(&self) -> &C {
        &self.critic
    }

    pub fn into_critic(self) -> C {
        self.critic
    }

    pub fn optimizer(&self) -> &AdamF32 {
        &self.optimizer
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Completed training iterations, including resumed ones.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Restore critic parameters and the iteration counter from the store.
    ///
    /// Returns `false` when there is nothing to resume from.
    pub fn resume(&mut self, store: &dyn CheckpointStore) -> Result<bool> {
        let Some(ckpt) = store.load()? else {
            return Ok(false);
        };
        self.critic
            .load_parameters(&ckpt.architecture, ckpt.parameter_set())?;
        self.optimizer
            .reset_moments_keep_t(self.critic.parameters().len());
        self.optimizer
            .set_timestep(u32::try_from(ckpt.parameter_version).unwrap_or(u32::MAX));
        self.iteration = ckpt.iteration as usize;
        info!(
            iteration = self.iteration,
            parameter_version = ckpt.parameter_version,
            "resumed critic from checkpoint"
        );
        Ok(true)
    }

    pub fn checkpoint(&self) -> CriticCheckpoint {
        CriticCheckpoint::from_critic(&self.critic, self.iteration as u64)
    }

    /// Fakes for a batch under the configured `fake_reconstruction_mode`.
    pub fn generate_fakes(
        &self,
        measurements: &[Signal],
        baselines: &[Signal],
    ) -> Result<Vec<Signal>> {
        let schedule = match self.config.fake_reconstruction_mode {
            FakeMode::Baseline => return Ok(baselines.to_vec()),
            FakeMode::Mini => self.config.schedule().mini(),
            FakeMode::Full => self.config.schedule(),
        };
        let regularizer: &dyn Regularizer = &self.critic;
        let engine = Reconstructor::new(self.model, Some(regularizer));
        Ok(engine
            .reconstruct_batch(measurements, &schedule)?
            .into_iter()
            .map(|r| r.iterate)
            .collect())
    }

    /// One Adam step on the critic for a (real, fake) batch.
    ///
    /// The penalty pass is skipped entirely when `gradient_penalty_weight` is 0.
    pub fn critic_step(&mut self, real: &[Signal], fake: &[Signal]) -> Result<StepReport> {
        if real.is_empty() {
            return Err(ReconError::Configuration(
                "critic step needs a non-empty batch".to_string(),
            ));
        }
        if real.len() != fake.len() {
            return Err(ReconError::Configuration(format!(
                "critic step needs paired batches, got {} real and {} fake",
                real.len(),
                fake.len()
            )));
        }
        let batch = real.len() as f32;
        let lambda = self.config.gradient_penalty_weight;
        let step = self.iteration;
        let mut grad = vec![0.0f32; self.critic.parameters().len()];

        let mut fake_sum = 0.0f64;
        for x in fake {
            fake_sum += self.critic.value(x)? as f64;
            self.critic.accumulate_param_grad(x, 1.0 / batch, &mut grad)?;
        }
        let mut real_sum = 0.0f64;
        for x in real {
            real_sum += self.critic.value(x)? as f64;
            self.critic.accumulate_param_grad(x, -1.0 / batch, &mut grad)?;
        }
        let mut penalty_sum = 0.0f64;
        if lambda > 0.0 {
            let interpolates = sample_interpolates(real, fake, &mut self.rng)?;
            for x_hat in &interpolates {
                penalty_sum += self
                    .critic
                    .accumulate_penalty_param_grad(x_hat, lambda / batch, &mut grad)?
                    as f64;
            }
        }

        let mean_fake = (fake_sum / batch as f64) as f32;
        let mean_real = (real_sum / batch as f64) as f32;
        let gp = (penalty_sum / batch as f64) as f32;
        let loss = mean_fake - mean_real + lambda * gp;

        if !loss.is_finite() {
            return Err(ReconError::instability(step, format!("critic loss is {loss}")));
        }
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(ReconError::instability(step, "critic parameter gradient is not finite"));
        }

        let params = self.critic.parameters_mut();
        self.optimizer.step(&mut params.values, &grad);
        params.bump_version();

        Ok(StepReport {
            iteration: step,
            loss,
            wasserstein: mean_real - mean_fake,
            gradient_penalty: gp,
            parameter_version: params.version,
        })
    }

    /// Draw a batch, build fakes and update the critic.
    pub fn train_step(&mut self, source: &mut dyn DataSource) -> Result<StepReport> {
        let batch = source.next_batch(self.config.batch_size, Split::Training)?;
        let fakes = self.generate_fakes(&batch.measurements, &batch.baselines)?;

        // A failed batch leaves no trace in the parameters or the optimizer.
        let params_before = self.critic.parameters().clone();
        let optimizer_before = self.optimizer.clone();
        let mut report = None;
        for _ in 0..self.config.critic_steps_per_batch {
            match self.critic_step(&batch.signals, &fakes) {
                Ok(r) => report = Some(r),
                Err(err) => {
                    *self.critic.parameters_mut() = params_before;
                    self.optimizer = optimizer_before;
                    return Err(err);
                }
            }
        }
        self.iteration += 1;
        report.ok_or_else(|| {
            ReconError::Configuration("critic_steps_per_batch must be > 0".to_string())
        })
    }

    /// Run `iterations` successful training steps.
    pub fn train(
        &mut self,
        source: &mut dyn DataSource,
        iterations: usize,
        store: Option<&dyn CheckpointStore>,
    ) -> Result<TrainingSummary> {
        let mut completed = 0;
        let mut skipped = 0;
        let mut failures = 0;
        let mut last = None;

        while completed < iterations {
            match self.train_step(source) {
                Ok(report) => {
                    failures = 0;
                    completed += 1;
                    if self.iteration % self.config.log_interval == 0 || completed == iterations {
                        info!(
                            iteration = self.iteration,
                            loss = report.loss,
                            wasserstein = report.wasserstein,
                            gradient_penalty = report.gradient_penalty,
                            "critic training"
                        );
                    }
                    if let Some(store) = store {
                        let every = self.config.checkpoint_every;
                        if every > 0 && self.iteration % every == 0 {
                            store.save(&self.checkpoint())?;
                        }
                    }
                    last = Some(report);
                }
                Err(err) if err.is_recoverable() => {
                    failures += 1;
                    skipped += 1;
                    warn!(
                        iteration = self.iteration,
                        failures,
                        error = %err,
                        "skipping batch"
                    );
                    if failures >= self.config.max_consecutive_failures {
                        return Err(ReconError::TrainingAborted {
                            failures,
                            last: Box::new(err),
                        });
                    }
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(store) = store {
            store.save(&self.checkpoint())?;
        }

        Ok(TrainingSummary {
            completed,
            skipped,
            final_iteration: self.iteration,
            last,
        })
    }
}
