//! Experiment configuration.
//!
//! One immutable struct, passed to every component at construction. Missing
//! JSON fields fall back to `Default` (the medium-noise CT experiment the
//! method was tuned on).

use crate::error::{ReconError, Result};
use crate::optim::reconstruct::ReconstructionSchedule;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the reconstruction iterate starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartingPoint {
    Zero,
    Baseline,
    /// Short unregularized (`mu = 0`) run seeded from the baseline.
    Mini,
}

/// How the trainer produces "fake" signals for the critic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FakeMode {
    /// Baseline inverse only.
    Baseline,
    /// Early-stopped reconstruction (`mini_steps`) with the current critic.
    Mini,
    /// Full reconstruction budget with the current critic.
    Full,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProblemConfig {
    Tomography { size: usize, num_angles: usize },
    Denoising { size: usize },
}

impl ProblemConfig {
    pub fn size(&self) -> usize {
        match self {
            ProblemConfig::Tomography { size, .. } | ProblemConfig::Denoising { size } => *size,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriticConfig {
    pub channels: usize,
    pub kernel_size: usize,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            channels: 8,
            kernel_size: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Name under which critic parameters are checkpointed.
    pub name: String,
    pub problem: ProblemConfig,
    pub critic: CriticConfig,

    /// Standard deviation of the additive Gaussian measurement noise.
    pub noise_level: f32,
    /// Trade-off weight between data fidelity and the learned regularizer.
    pub mu: f32,
    pub step_size: f32,
    /// Geometric decay factor, applied every `decay_every` steps.
    pub step_size_decay: f32,
    pub decay_every: usize,
    pub total_steps: usize,
    /// Step budget of early-stopped ("mini") reconstructions.
    pub mini_steps: usize,
    pub starting_point: StartingPoint,

    pub gradient_penalty_weight: f32,
    pub fake_reconstruction_mode: FakeMode,
    pub batch_size: usize,
    /// Critic updates performed per sampled batch of fakes.
    pub critic_steps_per_batch: usize,
    pub learning_rate: f32,
    pub max_consecutive_failures: usize,
    /// Save a checkpoint every N completed iterations (0 disables).
    pub checkpoint_every: usize,
    pub log_interval: usize,
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "adversarial_regulariser".to_string(),
            problem: ProblemConfig::Tomography {
                size: 64,
                num_angles: 30,
            },
            critic: CriticConfig::default(),
            noise_level: 0.01,
            mu: 0.3,
            step_size: 0.7,
            step_size_decay: 1.0,
            decay_every: 10,
            total_steps: 50,
            mini_steps: 10,
            starting_point: StartingPoint::Mini,
            gradient_penalty_weight: 10.0,
            fake_reconstruction_mode: FakeMode::Baseline,
            batch_size: 16,
            critic_steps_per_batch: 1,
            learning_rate: 1e-4,
            max_consecutive_failures: 5,
            checkpoint_every: 50,
            log_interval: 10,
            seed: 0,
        }
    }
}

fn check(ok: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(ReconError::Configuration(msg()))
    }
}

impl ExperimentConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject invalid options before any computation starts.
    pub fn validate(&self) -> Result<()> {
        let finite_nonneg = |v: f32| v.is_finite() && v >= 0.0;

        check(finite_nonneg(self.noise_level), || {
            format!("noise_level must be finite and >= 0, got {}", self.noise_level)
        })?;
        check(finite_nonneg(self.mu), || {
            format!("mu must be finite and >= 0, got {}", self.mu)
        })?;
        check(finite_nonneg(self.gradient_penalty_weight), || {
            format!(
                "gradient_penalty_weight must be finite and >= 0, got {}",
                self.gradient_penalty_weight
            )
        })?;
        check(self.learning_rate.is_finite() && self.learning_rate > 0.0, || {
            format!("learning_rate must be > 0, got {}", self.learning_rate)
        })?;
        check(self.batch_size > 0, || "batch_size must be > 0".to_string())?;
        check(self.critic_steps_per_batch > 0, || {
            "critic_steps_per_batch must be > 0".to_string()
        })?;
        check(self.max_consecutive_failures > 0, || {
            "max_consecutive_failures must be > 0".to_string()
        })?;
        check(self.log_interval > 0, || "log_interval must be > 0".to_string())?;
        check(
            self.fake_reconstruction_mode != FakeMode::Mini || self.mini_steps > 0,
            || "fake_reconstruction_mode 'mini' needs mini_steps > 0".to_string(),
        )?;

        match self.problem {
            ProblemConfig::Tomography { size, num_angles } => {
                check(size >= 2, || format!("problem size must be >= 2, got {size}"))?;
                check(num_angles > 0, || "num_angles must be > 0".to_string())?;
            }
            ProblemConfig::Denoising { size } => {
                check(size >= 2, || format!("problem size must be >= 2, got {size}"))?;
            }
        }

        check(self.critic.channels > 0, || "critic.channels must be > 0".to_string())?;
        check(self.critic.kernel_size % 2 == 1, || {
            format!(
                "critic.kernel_size must be odd, got {}",
                self.critic.kernel_size
            )
        })?;

        self.schedule().validate()
    }

    /// Reconstruction schedule described by this configuration.
    pub fn schedule(&self) -> ReconstructionSchedule {
        ReconstructionSchedule {
            total_steps: self.total_steps,
            step_size: self.step_size,
            step_size_decay: self.step_size_decay,
            decay_every: self.decay_every,
            mu: self.mu,
            starting_point: self.starting_point,
            mini_steps: self.mini_steps,
            early_stop: None,
            snapshot_every: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ExperimentConfig::default().validate().unwrap();
    }

    #[test]
    fn test_negative_noise_rejected() {
        let cfg = ExperimentConfig {
            noise_level: -0.1,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ReconError::Configuration(_))));
    }

    #[test]
    fn test_zero_step_budget_rejected() {
        let cfg = ExperimentConfig {
            total_steps: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ReconError::Configuration(_))));
    }

    #[test]
    fn test_mini_fakes_need_mini_steps() {
        let cfg = ExperimentConfig {
            starting_point: StartingPoint::Baseline,
            fake_reconstruction_mode: FakeMode::Mini,
            mini_steps: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ReconError::Configuration(_))));

        let baseline_fakes = ExperimentConfig {
            fake_reconstruction_mode: FakeMode::Baseline,
            ..cfg
        };
        baseline_fakes.validate().unwrap();
    }

    #[test]
    fn test_even_kernel_rejected() {
        let mut cfg = ExperimentConfig::default();
        cfg.critic.kernel_size = 4;
        assert!(matches!(cfg.validate(), Err(ReconError::Configuration(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "problem": { "kind": "denoising", "size": 32 },
            "mu": 0.05,
            "starting_point": "baseline",
            "fake_reconstruction_mode": "mini"
        }"#;
        let cfg = ExperimentConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.problem, ProblemConfig::Denoising { size: 32 });
        assert_eq!(cfg.mu, 0.05);
        assert_eq!(cfg.starting_point, StartingPoint::Baseline);
        assert_eq!(cfg.fake_reconstruction_mode, FakeMode::Mini);
        assert_eq!(cfg.total_steps, ExperimentConfig::default().total_steps);
    }

    #[test]
    fn test_invalid_json_values_rejected() {
        let json = r#"{ "step_size": 0.0 }"#;
        assert!(matches!(
            ExperimentConfig::from_json_str(json),
            Err(ReconError::Configuration(_))
        ));
        assert!(matches!(
            ExperimentConfig::from_json_str("{ not json"),
            Err(ReconError::Parse(_))
        ));
    }

    #[test]
    fn test_schedule_carries_options() {
        let cfg = ExperimentConfig::default();
        let schedule = cfg.schedule();
        assert_eq!(schedule.total_steps, cfg.total_steps);
        assert_eq!(schedule.mu, cfg.mu);
        assert_eq!(schedule.starting_point, cfg.starting_point);
        assert!(schedule.early_stop.is_none());
    }
}
