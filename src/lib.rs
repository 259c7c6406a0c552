//! # adversarial-regulariser: learned regularization for inverse problems
//!
//! This crate reconstructs signals from noisy, under-determined measurements
//! by combining a physics-based forward model with a critic trained
//! adversarially to tell ground truth from reconstructions. The critic's
//! gradient regularizes an iterative gradient-descent reconstruction.
//!
//! ## Architecture
//!
//! - `core`: signals, measurements, activations, phantoms
//! - `forward`: forward models (parallel-beam CT, denoising) with adjoints
//!   and baseline inverses
//! - `diff`: hand-derived backward passes (convolution, data fidelity,
//!   gradient penalty)
//! - `critic`: regularizers and trainable critics
//! - `optim`: reconstruction engine, adversarial trainer, `mu` search
//! - `data`: synthetic training/evaluation data
//! - `eval`: quality metrics and reports
//! - `io`: critic checkpoints
//!
//! Gradients are written out by hand and verified by finite differences
//! (`tests/gradient_check.rs`).

pub mod config;
pub mod core;
pub mod critic;
pub mod data;
pub mod diff;
pub mod error;
pub mod eval;
pub mod forward;
pub mod io;
pub mod optim;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use config::{ExperimentConfig, FakeMode, ProblemConfig, StartingPoint};
pub use core::{Measurement, Signal};
pub use critic::{ConvCritic, Critic, Regularizer, TotalVariation};
pub use error::{ReconError, Result};
pub use forward::{build_forward_model, ForwardModel};
pub use optim::{AdversarialTrainer, ReconstructionSchedule, Reconstructor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
