//! Optimization: the reconstruction engine, critic training and `mu` search.
//!
//! - Adam optimizer
//! - Iterative reconstruction (data fidelity + regularizer gradient descent)
//! - Adversarial critic training with gradient penalty
//! - Trade-off weight calibration

pub mod adam;
pub mod reconstruct;
pub mod search;
pub mod trainer;

pub use reconstruct::{Reconstruction, ReconstructionSchedule, Reconstructor};
pub use search::{calibrate_mu, MuSearch, SearchOutcome, SearchStrategy, Trial};
pub use trainer::{AdversarialTrainer, StepReport, TrainingSummary};
