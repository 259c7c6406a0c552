//! Error taxonomy shared by every component.
//!
//! Forward-model and critic errors propagate unchanged through the
//! reconstruction engine and the trainer. Only the trainer decides to skip a
//! batch, and only for the recoverable kinds (see [`ReconError::is_recoverable`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// Invalid option or option combination, detected before any computation.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// NaN or overflow in a gradient or iterate.
    #[error("numerical instability at step {step}: {what}")]
    NumericalInstability { step: usize, what: String },

    /// Forward/adjoint operator setup failed (degenerate geometry, zero norm).
    #[error("operator construction failed: {0}")]
    OperatorConstruction(String),

    /// The gradient-penalty gradient is undefined at an interpolated point.
    #[error("gradient penalty undefined: {0}")]
    DegeneratePenalty(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("training aborted after {failures} consecutive failed steps: {last}")]
    TrainingAborted { failures: usize, last: Box<ReconError> },

    #[error("no candidate produced a finite score ({tried} tried)")]
    SearchExhausted { tried: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ReconError {
    pub fn instability(step: usize, what: impl Into<String>) -> Self {
        ReconError::NumericalInstability {
            step,
            what: what.into(),
        }
    }

    /// Errors after which a training loop may draw a fresh batch and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReconError::NumericalInstability { .. } | ReconError::DegeneratePenalty(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

/// Fail with [`ReconError::ShapeMismatch`] unless the two shapes agree.
pub fn ensure_shape(expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ReconError::ShapeMismatch { expected, actual })
    }
}
