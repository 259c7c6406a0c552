//! Persistence.
//!
//! - Critic checkpoints (binary, resumable training state)

mod checkpoint;

pub use checkpoint::{CheckpointStore, CriticCheckpoint, FileCheckpointStore, FORMAT_VERSION};
