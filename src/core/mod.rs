//! Core data types and small numeric helpers.
//!
//! This module contains the fundamental types used throughout the system:
//! - `Signal` / `Measurement`: real-valued 2-D arrays
//! - Activation functions for the critic
//! - Synthetic phantoms (disks, random ellipses)
//!
//! All types here are "pure data" - no operators, no training logic.

mod math;
pub mod phantom;
mod signal;

pub use math::{sigmoid, softplus};
pub use phantom::{disk_phantom, random_ellipse_phantom, Ellipse};
pub use signal::{
    all_finite, distance, inner, interpolate, norm, squared_norm, Measurement, Signal,
};
