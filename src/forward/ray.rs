//! Parallel-beam geometry and the ray-driven sparse projector.
//!
//! Conventions (shared with `core::phantom`):
//! - the image covers [-1, 1]² with `n × n` pixels of size `h = 2 / n`;
//!   pixel (i, j) sits at x = -1 + (j + 0.5) h, y = 1 - (i + 0.5) h
//! - angle θ_a = a · π / A, a = 0..A, direction ω = (cos θ, sin θ)
//! - detector spacing τ = h, detector d at s_d = (d - (D - 1) / 2) · τ,
//!   with D chosen so the detector covers the image diagonal
//! - the ray (a, d) is the line { s_d · ω + t · ω⊥ }, ω⊥ = (-sin θ, cos θ)
//!
//! The line integral is approximated by midpoint samples along `t`, each
//! sample distributing its weight bilinearly onto the four nearest pixel
//! centres. The resulting matrix is stored in CSR form so the adjoint is its
//! exact transpose.
//!
//! Matrix indexing follows nalgebra's column-major storage: measurement row
//! `r = a + d · A`, signal column `c = i + j · n`.

use crate::core::{Measurement, Signal};
use crate::error::{ensure_shape, ReconError, Result};
use rayon::prelude::*;
use std::f32::consts::{PI, SQRT_2};

#[derive(Clone, Debug)]
pub struct ParallelBeamGeometry {
    pub size: usize,
    pub num_angles: usize,
    pub num_detectors: usize,
    pub pixel_size: f32,
    pub detector_spacing: f32,
    pub angles: Vec<f32>,
}

impl ParallelBeamGeometry {
    pub fn new(size: usize, num_angles: usize) -> Result<Self> {
        if size == 0 {
            return Err(ReconError::OperatorConstruction(
                "tomography grid must be non-empty".to_string(),
            ));
        }
        if num_angles == 0 {
            return Err(ReconError::OperatorConstruction(
                "tomography needs at least one projection angle".to_string(),
            ));
        }

        let pixel_size = 2.0 / size as f32;
        let detector_spacing = pixel_size;
        let half = (SQRT_2 / detector_spacing).ceil() as usize;
        let num_detectors = 2 * half + 1;
        let angles = (0..num_angles)
            .map(|a| a as f32 * PI / num_angles as f32)
            .collect();

        Ok(Self {
            size,
            num_angles,
            num_detectors,
            pixel_size,
            detector_spacing,
            angles,
        })
    }

    /// Signed detector coordinate of detector `d`.
    pub fn detector_position(&self, d: usize) -> f32 {
        (d as f32 - (self.num_detectors - 1) as f32 * 0.5) * self.detector_spacing
    }

    pub fn sinogram_shape(&self) -> (usize, usize) {
        (self.num_angles, self.num_detectors)
    }

    /// Angular step `π / A`, the quadrature weight of back-projection.
    pub fn angle_step(&self) -> f32 {
        PI / self.num_angles as f32
    }
}

/// Compressed-sparse-row matrix mapping signals to sinograms.
#[derive(Clone, Debug)]
pub struct SparseProjector {
    rows: usize,
    cols: usize,
    signal_shape: (usize, usize),
    measurement_shape: (usize, usize),
    row_ptr: Vec<usize>,
    col_idx: Vec<u32>,
    values: Vec<f32>,
}

/// Weights of one ray: `(column, weight)` sorted by column, duplicates merged.
fn trace_ray(geom: &ParallelBeamGeometry, angle: f32, s: f32) -> Vec<(u32, f32)> {
    let n = geom.size;
    let h = geom.pixel_size;
    let (sin, cos) = angle.sin_cos();

    // Half-pixel sampling over the chord of the circumscribed disk.
    let samples = ((2.0 * SQRT_2) / (0.5 * h)).ceil() as usize;
    let dt = 2.0 * SQRT_2 / samples as f32;

    let mut entries: Vec<(u32, f64)> = Vec::with_capacity(samples * 4);
    for m in 0..samples {
        let t = -SQRT_2 + (m as f32 + 0.5) * dt;
        let x = s * cos - t * sin;
        let y = s * sin + t * cos;

        // Continuous (col, row) coordinates in pixel-centre units.
        let u = (x + 1.0) / h - 0.5;
        let v = (1.0 - y) / h - 0.5;
        let j0 = u.floor();
        let i0 = v.floor();
        let fu = u - j0;
        let fv = v - i0;

        let corners = [
            (i0, j0, (1.0 - fu) * (1.0 - fv)),
            (i0, j0 + 1.0, fu * (1.0 - fv)),
            (i0 + 1.0, j0, (1.0 - fu) * fv),
            (i0 + 1.0, j0 + 1.0, fu * fv),
        ];
        for (i, j, w) in corners {
            if w <= 0.0 || i < 0.0 || j < 0.0 || i >= n as f32 || j >= n as f32 {
                continue;
            }
            let col = i as usize + j as usize * n;
            entries.push((col as u32, (w * dt) as f64));
        }
    }

    entries.sort_unstable_by_key(|e| e.0);
    let mut merged: Vec<(u32, f32)> = Vec::with_capacity(entries.len());
    let mut iter = entries.into_iter();
    if let Some((mut col, mut acc)) = iter.next() {
        for (c, w) in iter {
            if c == col {
                acc += w;
            } else {
                merged.push((col, acc as f32));
                col = c;
                acc = w;
            }
        }
        merged.push((col, acc as f32));
    }
    merged
}

impl SparseProjector {
    /// Trace every ray of the geometry. Rays are independent and are traced
    /// in parallel.
    pub fn build(geom: &ParallelBeamGeometry) -> Self {
        let (num_angles, num_detectors) = geom.sinogram_shape();
        let rows = num_angles * num_detectors;
        let cols = geom.size * geom.size;

        let per_row: Vec<Vec<(u32, f32)>> = (0..rows)
            .into_par_iter()
            .map(|r| {
                let a = r % num_angles;
                let d = r / num_angles;
                trace_ray(geom, geom.angles[a], geom.detector_position(d))
            })
            .collect();

        let nnz = per_row.iter().map(Vec::len).sum();
        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        row_ptr.push(0);
        for row in per_row {
            for (c, w) in row {
                col_idx.push(c);
                values.push(w);
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            rows,
            cols,
            signal_shape: (geom.size, geom.size),
            measurement_shape: (num_angles, num_detectors),
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// `A x` (unnormalized).
    pub fn apply(&self, signal: &Signal) -> Result<Measurement> {
        ensure_shape(self.signal_shape, signal.shape())?;
        let x = signal.as_slice();
        let (ar, dc) = self.measurement_shape;
        let mut out = Measurement::zeros(ar, dc);
        out.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(r, y)| {
                let span = self.row_ptr[r]..self.row_ptr[r + 1];
                let acc: f64 = self.col_idx[span.clone()]
                    .iter()
                    .zip(&self.values[span])
                    .map(|(c, w)| *w as f64 * x[*c as usize] as f64)
                    .sum();
                *y = acc as f32;
            });
        Ok(out)
    }

    /// `Aᵀ y` (unnormalized), the exact transpose of [`apply`](Self::apply).
    pub fn apply_transpose(&self, measurement: &Measurement) -> Result<Signal> {
        ensure_shape(self.measurement_shape, measurement.shape())?;
        let y = measurement.as_slice();
        let mut acc = vec![0.0f64; self.cols];
        for (r, yr) in y.iter().enumerate() {
            if *yr == 0.0 {
                continue;
            }
            let yr = *yr as f64;
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                acc[self.col_idx[k] as usize] += self.values[k] as f64 * yr;
            }
        }
        let (rows, cols) = self.signal_shape;
        Ok(Signal::from_iterator(
            rows,
            cols,
            acc.into_iter().map(|v| v as f32),
        ))
    }
}
