//! Synthetic phantoms on the reconstruction grid.
//!
//! The grid covers the square [-1, 1]²; pixel (row i, col j) is centred at
//!   x = -1 + (j + 0.5) · hx,   y = 1 - (i + 0.5) · hy
//! so row 0 is the top of the image. The tomography projector uses the same
//! convention (see `forward::ray`).

use crate::core::Signal;
use rand::Rng;
use std::f32::consts::PI;

/// Physical centre of pixel (row, col) on a `rows × cols` grid over [-1, 1]².
pub fn pixel_center(rows: usize, cols: usize, row: usize, col: usize) -> (f32, f32) {
    let hx = 2.0 / cols as f32;
    let hy = 2.0 / rows as f32;
    (-1.0 + (col as f32 + 0.5) * hx, 1.0 - (row as f32 + 0.5) * hy)
}

/// One ellipse of a phantom: additive `intensity` inside the rotated ellipse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipse {
    pub intensity: f32,
    pub center: (f32, f32),
    pub semi_axes: (f32, f32),
    /// Rotation of the first semi-axis against +x, radians.
    pub angle: f32,
}

impl Ellipse {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let (c, s) = (self.angle.cos(), self.angle.sin());
        let dx = x - self.center.0;
        let dy = y - self.center.1;
        let u = (c * dx + s * dy) / self.semi_axes.0;
        let v = (-s * dx + c * dy) / self.semi_axes.1;
        u * u + v * v <= 1.0
    }
}

/// Rasterize a sum of ellipses (point-sampled at pixel centres).
pub fn rasterize_ellipses(rows: usize, cols: usize, ellipses: &[Ellipse]) -> Signal {
    Signal::from_fn(rows, cols, |i, j| {
        let (x, y) = pixel_center(rows, cols, i, j);
        ellipses
            .iter()
            .filter(|e| e.contains(x, y))
            .map(|e| e.intensity)
            .sum()
    })
}

/// Centred disk of the given radius (in grid units, the grid spans 2.0).
pub fn disk_phantom(size: usize, radius: f32, intensity: f32) -> Signal {
    rasterize_ellipses(
        size,
        size,
        &[Ellipse {
            intensity,
            center: (0.0, 0.0),
            semi_axes: (radius, radius),
            angle: 0.0,
        }],
    )
}

/// Random ellipse phantom: 1..=`max_ellipses` ellipses with additive
/// intensities in [0.1, 0.5], kept inside the unit disk so no projection ray
/// leaves the detector.
pub fn random_ellipse_phantom<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    max_ellipses: usize,
    rng: &mut R,
) -> Signal {
    let count = rng.gen_range(1..=max_ellipses.max(1));
    let ellipses: Vec<Ellipse> = (0..count)
        .map(|_| {
            let a = rng.gen_range(0.05f32..0.4);
            let b = rng.gen_range(0.05f32..0.4);
            // Keep the whole ellipse inside radius 0.95.
            let reach = 0.95 - a.max(b);
            let r = rng.gen_range(0.0..reach.max(1e-3));
            let phi = rng.gen_range(0.0..2.0 * PI);
            Ellipse {
                intensity: rng.gen_range(0.1f32..0.5),
                center: (r * phi.cos(), r * phi.sin()),
                semi_axes: (a, b),
                angle: rng.gen_range(0.0..PI),
            }
        })
        .collect();
    rasterize_ellipses(rows, cols, &ellipses)
}
