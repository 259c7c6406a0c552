//! Signal and measurement containers.
//!
//! Both are plain `DMatrix<f32>`: a signal lives on the reconstruction grid
//! (rows × cols), a measurement on the measurement grid of the forward model
//! (angles × detectors for tomography, the signal grid for denoising).
//!
//! Reductions accumulate in f64; the arrays themselves stay f32.

use nalgebra::DMatrix;

/// Unknown to be reconstructed.
pub type Signal = DMatrix<f32>;

/// Output of a forward model (plus noise).
pub type Measurement = DMatrix<f32>;

/// Euclidean inner product `⟨a, b⟩`.
pub fn inner(a: &DMatrix<f32>, b: &DMatrix<f32>) -> f64 {
    assert_eq!(a.shape(), b.shape());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

pub fn squared_norm(a: &DMatrix<f32>) -> f64 {
    a.iter().map(|x| (*x as f64) * (*x as f64)).sum()
}

pub fn norm(a: &DMatrix<f32>) -> f64 {
    squared_norm(a).sqrt()
}

/// `‖a − b‖`.
pub fn distance(a: &DMatrix<f32>, b: &DMatrix<f32>) -> f64 {
    assert_eq!(a.shape(), b.shape());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

pub fn all_finite(a: &DMatrix<f32>) -> bool {
    a.iter().all(|v| v.is_finite())
}

/// `eps · real + (1 − eps) · fake`, the random interpolate used by the
/// gradient penalty.
pub fn interpolate(real: &Signal, fake: &Signal, eps: f32) -> Signal {
    assert_eq!(real.shape(), fake.shape());
    real.zip_map(fake, |r, f| eps * r + (1.0 - eps) * f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inner_and_norm() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, -1.0, 0.5]);
        assert_relative_eq!(inner(&a, &b), 1.0 - 3.0 + 2.0, epsilon = 1e-12);
        assert_relative_eq!(norm(&a), 30.0f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(distance(&a, &a), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interpolate_endpoints() {
        let real = DMatrix::from_element(3, 3, 1.0f32);
        let fake = DMatrix::from_element(3, 3, -1.0f32);
        assert_eq!(interpolate(&real, &fake, 1.0), real);
        assert_eq!(interpolate(&real, &fake, 0.0), fake);
        let mid = interpolate(&real, &fake, 0.5);
        assert!(mid.iter().all(|v| v.abs() < 1e-7));
    }

    #[test]
    fn test_all_finite_detects_nan() {
        let mut a = DMatrix::from_element(2, 2, 0.0f32);
        assert!(all_finite(&a));
        a[(1, 0)] = f32::NAN;
        assert!(!all_finite(&a));
    }
}
