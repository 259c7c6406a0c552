//! Same-padded multi-channel 2-D convolution and its backward passes.
//!
//! Layout:
//! - input `x`: one channel, column-major, `x[i + j · rows]`
//! - kernels: `K[c · k² + di · k + dj]`
//! - feature maps: `u[c · P + i + j · rows]`, `P = rows · cols`
//!
//! Forward (no bias, zero padding, `r = k / 2`):
//!   conv(x)[c, i, j] = Σ_{di,dj} K[c, di, dj] · x[i + di - r, j + dj - r]
//!
//! `conv_adjoint` is the exact transpose of `conv_forward` for fixed kernels,
//! and `conv_kernel_grad` is the derivative of `⟨u, conv(x)⟩` w.r.t. `K`.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvShape {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
    pub kernel: usize,
}

impl ConvShape {
    pub fn pixels(&self) -> usize {
        self.rows * self.cols
    }

    pub fn radius(&self) -> usize {
        self.kernel / 2
    }

    pub fn kernel_len(&self) -> usize {
        self.channels * self.kernel * self.kernel
    }

    pub fn feature_len(&self) -> usize {
        self.channels * self.pixels()
    }

    /// Walk every (channel, tap, output pixel, input pixel) quadruple whose
    /// input pixel lies inside the grid.
    fn for_each_tap<F: FnMut(usize, usize, usize)>(&self, mut f: F) {
        let r = self.radius() as isize;
        let (rows, cols) = (self.rows as isize, self.cols as isize);
        let p = self.pixels();
        for c in 0..self.channels {
            for di in 0..self.kernel {
                for dj in 0..self.kernel {
                    let tap = c * self.kernel * self.kernel + di * self.kernel + dj;
                    let oi = di as isize - r;
                    let oj = dj as isize - r;
                    for j in 0..cols {
                        let sj = j + oj;
                        if sj < 0 || sj >= cols {
                            continue;
                        }
                        for i in 0..rows {
                            let si = i + oi;
                            if si < 0 || si >= rows {
                                continue;
                            }
                            let out = c * p + (i + j * rows) as usize;
                            let src = (si + sj * rows) as usize;
                            f(tap, out, src);
                        }
                    }
                }
            }
        }
    }
}

/// `out = conv(x)`.
pub fn conv_forward(shape: &ConvShape, kernels: &[f32], x: &[f32], out: &mut [f32]) {
    debug_assert_eq!(kernels.len(), shape.kernel_len());
    debug_assert_eq!(x.len(), shape.pixels());
    debug_assert_eq!(out.len(), shape.feature_len());
    out.fill(0.0);
    shape.for_each_tap(|tap, o, s| out[o] += kernels[tap] * x[s]);
}

/// `out = convᵀ(u)`, mapping feature maps back to the input grid.
pub fn conv_adjoint(shape: &ConvShape, kernels: &[f32], u: &[f32], out: &mut [f32]) {
    debug_assert_eq!(kernels.len(), shape.kernel_len());
    debug_assert_eq!(u.len(), shape.feature_len());
    debug_assert_eq!(out.len(), shape.pixels());
    out.fill(0.0);
    shape.for_each_tap(|tap, o, s| out[s] += kernels[tap] * u[o]);
}

/// `grad[c, di, dj] += Σ_ij u[c, i, j] · x[i + di - r, j + dj - r]`.
pub fn conv_kernel_grad(shape: &ConvShape, u: &[f32], x: &[f32], grad: &mut [f32]) {
    debug_assert_eq!(u.len(), shape.feature_len());
    debug_assert_eq!(x.len(), shape.pixels());
    debug_assert_eq!(grad.len(), shape.kernel_len());
    let mut acc = vec![0.0f64; grad.len()];
    shape.for_each_tap(|tap, o, s| acc[tap] += u[o] as f64 * x[s] as f64);
    for (g, a) in grad.iter_mut().zip(acc) {
        *g += a as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn dot(a: &[f32], b: &[f32]) -> f64 {
        a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum()
    }

    fn random(rng: &mut StdRng, n: usize) -> Vec<f32> {
        (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_conv_adjoint_identity() {
        let shape = ConvShape {
            rows: 6,
            cols: 5,
            channels: 3,
            kernel: 3,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let k = random(&mut rng, shape.kernel_len());
        let x = random(&mut rng, shape.pixels());
        let u = random(&mut rng, shape.feature_len());

        let mut cx = vec![0.0; shape.feature_len()];
        conv_forward(&shape, &k, &x, &mut cx);
        let mut ctu = vec![0.0; shape.pixels()];
        conv_adjoint(&shape, &k, &u, &mut ctu);

        let lhs = dot(&cx, &u);
        let rhs = dot(&x, &ctu);
        assert!((lhs - rhs).abs() < 1e-4 * (1.0 + lhs.abs()), "{lhs} vs {rhs}");
    }

    #[test]
    fn test_kernel_grad_is_linear_in_kernels() {
        // ⟨u, conv_K(x)⟩ is linear in K, so its gradient dotted with K
        // reproduces the value.
        let shape = ConvShape {
            rows: 4,
            cols: 4,
            channels: 2,
            kernel: 3,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let k = random(&mut rng, shape.kernel_len());
        let x = random(&mut rng, shape.pixels());
        let u = random(&mut rng, shape.feature_len());

        let mut cx = vec![0.0; shape.feature_len()];
        conv_forward(&shape, &k, &x, &mut cx);
        let mut g = vec![0.0; shape.kernel_len()];
        conv_kernel_grad(&shape, &u, &x, &mut g);

        let value = dot(&u, &cx);
        let via_grad = dot(&g, &k);
        assert!((value - via_grad).abs() < 1e-4 * (1.0 + value.abs()));
    }

    #[test]
    fn test_centre_tap_is_identity() {
        let shape = ConvShape {
            rows: 3,
            cols: 3,
            channels: 1,
            kernel: 3,
        };
        let mut k = vec![0.0; 9];
        k[4] = 1.0;
        let x: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let mut out = vec![0.0; 9];
        conv_forward(&shape, &k, &x, &mut out);
        assert_eq!(out, x);
    }
}
