//! Adam optimizer over a flat parameter vector.
//!
//! The critic exposes its parameters as one `Vec<f32>`, so a single
//! elementwise optimizer covers every layer.

#[derive(Clone, Debug)]
pub struct AdamF32 {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    t: u32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl AdamF32 {
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Standard betas (0.9, 0.999) and eps 1e-8.
    pub fn with_lr(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    pub fn timestep(&self) -> u32 {
        self.t
    }

    pub fn ensure_len(&mut self, len: usize) {
        if self.m.len() != len {
            self.m.resize(len, 0.0);
            self.v.resize(len, 0.0);
        }
    }

    /// Reset moment estimates while keeping the global timestep.
    ///
    /// Used when resuming from a checkpoint: parameters are restored but the
    /// moments are not persisted.
    pub fn reset_moments_keep_t(&mut self, len: usize) {
        self.m.clear();
        self.v.clear();
        self.m.resize(len, 0.0);
        self.v.resize(len, 0.0);
    }

    /// Continue bias correction from a restored step count.
    pub fn set_timestep(&mut self, t: u32) {
        self.t = t;
    }

    pub fn step(&mut self, params: &mut [f32], grads: &[f32]) {
        assert_eq!(params.len(), grads.len());
        self.ensure_len(params.len());

        self.t += 1;
        let t = self.t as f32;
        let b1 = self.beta1;
        let b2 = self.beta2;

        let bias1 = 1.0 - b1.powf(t);
        let bias2 = 1.0 - b2.powf(t);

        for i in 0..params.len() {
            let g = grads[i];
            self.m[i] = self.m[i] * b1 + g * (1.0 - b1);
            self.v[i] = self.v[i] * b2 + g * g * (1.0 - b2);

            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;

            params[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adam_preserves_timestep_on_reset() {
        let mut opt = AdamF32::with_lr(0.001);
        let mut params = vec![1.0f32, 2.0];
        let grads = vec![0.1f32, 0.2];

        opt.step(&mut params, &grads);
        opt.step(&mut params, &grads);
        opt.step(&mut params, &grads);
        assert_eq!(opt.timestep(), 3);

        opt.reset_moments_keep_t(3);
        assert_eq!(opt.timestep(), 3, "timestep must survive a moment reset");
        assert!(opt.m.iter().all(|m| *m == 0.0));
        assert_eq!(opt.v.len(), 3);
    }

    #[test]
    fn test_adam_f32_basic_update() {
        let mut opt = AdamF32::new(0.01, 0.9, 0.999, 1e-8);
        let mut params = vec![1.0f32, -1.0];
        let grads = vec![1.0f32, -2.0];
        opt.step(&mut params, &grads);
        assert!(params[0] < 1.0, "parameter should decrease with positive gradient");
        assert!(params[1] > -1.0, "parameter should increase with negative gradient");
        // First step moves each coordinate by ~lr regardless of gradient scale.
        assert!((params[0] - 0.99).abs() < 1e-4);
    }

    #[test]
    fn test_adam_minimizes_quadratic() {
        let mut opt = AdamF32::with_lr(0.05);
        let mut x = vec![3.0f32];
        for _ in 0..500 {
            let g = vec![2.0 * x[0]];
            opt.step(&mut x, &g);
        }
        assert!(x[0].abs() < 0.05, "x = {}", x[0]);
    }
}
