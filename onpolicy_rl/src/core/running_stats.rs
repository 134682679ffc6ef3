//! Running mean and variance accumulator.
//!
//! Used by the trainer to scale rewards by the standard deviation of the
//! discounted return. Batches are folded in with the parallel variance
//! combination rule, so updating with one batch of `n` samples gives the same
//! statistics as `n` single-sample updates.
//!
//! # Example
//! ```ignore
//! use onpolicy_rl::core::RunningMeanStd;
//!
//! let mut stats = RunningMeanStd::new(1);
//! stats.update_batch(&[1.0, 2.0, 3.0]);
//! let var = stats.variance()[0];
//! ```

use serde::{Deserialize, Serialize};

/// Per-dimension running mean and population variance.
///
/// Starts from mean 0, variance 1 and a tiny pseudo-count so the first batch
/// dominates the prior without dividing by zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    var: Vec<f64>,
    count: f64,
}

impl RunningMeanStd {
    /// Pseudo-count of the prior.
    pub const PRIOR_COUNT: f64 = 1e-4;

    /// Create an accumulator for `dim`-dimensional samples.
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            var: vec![1.0; dim],
            count: Self::PRIOR_COUNT,
        }
    }

    /// Fold a single sample into the statistics.
    pub fn update(&mut self, sample: &[f32]) {
        self.update_batch(sample);
    }

    /// Fold a flattened batch `[s0_d0, s0_d1, .., s1_d0, ..]` into the statistics.
    ///
    /// # Panics
    /// Panics if the batch length is not a multiple of the dimension.
    pub fn update_batch(&mut self, batch: &[f32]) {
        let dim = self.mean.len();
        assert_eq!(batch.len() % dim, 0, "Batch size must be multiple of dimension");
        let n = batch.len() / dim;
        if n == 0 {
            return;
        }

        let mut batch_mean = vec![0.0f64; dim];
        for sample in batch.chunks_exact(dim) {
            for (m, &x) in batch_mean.iter_mut().zip(sample) {
                *m += x as f64;
            }
        }
        batch_mean.iter_mut().for_each(|m| *m /= n as f64);

        let mut batch_var = vec![0.0f64; dim];
        for sample in batch.chunks_exact(dim) {
            for i in 0..dim {
                let d = sample[i] as f64 - batch_mean[i];
                batch_var[i] += d * d;
            }
        }
        batch_var.iter_mut().for_each(|v| *v /= n as f64);

        self.merge_moments(&batch_mean, &batch_var, n as f64);
    }

    fn merge_moments(&mut self, batch_mean: &[f64], batch_var: &[f64], batch_count: f64) {
        let total = self.count + batch_count;
        for i in 0..self.mean.len() {
            let delta = batch_mean[i] - self.mean[i];
            let m_a = self.var[i] * self.count;
            let m_b = batch_var[i] * batch_count;
            let m2 = m_a + m_b + delta * delta * self.count * batch_count / total;

            self.mean[i] += delta * batch_count / total;
            self.var[i] = m2 / total;
        }
        self.count = total;
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> &[f64] {
        &self.var
    }

    /// Number of samples seen, including the prior pseudo-count.
    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Scale `x` by `1 / sqrt(var + epsilon)` in dimension `i`, without centering.
    pub fn scale(&self, i: usize, x: f32, epsilon: f64) -> f32 {
        (x as f64 / (self.var[i] + epsilon).sqrt()) as f32
    }

    pub fn reset(&mut self) {
        self.mean.fill(0.0);
        self.var.fill(1.0);
        self.count = Self::PRIOR_COUNT;
    }
}
