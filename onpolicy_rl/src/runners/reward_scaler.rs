//! Return-based reward scaling.
//!
//! Each environment keeps a discounted return `ret = ret * γ + r`. The
//! returns of all environments feed one running variance, and every raw
//! reward is divided by its standard deviation before clipping:
//!
//! ```text
//! r' = clamp(r / sqrt(var(ret) + 1e-8), -clip, clip)
//! ```
//!
//! The return of an environment restarts at zero after its episode ends.

use crate::core::running_stats::RunningMeanStd;

const VARIANCE_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct RewardScaler {
    returns: Vec<f32>,
    stats: RunningMeanStd,
    discount_factor: f32,
    clip: f32,
    normalize: bool,
}

impl RewardScaler {
    pub fn new(n_envs: usize, discount_factor: f32, clip: f32, normalize: bool) -> Self {
        Self {
            returns: vec![0.0; n_envs],
            stats: RunningMeanStd::new(1),
            discount_factor,
            clip,
            normalize,
        }
    }

    /// Scale and clip one step of rewards.
    ///
    /// Without normalization rewards are only clipped.
    pub fn scale(&mut self, rewards: &[f32], dones: &[bool]) -> Vec<f32> {
        debug_assert_eq!(rewards.len(), self.returns.len());
        debug_assert_eq!(dones.len(), self.returns.len());

        let scaled = if self.normalize {
            for (ret, &r) in self.returns.iter_mut().zip(rewards) {
                *ret = *ret * self.discount_factor + r;
            }
            self.stats.update_batch(&self.returns);
            rewards
                .iter()
                .map(|&r| self.stats.scale(0, r, VARIANCE_EPSILON))
                .collect::<Vec<_>>()
        } else {
            rewards.to_vec()
        };

        for (ret, &done) in self.returns.iter_mut().zip(dones) {
            if done {
                *ret = 0.0;
            }
        }

        scaled
            .into_iter()
            .map(|r| r.clamp(-self.clip, self.clip))
            .collect()
    }

    pub fn returns(&self) -> &[f32] {
        &self.returns
    }

    pub fn stats(&self) -> &RunningMeanStd {
        &self.stats
    }
}
