//! Return and advantage estimation over a time-major rollout.
//!
//! All arrays are flattened time-major, `index = t * num_envs + e`:
//! - `rewards`: `num_steps * num_envs`
//! - `value_preds`, `masks`, returns: `(num_steps + 1) * num_envs`
//!
//! `value_preds[num_steps]` holds the bootstrap value `V(s_T)` for every
//! environment. `masks[t + 1][e] == 0` means environment `e` finished its
//! episode at step `t`, so nothing propagates backwards across that boundary.
//!
//! ## Formulas
//!
//! Discounted, bootstrapped:
//! `R_t = R_{t+1} * γ * m_{t+1} + r_t`, with `R_T = V(s_T)`
//!
//! GAE:
//! `δ_t = r_t + γ V(s_{t+1}) m_{t+1} - V(s_t)`,
//! `A_t = δ_t + γλ m_{t+1} A_{t+1}`, `R_t = A_t + V(s_t)`
//!
//! ## References
//!
//! - Schulman et al., "High-Dimensional Continuous Control Using
//!   Generalized Advantage Estimation" (2016)

/// Parameters of the return estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnParams {
    /// Smooth returns with generalized advantage estimation.
    pub use_gae: bool,
    /// Discount factor γ.
    pub discount_factor: f32,
    /// GAE λ (ignored when `use_gae` is false).
    pub gae_lambda: f32,
}

impl ReturnParams {
    pub fn new(use_gae: bool, discount_factor: f32, gae_lambda: f32) -> Self {
        Self {
            use_gae,
            discount_factor,
            gae_lambda,
        }
    }
}

/// Compute returns for every step of the rollout, including the bootstrap slot.
///
/// The final slot of the output is a copy of `value_preds[num_steps]` in both
/// branches, so the two estimators agree bit for bit at `t = num_steps`.
///
/// # Panics
///
/// Panics if the slice lengths disagree with `num_envs`.
pub fn compute_returns(
    rewards: &[f32],
    value_preds: &[f32],
    masks: &[f32],
    num_envs: usize,
    params: ReturnParams,
) -> Vec<f32> {
    assert!(num_envs > 0, "num_envs must be > 0");
    assert_eq!(rewards.len() % num_envs, 0, "rewards not divisible by num_envs");
    let num_steps = rewards.len() / num_envs;
    let slots = (num_steps + 1) * num_envs;
    assert_eq!(value_preds.len(), slots, "value_preds must span num_steps + 1");
    assert_eq!(masks.len(), slots, "masks must span num_steps + 1");

    let mut returns = vec![0.0f32; slots];
    let last = num_steps * num_envs;
    returns[last..].copy_from_slice(&value_preds[last..]);

    let gamma = params.discount_factor;
    if params.use_gae {
        let lambda = params.gae_lambda;
        let mut gae = vec![0.0f32; num_envs];
        for t in (0..num_steps).rev() {
            for e in 0..num_envs {
                let i = t * num_envs + e;
                let next = i + num_envs;
                let delta = rewards[i] + gamma * value_preds[next] * masks[next] - value_preds[i];
                gae[e] = delta + gamma * lambda * masks[next] * gae[e];
                returns[i] = gae[e] + value_preds[i];
            }
        }
    } else {
        for t in (0..num_steps).rev() {
            for e in 0..num_envs {
                let i = t * num_envs + e;
                let next = i + num_envs;
                returns[i] = returns[next] * gamma * masks[next] + rewards[i];
            }
        }
    }

    returns
}
