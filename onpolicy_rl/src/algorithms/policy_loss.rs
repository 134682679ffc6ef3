//! Actor-critic loss terms.
//!
//! All inputs are column tensors `[batch, 1]`; every function returns a
//! single-element tensor suitable for `backward()`.
//!
//! # Numerical Stability
//!
//! Importance ratios are computed as `exp(log_ratio)` with the log ratio
//! clamped to [-20, 20], which keeps ratios finite for any practical policy.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maximum log ratio before exp() to prevent overflow.
const MAX_LOG_RATIO: f32 = 20.0;

fn ratio<B: Backend>(log_probs: Tensor<B, 2>, old_log_probs: Tensor<B, 2>) -> Tensor<B, 2> {
    (log_probs - old_log_probs)
        .clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO)
        .exp()
}

/// PPO clipped surrogate loss.
///
/// `-mean(min(r A, clip(r, 1-ε, 1+ε) A))` with `r = exp(log π - log π_old)`.
pub fn clipped_surrogate_loss<B: Backend>(
    log_probs: Tensor<B, 2>,
    old_log_probs: Tensor<B, 2>,
    advantages: Tensor<B, 2>,
    clip_param: f32,
) -> Tensor<B, 1> {
    let ratio = ratio(log_probs, old_log_probs);
    let clipped = ratio.clone().clamp(1.0 - clip_param, 1.0 + clip_param);

    let surr1 = ratio * advantages.clone();
    let surr2 = clipped * advantages;

    -surr1.min_pair(surr2).mean()
}

/// Vanilla policy-gradient loss `-mean(A * log π)`.
///
/// `advantages` must already be detached.
pub fn policy_gradient_loss<B: Backend>(
    log_probs: Tensor<B, 2>,
    advantages: Tensor<B, 2>,
) -> Tensor<B, 1> {
    -(advantages * log_probs).mean()
}

/// Mean squared error between value estimates and return targets.
pub fn value_loss<B: Backend>(values: Tensor<B, 2>, returns: Tensor<B, 2>) -> Tensor<B, 1> {
    (returns - values).powf_scalar(2.0).mean()
}

/// Standardize advantages to zero mean and unit variance.
///
/// Divides by `std + epsilon`, so a constant batch maps to zeros instead of NaN.
pub fn normalize_advantages<B: Backend>(advantages: Tensor<B, 2>, epsilon: f32) -> Tensor<B, 2> {
    let centered = advantages.clone() - advantages.mean().unsqueeze::<2>();
    let std = centered.clone().powf_scalar(2.0).mean().sqrt();
    centered / (std + epsilon).unsqueeze::<2>()
}

/// Approximate KL divergence `mean((r - 1) - log r)` between the rollout
/// policy and the current one.
///
/// Non-negative and unbiased; see Schulman, "Approximating KL Divergence".
pub fn approx_kl<B: Backend>(log_probs: Tensor<B, 2>, old_log_probs: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_ratio = (log_probs - old_log_probs).clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO);
    ((log_ratio.clone().exp() - 1.0) - log_ratio).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray<f32>;

    fn column(values: &[f32]) -> Tensor<TB, 2> {
        Tensor::<TB, 1>::from_floats(values, &Default::default()).reshape([values.len(), 1])
    }

    fn scalar(t: Tensor<TB, 1>) -> f32 {
        t.into_data().as_slice::<f32>().unwrap()[0]
    }

    #[test]
    fn test_clipped_surrogate_no_clip() {
        // Identical policies: ratio = 1, loss = -mean(A)
        let logp = column(&[-0.5, -1.0, -2.0]);
        let adv = column(&[1.0, 2.0, 3.0]);
        let loss = scalar(clipped_surrogate_loss(logp.clone(), logp, adv, 0.2));
        assert!((loss + 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_clipped_surrogate_clips_positive_advantage() {
        // ratio = e^1 ≈ 2.718 > 1.2, positive advantage → clipped at 1.2
        let loss = scalar(clipped_surrogate_loss(
            column(&[0.0]),
            column(&[-1.0]),
            column(&[1.0]),
            0.2,
        ));
        assert!((loss + 1.2).abs() < 1e-5);
    }

    #[test]
    fn test_clipped_surrogate_keeps_pessimistic_negative_advantage() {
        // ratio ≈ 2.718, negative advantage → unclipped term is the minimum
        let loss = scalar(clipped_surrogate_loss(
            column(&[0.0]),
            column(&[-1.0]),
            column(&[-1.0]),
            0.2,
        ));
        assert!((loss - std::f32::consts::E).abs() < 1e-4);
    }

    #[test]
    fn test_policy_gradient_loss() {
        let loss = scalar(policy_gradient_loss(column(&[-1.0, -2.0]), column(&[2.0, -1.0])));
        // -mean(-2, 2) = 0
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn test_value_loss_mse() {
        let loss = scalar(value_loss(column(&[1.0, 2.0]), column(&[2.0, 4.0])));
        assert!((loss - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_advantages() {
        let normalized = normalize_advantages(column(&[1.0, 2.0, 3.0, 4.0]), 1e-8);
        let values = normalized.into_data().to_vec::<f32>().unwrap();
        let mean: f32 = values.iter().sum::<f32>() / 4.0;
        let var: f32 = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_constant_advantages_is_finite() {
        let normalized = normalize_advantages(column(&[3.0, 3.0, 3.0]), 1e-5);
        let values = normalized.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite() && v.abs() < 1e-6));

        let single = normalize_advantages(column(&[7.0]), 1e-5);
        assert_eq!(single.into_data().to_vec::<f32>().unwrap(), vec![0.0]);
    }

    #[test]
    fn test_approx_kl_zero_for_identical() {
        let logp = column(&[-0.3, -1.2, -2.5]);
        assert!(scalar(approx_kl(logp.clone(), logp)).abs() < 1e-7);
    }

    #[test]
    fn test_approx_kl_positive() {
        let kl = scalar(approx_kl(column(&[-0.1, -3.0]), column(&[-1.0, -0.5])));
        // r - 1 - log r for log r = 0.9 and -2.5
        let expected = ((0.9f32.exp() - 1.0 - 0.9) + ((-2.5f32).exp() - 1.0 + 2.5)) / 2.0;
        assert!(kl > 0.0);
        assert!((kl - expected).abs() < 1e-5);
    }
}
