//! Proximal Policy Optimization.
//!
//! Multiple epochs over the rollout, each split into freshly shuffled
//! minibatches. Per minibatch:
//!
//! ```text
//! r      = exp(log π(a|s) - log π_old(a|s))
//! Â      = normalize(returns - V_old)               (per minibatch)
//! L_pi   = -mean(min(r Â, clip(r, 1-ε, 1+ε) Â))
//! L_v    = mean((returns - V(s))²)
//! L      = c_v · L_v + c_pi · L_pi - c_ent · H
//! ```
//!
//! With a KL target set, the update stops as soon as the approximate KL of a
//! minibatch exceeds it; diagnostics cover only the steps actually taken.

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::marker::PhantomData;

use super::algorithm::{
    check_policy_matches, tensor_to_scalar, warn_non_finite, Algorithm, DiagnosticsAccumulator,
    LossCoefficients, UpdateDatum, UpdateError, ACTION_LOSS, ENTROPY, VALUE_LOSS,
};
use super::policy::Policy;
use super::policy_loss::{approx_kl, clipped_surrogate_loss, normalize_advantages, value_loss};
use crate::buffers::{MiniBatchStrategy, RolloutBuffer};

pub const APPROX_KL: &str = "Approx KL";
pub const CLIP_FRACTION: &str = "Clip fraction";
pub const EARLY_STOP_EPOCH: &str = "Early stop epoch";

/// Added to the advantage standard deviation before dividing.
pub const ADVANTAGE_EPSILON: f32 = 1e-8;

/// PPO hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PPOConfig {
    pub coefficients: LossCoefficients,
    pub learning_rate: f64,
    /// Surrogate clipping range ε.
    pub clip_param: f32,
    pub num_epoch: usize,
    pub num_mini_batch: usize,
    /// Stop the update once approximate KL exceeds this.
    pub kl_target: Option<f32>,
    /// Seed for minibatch shuffling.
    pub seed: u64,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            coefficients: LossCoefficients::default(),
            learning_rate: 1e-3,
            clip_param: 0.2,
            num_epoch: 3,
            num_mini_batch: 20,
            kl_target: Some(0.5),
            seed: 0,
        }
    }
}

impl PPOConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_coefficients(mut self, coefficients: LossCoefficients) -> Self {
        self.coefficients = coefficients;
        self
    }

    pub fn with_clip_param(mut self, clip_param: f32) -> Self {
        self.clip_param = clip_param;
        self
    }

    pub fn with_num_epoch(mut self, num_epoch: usize) -> Self {
        self.num_epoch = num_epoch;
        self
    }

    pub fn with_num_mini_batch(mut self, num_mini_batch: usize) -> Self {
        self.num_mini_batch = num_mini_batch;
        self
    }

    pub fn with_kl_target(mut self, kl_target: Option<f32>) -> Self {
        self.kl_target = kl_target;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Upper bound on gradient steps per update.
    pub fn max_iterations(&self) -> usize {
        self.num_epoch * self.num_mini_batch
    }
}

/// Clipped-surrogate PPO.
pub struct PPO<B, P, O>
where
    B: AutodiffBackend,
    P: Policy<B> + AutodiffModule<B>,
    O: Optimizer<P, B>,
{
    policy: P,
    optimizer: O,
    config: PPOConfig,
    rng: StdRng,
    last_iterations: usize,
    _backend: PhantomData<B>,
}

impl<B, P, O> PPO<B, P, O>
where
    B: AutodiffBackend,
    P: Policy<B> + AutodiffModule<B>,
    O: Optimizer<P, B>,
{
    pub fn new(policy: P, optimizer: O, config: PPOConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            policy,
            optimizer,
            config,
            rng,
            last_iterations: 0,
            _backend: PhantomData,
        }
    }

    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// Gradient steps taken by the most recent update.
    pub fn last_iterations(&self) -> usize {
        self.last_iterations
    }

    pub fn into_policy(self) -> P {
        self.policy
    }
}

impl<B, P, O> Algorithm<B, P> for PPO<B, P, O>
where
    B: AutodiffBackend,
    P: Policy<B> + AutodiffModule<B>,
    O: Optimizer<P, B>,
{
    fn update(
        &mut self,
        buffer: &RolloutBuffer<B>,
        decay_level: f32,
    ) -> Result<Vec<UpdateDatum>, UpdateError> {
        check_policy_matches(buffer, &self.policy)?;

        let strategy = MiniBatchStrategy::for_policy(self.policy.is_recurrent());
        let lr = self.config.learning_rate * decay_level as f64;
        let clip = self.config.clip_param;
        let mut diagnostics = DiagnosticsAccumulator::new();
        let mut early_stop_epoch = None;

        'epochs: for epoch in 0..self.config.num_epoch {
            let batches = buffer.minibatches(strategy, self.config.num_mini_batch, &mut self.rng)?;

            for batch in batches {
                let advantages = normalize_advantages(batch.advantages(), ADVANTAGE_EPSILON);
                let evaluation = self.policy.evaluate_actions(
                    batch.observations,
                    batch.hidden_states,
                    batch.masks,
                    &batch.actions,
                );

                let log_probs = evaluation.log_probs.clone().detach();
                let kl = tensor_to_scalar(&approx_kl(log_probs.clone(), batch.old_log_probs.clone()))?;
                let clip_fraction = (log_probs - batch.old_log_probs.clone())
                    .exp()
                    .sub_scalar(1.0)
                    .abs()
                    .greater_elem(clip)
                    .float()
                    .mean();

                let action_loss = clipped_surrogate_loss(
                    evaluation.log_probs,
                    batch.old_log_probs,
                    advantages,
                    clip,
                );
                let value_loss = value_loss(evaluation.values, batch.returns);
                let entropy = evaluation.entropy.mean();

                diagnostics.record(&[
                    (VALUE_LOSS, tensor_to_scalar(&value_loss)?),
                    (ACTION_LOSS, tensor_to_scalar(&action_loss)?),
                    (ENTROPY, tensor_to_scalar(&entropy)?),
                    (APPROX_KL, kl),
                    (CLIP_FRACTION, tensor_to_scalar(&clip_fraction)?),
                ]);

                let loss = self
                    .config
                    .coefficients
                    .combine(action_loss, value_loss, entropy);
                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &self.policy);
                self.policy = self.optimizer.step(lr, self.policy.clone(), grads);

                if let Some(target) = self.config.kl_target {
                    if kl > target {
                        log::debug!(
                            "KL early stop triggered: approx_kl={:.4} > kl_target={:.4} (epoch {})",
                            kl,
                            target,
                            epoch
                        );
                        early_stop_epoch = Some(epoch);
                        break 'epochs;
                    }
                }
            }
        }

        self.last_iterations = diagnostics.iterations();
        log::debug!(
            "PPO update: {} of {} iterations",
            self.last_iterations,
            self.config.max_iterations()
        );
        let mut data = diagnostics.averages();
        warn_non_finite(&data);
        if let Some(epoch) = early_stop_epoch {
            data.push(UpdateDatum::new(EARLY_STOP_EPOCH, epoch as f32));
        }
        Ok(data)
    }

    fn policy(&self) -> &P {
        &self.policy
    }

    fn name(&self) -> &'static str {
        "PPO"
    }
}
