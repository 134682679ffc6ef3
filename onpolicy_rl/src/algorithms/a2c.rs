//! Advantage Actor-Critic.
//!
//! One gradient step per rollout over every sample in the buffer:
//!
//! ```text
//! A      = returns[0..T] - V(s)        (V re-evaluated under current params)
//! L_v    = mean(A²)
//! L_pi   = -mean(stop_grad(A) · log π(a|s))
//! L      = c_v · L_v + c_pi · L_pi - c_ent · H
//! ```

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use std::marker::PhantomData;

use super::algorithm::{
    check_policy_matches, tensor_to_scalar, warn_non_finite, Algorithm, LossCoefficients,
    UpdateDatum, UpdateError, ACTION_LOSS, ENTROPY, VALUE_LOSS,
};
use super::policy::Policy;
use super::policy_loss::policy_gradient_loss;
use crate::buffers::{MiniBatchStrategy, RolloutBuffer};

/// A2C hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct A2CConfig {
    pub coefficients: LossCoefficients,
    /// Base learning rate, scaled by the decay level on each update.
    pub learning_rate: f64,
}

impl Default for A2CConfig {
    fn default() -> Self {
        Self {
            coefficients: LossCoefficients::default(),
            learning_rate: 1e-3,
        }
    }
}

impl A2CConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_coefficients(mut self, coefficients: LossCoefficients) -> Self {
        self.coefficients = coefficients;
        self
    }
}

/// Synchronous advantage actor-critic.
pub struct A2C<B, P, O>
where
    B: AutodiffBackend,
    P: Policy<B> + AutodiffModule<B>,
    O: Optimizer<P, B>,
{
    policy: P,
    optimizer: O,
    config: A2CConfig,
    _backend: PhantomData<B>,
}

impl<B, P, O> A2C<B, P, O>
where
    B: AutodiffBackend,
    P: Policy<B> + AutodiffModule<B>,
    O: Optimizer<P, B>,
{
    pub fn new(policy: P, optimizer: O, config: A2CConfig) -> Self {
        Self {
            policy,
            optimizer,
            config,
            _backend: PhantomData,
        }
    }

    pub fn config(&self) -> &A2CConfig {
        &self.config
    }

    pub fn into_policy(self) -> P {
        self.policy
    }
}

impl<B, P, O> Algorithm<B, P> for A2C<B, P, O>
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
        let batch = buffer.full_batch(strategy)?;

        let evaluation = self.policy.evaluate_actions(
            batch.observations,
            batch.hidden_states,
            batch.masks,
            &batch.actions,
        );

        let advantages = batch.returns - evaluation.values;
        let value_loss = advantages.clone().powf_scalar(2.0).mean();
        let action_loss = policy_gradient_loss(evaluation.log_probs, advantages.detach());
        let entropy = evaluation.entropy.mean();

        let diagnostics = vec![
            UpdateDatum::new(VALUE_LOSS, tensor_to_scalar(&value_loss)?),
            UpdateDatum::new(ACTION_LOSS, tensor_to_scalar(&action_loss)?),
            UpdateDatum::new(ENTROPY, tensor_to_scalar(&entropy)?),
        ];
        warn_non_finite(&diagnostics);

        let loss = self
            .config
            .coefficients
            .combine(action_loss, value_loss, entropy);
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.policy);

        let lr = self.config.learning_rate * decay_level as f64;
        self.policy = self.optimizer.step(lr, self.policy.clone(), grads);

        Ok(diagnostics)
    }

    fn policy(&self) -> &P {
        &self.policy
    }

    fn name(&self) -> &'static str {
        "A2C"
    }
}
