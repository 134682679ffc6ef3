//! Policy capability consumed by the rollout loop and the update procedures.
//!
//! A policy maps observations, recurrent state and masks to actions, value
//! estimates and log-probabilities. Every tensor carries a leading batch
//! dimension: `num_envs` rows while collecting a rollout, a minibatch subset
//! during an update.
//!
//! # Recurrent evaluation
//!
//! For recurrent policies `evaluate_actions` may receive fewer hidden rows
//! than observation rows. The observations then hold whole trajectories,
//! time-major `[T * n, obs]`, and `hidden_states` holds the `n` initial
//! states. The policy unrolls over `T`, resetting state where `masks` is zero.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::core::action_space::{ActionBatch, ActionSpace};

/// Output of [`Policy::act`].
#[derive(Debug, Clone)]
pub struct ActOutput<B: Backend> {
    /// Value estimates `[batch, 1]`.
    pub value: Tensor<B, 2>,
    /// Sampled actions.
    pub action: ActionBatch<B>,
    /// Log-probabilities of the sampled actions `[batch, 1]`.
    pub log_prob: Tensor<B, 2>,
    /// Recurrent state after this step `[batch, hidden]`.
    pub hidden_state: Tensor<B, 2>,
}

/// Output of [`Policy::evaluate_actions`].
#[derive(Debug, Clone)]
pub struct Evaluation<B: Backend> {
    /// Value estimates `[batch, 1]`.
    pub values: Tensor<B, 2>,
    /// Log-probabilities of the given actions `[batch, 1]`.
    pub log_probs: Tensor<B, 2>,
    /// Per-sample policy entropy `[batch, 1]`.
    pub entropy: Tensor<B, 2>,
}

/// Actor-critic policy.
pub trait Policy<B: Backend> {
    /// Sample actions for a batch of observations.
    fn act(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> ActOutput<B>;

    /// Value estimates only, `[batch, 1]`.
    fn get_values(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> Tensor<B, 2>;

    /// Re-evaluate stored actions under the current parameters.
    fn evaluate_actions(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
        actions: &ActionBatch<B>,
    ) -> Evaluation<B>;

    /// Whether the policy carries state across steps.
    fn is_recurrent(&self) -> bool;

    /// Width of the recurrent state stored in the rollout buffer.
    fn hidden_size(&self) -> usize;

    /// Flattened width of one observation.
    fn obs_size(&self) -> usize;

    fn action_space(&self) -> &ActionSpace;
}
