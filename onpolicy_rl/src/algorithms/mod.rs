//! Update procedures and the pieces they share.
//!
//! - `policy`: the actor-critic capability the procedures optimize
//! - `returns`: discounted and GAE return estimation
//! - `policy_loss`: surrogate, value and KL terms
//! - `algorithm`: the `Algorithm` trait, diagnostics and optimizer setup
//! - `a2c`: one gradient step per rollout
//! - `ppo`: clipped surrogate over epochs of minibatches with KL early stop

pub mod a2c;
pub mod algorithm;
pub mod policy;
pub mod policy_loss;
pub mod ppo;
pub mod returns;

#[cfg(test)]
mod tests;

pub use a2c::{A2CConfig, A2C};
pub use algorithm::{
    adam_optimizer, find_datum, Algorithm, DiagnosticsAccumulator, LossCoefficients, UpdateDatum,
    UpdateError, ACTION_LOSS, ENTROPY, VALUE_LOSS,
};
pub use policy::{ActOutput, Evaluation, Policy};
pub use policy_loss::{approx_kl, clipped_surrogate_loss, normalize_advantages, value_loss};
pub use ppo::{PPOConfig, ADVANTAGE_EPSILON, APPROX_KL, CLIP_FRACTION, EARLY_STOP_EPOCH, PPO};
pub use returns::{compute_returns, ReturnParams};
