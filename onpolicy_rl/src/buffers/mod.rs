//! Rollout storage for on-policy training.
//!
//! - [`RolloutBuffer`]: time-major tensors for one rollout of `num_steps x num_envs`
//! - [`MiniBatch`]: one shuffled slice of a filled buffer, feed-forward or recurrent

pub mod minibatch;
pub mod rollout_buffer;

pub use minibatch::{partition_indices, MiniBatch, MiniBatchStrategy};
pub use rollout_buffer::{ActionStore, BufferError, MiniBatchIter, RolloutBuffer, Slot};
