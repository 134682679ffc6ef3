//! Network building blocks.
//!
//! - [`orthogonal`]: linear layer with orthogonal initialization
//! - [`mlp_policy`]: MLP actor-critic implementing [`crate::algorithms::Policy`]

pub mod mlp_policy;
pub mod orthogonal;

pub use mlp_policy::{MlpPolicy, MlpPolicyConfig};
pub use orthogonal::{orthogonal_weights, OrthogonalLinear, OrthogonalLinearConfig};
