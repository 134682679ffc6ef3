//! Update procedure abstraction shared by A2C and PPO.
//!
//! An [`Algorithm`] owns the policy and its optimizer. The trainer picks one
//! variant at setup and then calls [`Algorithm::update`] once per rollout:
//!
//! ```text
//! buffer filled → compute_returns → algorithm.update(&buffer, decay) → after_update
//! ```
//!
//! Each update returns named scalar diagnostics averaged over the gradient
//! steps it actually performed.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use std::fmt;

use super::policy::Policy;
use crate::buffers::{BufferError, RolloutBuffer};

/// Diagnostic names reported by every update.
pub const VALUE_LOSS: &str = "Value loss";
pub const ACTION_LOSS: &str = "Action loss";
pub const ENTROPY: &str = "Entropy";

// ============================================================================
// UpdateDatum
// ============================================================================

/// One named scalar produced by an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDatum {
    pub name: String,
    pub value: f32,
}

impl UpdateDatum {
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl fmt::Display for UpdateDatum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Look up a datum by name.
pub fn find_datum<'a>(data: &'a [UpdateDatum], name: &str) -> Option<&'a UpdateDatum> {
    data.iter().find(|d| d.name == name)
}

/// Running sums of per-iteration scalars, averaged at the end of an update.
///
/// Names keep their first-recorded order.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsAccumulator {
    sums: Vec<(&'static str, f64)>,
    iterations: usize,
}

impl DiagnosticsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the scalars of one gradient step.
    pub fn record(&mut self, values: &[(&'static str, f32)]) {
        for &(name, value) in values {
            match self.sums.iter_mut().find(|(n, _)| *n == name) {
                Some((_, sum)) => *sum += value as f64,
                None => self.sums.push((name, value as f64)),
            }
        }
        self.iterations += 1;
    }

    /// Number of recorded gradient steps.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Per-name averages over recorded iterations.
    pub fn averages(&self) -> Vec<UpdateDatum> {
        let n = self.iterations.max(1) as f64;
        self.sums
            .iter()
            .map(|&(name, sum)| UpdateDatum::new(name, (sum / n) as f32))
            .collect()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateError {
    /// The buffer is not ready or cannot be partitioned as requested.
    Buffer(BufferError),
    /// Buffer and policy disagree on a per-environment dimension.
    PolicyShape {
        field: &'static str,
        buffer: String,
        policy: String,
    },
    /// A loss value could not be read back.
    TensorData(String),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::Buffer(e) => write!(f, "buffer error: {}", e),
            UpdateError::PolicyShape {
                field,
                buffer,
                policy,
            } => write!(
                f,
                "{} mismatch: buffer has {}, policy has {}",
                field, buffer, policy
            ),
            UpdateError::TensorData(msg) => write!(f, "tensor data error: {}", msg),
        }
    }
}

impl std::error::Error for UpdateError {}

impl From<BufferError> for UpdateError {
    fn from(e: BufferError) -> Self {
        UpdateError::Buffer(e)
    }
}

// ============================================================================
// Algorithm Trait
// ============================================================================

/// On-policy update procedure.
///
/// # Type Parameters
///
/// - `B`: Autodiff backend for gradient computation
/// - `P`: Policy being optimized
pub trait Algorithm<B: AutodiffBackend, P> {
    /// Optimize the policy on a filled buffer whose returns have been computed.
    ///
    /// `decay_level` in `[0, 1]` scales the learning rate of every gradient step.
    fn update(
        &mut self,
        buffer: &RolloutBuffer<B>,
        decay_level: f32,
    ) -> Result<Vec<UpdateDatum>, UpdateError>;

    /// Current policy parameters.
    fn policy(&self) -> &P;

    /// Algorithm name for logging.
    fn name(&self) -> &'static str;
}

/// Weights of the three loss terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossCoefficients {
    pub actor_loss_coef: f32,
    pub value_loss_coef: f32,
    pub entropy_coef: f32,
}

impl Default for LossCoefficients {
    fn default() -> Self {
        Self {
            actor_loss_coef: 1.0,
            value_loss_coef: 0.5,
            entropy_coef: 1e-3,
        }
    }
}

impl LossCoefficients {
    /// `value_coef * value_loss + actor_coef * action_loss - entropy_coef * entropy`.
    pub fn combine<B: Backend>(
        &self,
        action_loss: Tensor<B, 1>,
        value_loss: Tensor<B, 1>,
        entropy: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        value_loss.mul_scalar(self.value_loss_coef) + action_loss.mul_scalar(self.actor_loss_coef)
            - entropy.mul_scalar(self.entropy_coef)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Create an Adam optimizer with optional gradient-norm clipping.
pub fn adam_optimizer<B, M>(epsilon: f32, max_grad_norm: Option<f32>) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut adam_config = AdamConfig::new().with_epsilon(epsilon);
    if let Some(max_norm) = max_grad_norm {
        adam_config = adam_config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm)));
    }
    adam_config.init()
}

/// Read a single-element tensor back as `f32`.
pub fn tensor_to_scalar<B: Backend>(tensor: &Tensor<B, 1>) -> Result<f32, UpdateError> {
    tensor
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| UpdateError::TensorData(format!("{:?}", e)))?
        .first()
        .copied()
        .ok_or_else(|| UpdateError::TensorData("empty loss tensor".to_string()))
}

/// Log every non-finite diagnostic.
pub fn warn_non_finite(data: &[UpdateDatum]) {
    for datum in data.iter().filter(|d| !d.value.is_finite()) {
        log::warn!("Non-finite update diagnostic: {}", datum);
    }
}

/// Fail fast when the policy was built for a different buffer layout.
pub fn check_policy_matches<B: Backend, P: Policy<B>>(
    buffer: &RolloutBuffer<B>,
    policy: &P,
) -> Result<(), UpdateError> {
    if buffer.obs_size() != policy.obs_size() {
        return Err(UpdateError::PolicyShape {
            field: "obs_size",
            buffer: buffer.obs_size().to_string(),
            policy: policy.obs_size().to_string(),
        });
    }
    if buffer.hidden_size() != policy.hidden_size() {
        return Err(UpdateError::PolicyShape {
            field: "hidden_size",
            buffer: buffer.hidden_size().to_string(),
            policy: policy.hidden_size().to_string(),
        });
    }
    if buffer.action_space() != policy.action_space() {
        return Err(UpdateError::PolicyShape {
            field: "action_space",
            buffer: format!("{:?}", buffer.action_space()),
            policy: format!("{:?}", policy.action_space()),
        });
    }
    if !buffer.is_filled() {
        return Err(UpdateError::Buffer(BufferError::NotFilled {
            step: buffer.step(),
            num_steps: buffer.num_steps(),
        }));
    }
    Ok(())
}
