//! Time-major rollout buffer for on-policy actor-critic training.
//!
//! Holds one rollout of `num_steps` transitions for `num_envs` parallel
//! environments as burn tensors:
//!
//! ```text
//! observations       [T+1, N, obs_size]
//! hidden_states      [T+1, N, hidden_size]
//! rewards            [T,   N, 1]
//! value_predictions  [T+1, N, 1]
//! returns            [T+1, N, 1]
//! action_log_probs   [T,   N, 1]
//! actions            [T,   N, action_width]   (Int for Discrete, float for Box)
//! masks              [T+1, N, 1]              (initialised to ones)
//! ```
//!
//! # Cycle
//!
//! 1. `set_first_observation` seeds slot 0 once per run.
//! 2. `insert` is called `num_steps` times. Step `s` writes observation,
//!    hidden state and mask to slot `s + 1`, and action, log-prob, value
//!    prediction and reward to slot `s`. After the last insert the cursor
//!    wraps to 0 and the buffer is marked filled.
//! 3. `compute_returns` stores the bootstrap value at slot `T` and fills
//!    `returns`.
//! 4. The update reads minibatches.
//! 5. `after_update` carries slot `T` of observations, hidden states and masks
//!    into slot 0 and reopens the buffer for inserts.

use burn::tensor::backend::Backend;
use burn::tensor::{BasicOps, Int, Numeric, Tensor};
use rand::Rng;
use std::fmt;

use super::minibatch::{
    partition_indices, trajectory_sample_indices, MiniBatch, MiniBatchStrategy,
};
use crate::algorithms::returns::{compute_returns, ReturnParams};
use crate::core::action_space::{ActionBatch, ActionKind, ActionSpace};

// ============================================================================
// Errors
// ============================================================================

/// Shape and sequencing errors raised by [`RolloutBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum BufferError {
    /// A construction dimension is zero.
    InvalidDimension { field: &'static str },
    /// A tensor handed to the buffer has the wrong shape.
    ShapeMismatch {
        field: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// Discrete actions given to a Box buffer or the other way round.
    ActionKindMismatch { expected: ActionKind, actual: ActionKind },
    /// `insert` called on a full buffer before `after_update`.
    Overflow { num_steps: usize },
    /// The rollout is not complete yet.
    NotFilled { step: usize, num_steps: usize },
    /// Fewer samples than requested minibatches.
    MinibatchCount { samples: usize, minibatches: usize },
    /// Slot index past the end of an array.
    SlotOutOfRange { index: usize, len: usize },
    /// Tensor data could not be read back.
    TensorData(String),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::InvalidDimension { field } => write!(f, "{} must be > 0", field),
            BufferError::ShapeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "{}: expected shape {:?}, got {:?}", field, expected, actual),
            BufferError::ActionKindMismatch { expected, actual } => {
                write!(f, "expected {} actions, got {}", expected, actual)
            }
            BufferError::Overflow { num_steps } => write!(
                f,
                "buffer already holds {} steps; call after_update before inserting",
                num_steps
            ),
            BufferError::NotFilled { step, num_steps } => write!(
                f,
                "rollout incomplete: {} of {} steps inserted",
                step, num_steps
            ),
            BufferError::MinibatchCount {
                samples,
                minibatches,
            } => write!(
                f,
                "cannot split {} samples into {} minibatches",
                samples, minibatches
            ),
            BufferError::SlotOutOfRange { index, len } => {
                write!(f, "slot {} out of range for length {}", index, len)
            }
            BufferError::TensorData(msg) => write!(f, "tensor data error: {}", msg),
        }
    }
}

impl std::error::Error for BufferError {}

// ============================================================================
// Slot
// ============================================================================

/// Time slot selector for the `num_steps + 1` long arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    At(usize),
    /// The final slot, `len - 1`.
    Last,
}

impl Slot {
    /// Resolve against an array of `len` time slots.
    pub fn resolve(self, len: usize) -> Result<usize, BufferError> {
        match self {
            Slot::At(index) if index < len => Ok(index),
            Slot::At(index) => Err(BufferError::SlotOutOfRange { index, len }),
            Slot::Last => len
                .checked_sub(1)
                .ok_or(BufferError::SlotOutOfRange { index: 0, len }),
        }
    }
}

// ============================================================================
// ActionStore
// ============================================================================

/// Action array, `[num_steps, num_envs, action_width]`.
#[derive(Debug, Clone)]
pub enum ActionStore<B: Backend> {
    Discrete(Tensor<B, 3, Int>),
    Continuous(Tensor<B, 3>),
}

impl<B: Backend> ActionStore<B> {
    fn zeros(space: &ActionSpace, num_steps: usize, num_envs: usize, device: &B::Device) -> Self {
        let shape = [num_steps, num_envs, space.action_width()];
        match space.kind {
            ActionKind::Discrete => ActionStore::Discrete(Tensor::zeros(shape, device)),
            ActionKind::Box => ActionStore::Continuous(Tensor::zeros(shape, device)),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionStore::Discrete(_) => ActionKind::Discrete,
            ActionStore::Continuous(_) => ActionKind::Box,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        match self {
            ActionStore::Discrete(t) => t.dims(),
            ActionStore::Continuous(t) => t.dims(),
        }
    }

    fn write(self, slot: usize, action: ActionBatch<B>) -> Result<Self, BufferError> {
        match (self, action) {
            (ActionStore::Discrete(store), ActionBatch::Discrete(a)) => {
                Ok(ActionStore::Discrete(write_slot(store, slot, a)))
            }
            (ActionStore::Continuous(store), ActionBatch::Continuous(a)) => {
                Ok(ActionStore::Continuous(write_slot(store, slot, a.detach())))
            }
            (store, action) => Err(BufferError::ActionKindMismatch {
                expected: store.kind(),
                actual: action.kind(),
            }),
        }
    }

    fn gather_samples(&self, steps: usize, rows: Tensor<B, 1, Int>) -> ActionBatch<B> {
        match self {
            ActionStore::Discrete(t) => ActionBatch::Discrete(flat_rows(t, steps).select(0, rows)),
            ActionStore::Continuous(t) => {
                ActionBatch::Continuous(flat_rows(t, steps).select(0, rows))
            }
        }
    }

    fn gather_envs(&self, steps: usize, envs: Tensor<B, 1, Int>) -> ActionBatch<B> {
        match self {
            ActionStore::Discrete(t) => ActionBatch::Discrete(env_rows(t, steps, envs)),
            ActionStore::Continuous(t) => ActionBatch::Continuous(env_rows(t, steps, envs)),
        }
    }

    fn to_device(self, device: &B::Device) -> Self {
        match self {
            ActionStore::Discrete(t) => ActionStore::Discrete(t.to_device(device)),
            ActionStore::Continuous(t) => ActionStore::Continuous(t.to_device(device)),
        }
    }
}

// ============================================================================
// Tensor helpers
// ============================================================================

fn write_slot<B: Backend, K: BasicOps<B>>(
    tensor: Tensor<B, 3, K>,
    slot: usize,
    value: Tensor<B, 2, K>,
) -> Tensor<B, 3, K> {
    let [_, n, d] = tensor.dims();
    tensor.slice_assign([slot..slot + 1, 0..n, 0..d], value.reshape([1, n, d]))
}

fn copy_slot<B: Backend, K: BasicOps<B>>(
    tensor: Tensor<B, 3, K>,
    from: usize,
    to: usize,
) -> Tensor<B, 3, K> {
    let [_, n, d] = tensor.dims();
    let src = tensor.clone().slice([from..from + 1, 0..n, 0..d]);
    tensor.slice_assign([to..to + 1, 0..n, 0..d], src)
}

fn read_slot<B: Backend, K: BasicOps<B>>(tensor: &Tensor<B, 3, K>, slot: usize) -> Tensor<B, 2, K> {
    let [_, n, d] = tensor.dims();
    tensor.clone().slice([slot..slot + 1, 0..n, 0..d]).reshape([n, d])
}

/// First `steps` slots with time and environment flattened, `[steps * N, d]`.
fn flat_rows<B: Backend, K: BasicOps<B>>(tensor: &Tensor<B, 3, K>, steps: usize) -> Tensor<B, 2, K> {
    let [_, n, d] = tensor.dims();
    tensor.clone().slice([0..steps, 0..n, 0..d]).reshape([steps * n, d])
}

/// First `steps` slots of the selected environments, time-major `[steps * n_sel, d]`.
fn env_rows<B: Backend, K: Numeric<B>>(
    tensor: &Tensor<B, 3, K>,
    steps: usize,
    envs: Tensor<B, 1, Int>,
) -> Tensor<B, 2, K> {
    let [_, n, d] = tensor.dims();
    let n_sel = envs.dims()[0];
    tensor
        .clone()
        .slice([0..steps, 0..n, 0..d])
        .select(1, envs)
        .reshape([steps * n_sel, d])
}

fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let ints: Vec<i32> = indices.iter().map(|&i| i as i32).collect();
    Tensor::from_ints(ints.as_slice(), device)
}

fn check_dims(field: &'static str, actual: [usize; 2], expected: [usize; 2]) -> Result<(), BufferError> {
    if actual == expected {
        Ok(())
    } else {
        Err(BufferError::ShapeMismatch {
            field,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

fn read_floats<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Result<Vec<f32>, BufferError> {
    tensor
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| BufferError::TensorData(format!("{:?}", e)))
}

// ============================================================================
// RolloutBuffer
// ============================================================================

/// Fixed-capacity, time-major storage for one rollout.
#[derive(Debug, Clone)]
pub struct RolloutBuffer<B: Backend> {
    num_steps: usize,
    num_envs: usize,
    observation_shape: Vec<usize>,
    obs_size: usize,
    action_space: ActionSpace,
    hidden_size: usize,
    step: usize,
    filled: bool,
    device: B::Device,

    observations: Tensor<B, 3>,
    hidden_states: Tensor<B, 3>,
    rewards: Tensor<B, 3>,
    value_predictions: Tensor<B, 3>,
    returns: Tensor<B, 3>,
    action_log_probs: Tensor<B, 3>,
    actions: ActionStore<B>,
    masks: Tensor<B, 3>,
}

impl<B: Backend> RolloutBuffer<B> {
    /// Allocate a zeroed buffer (masks start at one).
    ///
    /// Observations of any rank are stored row-major flattened, as a
    /// `[num_steps + 1, num_envs, product(observation_shape)]` tensor, so the
    /// policy's input layer can read a slot without reshaping. Callers pass
    /// observations already flattened to `[num_envs, obs_size]` and reshape
    /// slots back when they need the original extents, which
    /// [`observation_dims`](Self::observation_dims) reports.
    pub fn new(
        num_steps: usize,
        num_envs: usize,
        observation_shape: &[usize],
        action_space: ActionSpace,
        hidden_size: usize,
        device: &B::Device,
    ) -> Result<Self, BufferError> {
        let obs_size: usize = observation_shape.iter().product();
        for (field, value) in [
            ("num_steps", num_steps),
            ("num_envs", num_envs),
            ("observation_shape", obs_size),
            ("action_width", action_space.action_width()),
            ("hidden_size", hidden_size),
        ] {
            if value == 0 {
                return Err(BufferError::InvalidDimension { field });
            }
        }
        if observation_shape.is_empty() {
            return Err(BufferError::InvalidDimension {
                field: "observation_shape",
            });
        }

        let actions = ActionStore::zeros(&action_space, num_steps, num_envs, device);
        Ok(Self {
            num_steps,
            num_envs,
            observation_shape: observation_shape.to_vec(),
            obs_size,
            action_space,
            hidden_size,
            step: 0,
            filled: false,
            device: device.clone(),
            observations: Tensor::zeros([num_steps + 1, num_envs, obs_size], device),
            hidden_states: Tensor::zeros([num_steps + 1, num_envs, hidden_size], device),
            rewards: Tensor::zeros([num_steps, num_envs, 1], device),
            value_predictions: Tensor::zeros([num_steps + 1, num_envs, 1], device),
            returns: Tensor::zeros([num_steps + 1, num_envs, 1], device),
            action_log_probs: Tensor::zeros([num_steps, num_envs, 1], device),
            actions,
            masks: Tensor::ones([num_steps + 1, num_envs, 1], device),
        })
    }

    /// Seed slot 0 with the initial observation batch `[num_envs, obs_size]`.
    pub fn set_first_observation(&mut self, observation: Tensor<B, 2>) -> Result<(), BufferError> {
        check_dims("observation", observation.dims(), [self.num_envs, self.obs_size])?;
        self.observations = write_slot(self.observations.clone(), 0, observation);
        Ok(())
    }

    /// Record one environment step for every environment.
    ///
    /// All per-environment tensors must have `num_envs` rows. Values,
    /// log-probabilities and hidden states are detached from any autodiff graph.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        observation: Tensor<B, 2>,
        hidden_state: Tensor<B, 2>,
        action: ActionBatch<B>,
        action_log_prob: Tensor<B, 2>,
        value_prediction: Tensor<B, 2>,
        reward: Tensor<B, 2>,
        mask: Tensor<B, 2>,
    ) -> Result<(), BufferError> {
        if self.filled {
            return Err(BufferError::Overflow {
                num_steps: self.num_steps,
            });
        }

        let n = self.num_envs;
        check_dims("observation", observation.dims(), [n, self.obs_size])?;
        check_dims("hidden_state", hidden_state.dims(), [n, self.hidden_size])?;
        if action.kind() != self.action_space.kind {
            return Err(BufferError::ActionKindMismatch {
                expected: self.action_space.kind,
                actual: action.kind(),
            });
        }
        check_dims("action", action.dims(), [n, self.action_space.action_width()])?;
        check_dims("action_log_prob", action_log_prob.dims(), [n, 1])?;
        check_dims("value_prediction", value_prediction.dims(), [n, 1])?;
        check_dims("reward", reward.dims(), [n, 1])?;
        check_dims("mask", mask.dims(), [n, 1])?;

        let s = self.step;
        self.observations = write_slot(self.observations.clone(), s + 1, observation);
        self.hidden_states = write_slot(self.hidden_states.clone(), s + 1, hidden_state.detach());
        self.masks = write_slot(self.masks.clone(), s + 1, mask);
        self.actions = self.actions.clone().write(s, action)?;
        self.action_log_probs = write_slot(self.action_log_probs.clone(), s, action_log_prob.detach());
        self.value_predictions = write_slot(self.value_predictions.clone(), s, value_prediction.detach());
        self.rewards = write_slot(self.rewards.clone(), s, reward);

        self.step = (s + 1) % self.num_steps;
        if self.step == 0 {
            self.filled = true;
        }
        Ok(())
    }

    /// Carry the final observation, hidden state and mask into slot 0 and
    /// reopen the buffer for the next rollout.
    pub fn after_update(&mut self) {
        let last = self.num_steps;
        self.observations = copy_slot(self.observations.clone(), last, 0);
        self.hidden_states = copy_slot(self.hidden_states.clone(), last, 0);
        self.masks = copy_slot(self.masks.clone(), last, 0);
        self.step = 0;
        self.filled = false;
    }

    /// Fill `returns` from the stored rollout and the bootstrap `next_value`
    /// `[num_envs, 1]`.
    ///
    /// `next_value` is also written to `value_predictions[num_steps]`.
    pub fn compute_returns(
        &mut self,
        next_value: Tensor<B, 2>,
        use_gae: bool,
        discount_factor: f32,
        gae_lambda: f32,
    ) -> Result<(), BufferError> {
        self.ensure_filled()?;
        check_dims("next_value", next_value.dims(), [self.num_envs, 1])?;

        self.value_predictions =
            write_slot(self.value_predictions.clone(), self.num_steps, next_value.detach());

        let rewards = read_floats(&self.rewards)?;
        let values = read_floats(&self.value_predictions)?;
        let masks = read_floats(&self.masks)?;
        let returns = compute_returns(
            &rewards,
            &values,
            &masks,
            self.num_envs,
            ReturnParams::new(use_gae, discount_factor, gae_lambda),
        );

        self.returns = Tensor::<B, 1>::from_floats(returns.as_slice(), &self.device).reshape([
            self.num_steps + 1,
            self.num_envs,
            1,
        ]);
        Ok(())
    }

    /// Move every array to `device`.
    pub fn to(&mut self, device: &B::Device) {
        self.observations = self.observations.clone().to_device(device);
        self.hidden_states = self.hidden_states.clone().to_device(device);
        self.rewards = self.rewards.clone().to_device(device);
        self.value_predictions = self.value_predictions.clone().to_device(device);
        self.returns = self.returns.clone().to_device(device);
        self.action_log_probs = self.action_log_probs.clone().to_device(device);
        self.actions = self.actions.clone().to_device(device);
        self.masks = self.masks.clone().to_device(device);
        self.device = device.clone();
    }

    /// Split the filled rollout into `num_mini_batch` shuffled minibatches.
    ///
    /// Partitions are drawn from `rng` on every call. Tensors are gathered
    /// lazily as the iterator advances.
    pub fn minibatches<R: Rng + ?Sized>(
        &self,
        strategy: MiniBatchStrategy,
        num_mini_batch: usize,
        rng: &mut R,
    ) -> Result<MiniBatchIter<'_, B>, BufferError> {
        self.ensure_filled()?;
        let samples = match strategy {
            MiniBatchStrategy::FeedForward => self.num_steps * self.num_envs,
            MiniBatchStrategy::Recurrent => self.num_envs,
        };
        if num_mini_batch == 0 || num_mini_batch > samples {
            return Err(BufferError::MinibatchCount {
                samples,
                minibatches: num_mini_batch,
            });
        }

        let groups = partition_indices(samples, num_mini_batch, rng);
        Ok(MiniBatchIter {
            buffer: self,
            strategy,
            groups: groups.into_iter(),
        })
    }

    /// The whole filled rollout as one time-major batch, in storage order.
    pub fn full_batch(&self, strategy: MiniBatchStrategy) -> Result<MiniBatch<B>, BufferError> {
        self.ensure_filled()?;
        Ok(match strategy {
            MiniBatchStrategy::FeedForward => {
                self.gather_feed_forward((0..self.num_steps * self.num_envs).collect())
            }
            MiniBatchStrategy::Recurrent => self.gather_recurrent((0..self.num_envs).collect()),
        })
    }

    fn gather_feed_forward(&self, samples: Vec<usize>) -> MiniBatch<B> {
        let t = self.num_steps;
        let rows = index_tensor::<B>(&samples, &self.device);
        MiniBatch {
            observations: flat_rows(&self.observations, t).select(0, rows.clone()),
            hidden_states: flat_rows(&self.hidden_states, t).select(0, rows.clone()),
            actions: self.actions.gather_samples(t, rows.clone()),
            value_predictions: flat_rows(&self.value_predictions, t).select(0, rows.clone()),
            returns: flat_rows(&self.returns, t).select(0, rows.clone()),
            masks: flat_rows(&self.masks, t).select(0, rows.clone()),
            old_log_probs: flat_rows(&self.action_log_probs, t).select(0, rows),
            sample_indices: samples,
        }
    }

    fn gather_recurrent(&self, envs: Vec<usize>) -> MiniBatch<B> {
        let t = self.num_steps;
        let env_index = index_tensor::<B>(&envs, &self.device);
        MiniBatch {
            observations: env_rows(&self.observations, t, env_index.clone()),
            hidden_states: read_slot(&self.hidden_states, 0).select(0, env_index.clone()),
            actions: self.actions.gather_envs(t, env_index.clone()),
            value_predictions: env_rows(&self.value_predictions, t, env_index.clone()),
            returns: env_rows(&self.returns, t, env_index.clone()),
            masks: env_rows(&self.masks, t, env_index.clone()),
            old_log_probs: env_rows(&self.action_log_probs, t, env_index),
            sample_indices: trajectory_sample_indices(&envs, t, self.num_envs),
        }
    }

    fn ensure_filled(&self) -> Result<(), BufferError> {
        if self.filled {
            Ok(())
        } else {
            Err(BufferError::NotFilled {
                step: self.step,
                num_steps: self.num_steps,
            })
        }
    }

    // ------------------------------------------------------------------------
    // Slot access
    // ------------------------------------------------------------------------

    /// Observations at one time slot, `[num_envs, obs_size]`.
    pub fn observations_at(&self, slot: Slot) -> Result<Tensor<B, 2>, BufferError> {
        let index = slot.resolve(self.num_steps + 1)?;
        Ok(read_slot(&self.observations, index))
    }

    /// Hidden states at one time slot, `[num_envs, hidden_size]`.
    pub fn hidden_states_at(&self, slot: Slot) -> Result<Tensor<B, 2>, BufferError> {
        let index = slot.resolve(self.num_steps + 1)?;
        Ok(read_slot(&self.hidden_states, index))
    }

    /// Masks at one time slot, `[num_envs, 1]`.
    pub fn masks_at(&self, slot: Slot) -> Result<Tensor<B, 2>, BufferError> {
        let index = slot.resolve(self.num_steps + 1)?;
        Ok(read_slot(&self.masks, index))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn observations(&self) -> &Tensor<B, 3> {
        &self.observations
    }

    pub fn hidden_states(&self) -> &Tensor<B, 3> {
        &self.hidden_states
    }

    pub fn rewards(&self) -> &Tensor<B, 3> {
        &self.rewards
    }

    pub fn value_predictions(&self) -> &Tensor<B, 3> {
        &self.value_predictions
    }

    pub fn returns(&self) -> &Tensor<B, 3> {
        &self.returns
    }

    pub fn action_log_probs(&self) -> &Tensor<B, 3> {
        &self.action_log_probs
    }

    pub fn actions(&self) -> &ActionStore<B> {
        &self.actions
    }

    pub fn masks(&self) -> &Tensor<B, 3> {
        &self.masks
    }

    /// Logical observation extents, `[num_steps + 1, num_envs, observation_shape..]`.
    ///
    /// The backing tensor is flattened; see [`new`](Self::new).
    pub fn observation_dims(&self) -> Vec<usize> {
        let mut dims = vec![self.num_steps + 1, self.num_envs];
        dims.extend_from_slice(&self.observation_shape);
        dims
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    pub fn obs_size(&self) -> usize {
        self.obs_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    /// Insert cursor, `0..num_steps`.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Whether all `num_steps` slots of the current rollout have been written.
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

// ============================================================================
// MiniBatchIter
// ============================================================================

/// Lazily gathers minibatches from a filled buffer.
pub struct MiniBatchIter<'a, B: Backend> {
    buffer: &'a RolloutBuffer<B>,
    strategy: MiniBatchStrategy,
    groups: std::vec::IntoIter<Vec<usize>>,
}

impl<B: Backend> Iterator for MiniBatchIter<'_, B> {
    type Item = MiniBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        let group = self.groups.next()?;
        Some(match self.strategy {
            MiniBatchStrategy::FeedForward => self.buffer.gather_feed_forward(group),
            MiniBatchStrategy::Recurrent => self.buffer.gather_recurrent(group),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.groups.size_hint()
    }
}

impl<B: Backend> ExactSizeIterator for MiniBatchIter<'_, B> {}
