//! Synchronous on-policy training loop.
//!
//! ```text
//! for update in 0..num_updates:
//!     repeat num_steps:
//!         policy.act(buffer[step]) → env.step → scale rewards → buffer.insert
//!     next_value = policy.get_values(buffer[last])
//!     buffer.compute_returns(next_value)
//!     algorithm.update(buffer, decay_level)
//!     buffer.after_update()
//! ```
//!
//! One buffer and one policy, mutated by one thread of control. The loop
//! only stops between updates.

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use std::fmt;

use super::reward_scaler::RewardScaler;
use super::train_config::{AlgorithmKind, ConfigError, TrainConfig};
use crate::algorithms::a2c::A2C;
use crate::algorithms::algorithm::{adam_optimizer, Algorithm, UpdateDatum, UpdateError};
use crate::algorithms::policy::Policy;
use crate::algorithms::ppo::PPO;
use crate::buffers::{BufferError, RolloutBuffer, Slot};
use crate::core::action_space::ActionBatch;
use crate::environment::{EnvError, VectorizedEnv};
use crate::metrics::{EpisodeRewards, FpsCounter, RewardHistory, TrainingReport};
use crate::nn::{MlpPolicy, MlpPolicyConfig};

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort training.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainError {
    Config(ConfigError),
    Buffer(BufferError),
    Update(UpdateError),
    /// The environment transport failed or returned malformed data.
    Environment(String),
    /// Actions could not be read back for the environment.
    TensorData(String),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Config(e) => write!(f, "invalid configuration: {}", e),
            TrainError::Buffer(e) => write!(f, "rollout buffer: {}", e),
            TrainError::Update(e) => write!(f, "update failed: {}", e),
            TrainError::Environment(msg) => write!(f, "environment: {}", msg),
            TrainError::TensorData(msg) => write!(f, "tensor data error: {}", msg),
        }
    }
}

impl std::error::Error for TrainError {}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        TrainError::Config(e)
    }
}

impl From<BufferError> for TrainError {
    fn from(e: BufferError) -> Self {
        TrainError::Buffer(e)
    }
}

impl From<UpdateError> for TrainError {
    fn from(e: UpdateError) -> Self {
        TrainError::Update(e)
    }
}

impl From<EnvError> for TrainError {
    fn from(e: EnvError) -> Self {
        TrainError::Environment(e.to_string())
    }
}

// ============================================================================
// Trainer
// ============================================================================

/// Outcome of [`Trainer::run`].
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub updates: usize,
    pub total_frames: usize,
    pub episodes: usize,
    pub average_reward: Option<f32>,
    /// Diagnostics of the final update.
    pub last_diagnostics: Vec<UpdateDatum>,
}

/// Drives rollouts and updates for an MLP policy on a vectorized environment.
pub struct Trainer<B: AutodiffBackend, E: VectorizedEnv> {
    config: TrainConfig,
    env: E,
    algorithm: Box<dyn Algorithm<B, MlpPolicy<B>>>,
    buffer: RolloutBuffer<B>,
    reward_scaler: RewardScaler,
    episode_rewards: EpisodeRewards,
    reward_history: RewardHistory,
    total_frames: usize,
    device: B::Device,
}

impl<B: AutodiffBackend, E: VectorizedEnv> Trainer<B, E> {
    /// Validate the configuration, build the policy and algorithm, reset the
    /// environment and seed the buffer with its first observation.
    pub fn new(config: TrainConfig, mut env: E, device: B::Device) -> Result<Self, TrainError> {
        config.validate()?;
        if env.n_envs() != config.num_envs {
            return Err(TrainError::Environment(format!(
                "environment runs {} copies, config expects {}",
                env.n_envs(),
                config.num_envs
            )));
        }
        B::seed(config.seed);

        let observation_shape = env.observation_shape();
        let action_space = env.action_space();
        let policy = MlpPolicyConfig::new(env.obs_size(), action_space.clone())
            .with_hidden_size(config.hidden_size)
            .with_recurrent(config.recurrent)
            .init::<B>(&device);

        let mut buffer = RolloutBuffer::new(
            config.num_steps,
            config.num_envs,
            &observation_shape,
            action_space,
            policy.hidden_size(),
            &device,
        )?;

        let optimizer =
            adam_optimizer::<B, MlpPolicy<B>>(config.optimizer_epsilon, config.max_grad_norm);
        let algorithm: Box<dyn Algorithm<B, MlpPolicy<B>>> = match config.algorithm {
            AlgorithmKind::A2c => Box::new(A2C::new(policy, optimizer, config.a2c_config())),
            AlgorithmKind::Ppo => Box::new(PPO::new(policy, optimizer, config.ppo_config())),
        };

        let first = env.reset();
        buffer.set_first_observation(observation_tensor::<B>(&first, &buffer, &device)?)?;

        Ok(Self {
            reward_scaler: RewardScaler::new(
                config.num_envs,
                config.discount_factor,
                config.reward_clip,
                config.normalize_rewards,
            ),
            episode_rewards: EpisodeRewards::new(config.num_envs),
            reward_history: RewardHistory::new(config.reward_average_window),
            total_frames: 0,
            config,
            env,
            algorithm,
            buffer,
            device,
        })
    }

    /// Train for `num_updates` updates.
    ///
    /// Every `log_interval` updates after the first, a [`TrainingReport`] is
    /// logged and passed to `on_report`.
    pub fn run<F>(&mut self, mut on_report: F) -> Result<TrainingSummary, TrainError>
    where
        F: FnMut(&TrainingReport),
    {
        let num_updates = self.config.num_updates();
        let clock = FpsCounter::start();
        let mut last_diagnostics = Vec::new();

        for update in 0..num_updates {
            last_diagnostics = self.train_update(update)?;

            if update > 0 && update % self.config.log_interval == 0 {
                let report = TrainingReport {
                    update,
                    num_updates,
                    total_frames: self.total_frames,
                    fps: clock.fps(self.total_frames),
                    diagnostics: last_diagnostics.clone(),
                    average_reward: self.reward_history.average(),
                };
                report.log();
                on_report(&report);
            }
        }

        Ok(TrainingSummary {
            updates: num_updates,
            total_frames: self.total_frames,
            episodes: self.reward_history.episode_count(),
            average_reward: self.reward_history.average(),
            last_diagnostics,
        })
    }

    /// Collect one rollout and run one update.
    ///
    /// The rollout is collected by an inference copy of the policy on the
    /// inner backend, refreshed once per update.
    pub fn train_update(&mut self, update: usize) -> Result<Vec<UpdateDatum>, TrainError> {
        let inference_policy = self.algorithm.policy().valid();
        for step in 0..self.config.num_steps {
            self.collect_step(&inference_policy, step)?;
        }
        self.total_frames += self.config.frames_per_update();

        let next_value = inference_policy.get_values(
            self.buffer.observations_at(Slot::Last)?.inner(),
            self.buffer.hidden_states_at(Slot::Last)?.inner(),
            self.buffer.masks_at(Slot::Last)?.inner(),
        );
        self.buffer.compute_returns(
            Tensor::from_inner(next_value),
            self.config.use_gae,
            self.config.discount_factor,
            self.config.gae_lambda,
        )?;

        let data = self
            .algorithm
            .update(&self.buffer, self.config.decay_level(update))?;
        self.buffer.after_update();
        Ok(data)
    }

    fn collect_step(
        &mut self,
        policy: &MlpPolicy<B::InnerBackend>,
        step: usize,
    ) -> Result<(), TrainError> {
        let output = policy.act(
            self.buffer.observations_at(Slot::At(step))?.inner(),
            self.buffer.hidden_states_at(Slot::At(step))?.inner(),
            self.buffer.masks_at(Slot::At(step))?.inner(),
        );

        let actions = output
            .action
            .to_floats()
            .map_err(|e| TrainError::TensorData(format!("{:?}", e)))?;
        let result = self.env.step(&actions)?;
        if result.rewards.len() != self.config.num_envs || result.dones.len() != self.config.num_envs
        {
            return Err(TrainError::Environment(format!(
                "expected {} rewards and done flags, got {} and {}",
                self.config.num_envs,
                result.rewards.len(),
                result.dones.len()
            )));
        }

        let finished = self.episode_rewards.step(&result.rewards, &result.dones);
        self.reward_history.extend(finished);

        let rewards = self.reward_scaler.scale(&result.rewards, &result.dones);
        let masks: Vec<f32> = result
            .dones
            .iter()
            .map(|&done| if done { 0.0 } else { 1.0 })
            .collect();

        let n = self.config.num_envs;
        let observation = observation_tensor::<B>(&result.observations, &self.buffer, &self.device)?;
        self.buffer.insert(
            observation,
            Tensor::from_inner(output.hidden_state),
            ActionBatch::from_inner(output.action),
            Tensor::from_inner(output.log_prob),
            Tensor::from_inner(output.value),
            Tensor::<B, 1>::from_floats(rewards.as_slice(), &self.device).reshape([n, 1]),
            Tensor::<B, 1>::from_floats(masks.as_slice(), &self.device).reshape([n, 1]),
        )?;
        Ok(())
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn policy(&self) -> &MlpPolicy<B> {
        self.algorithm.policy()
    }

    pub fn buffer(&self) -> &RolloutBuffer<B> {
        &self.buffer
    }

    pub fn reward_history(&self) -> &RewardHistory {
        &self.reward_history
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn algorithm_name(&self) -> &'static str {
        self.algorithm.name()
    }
}

/// Flat environment observations as `[num_envs, obs_size]`.
fn observation_tensor<B: AutodiffBackend>(
    values: &[f32],
    buffer: &RolloutBuffer<B>,
    device: &B::Device,
) -> Result<Tensor<B, 2>, TrainError> {
    let (n, obs_size) = (buffer.num_envs(), buffer.obs_size());
    if values.len() != n * obs_size {
        return Err(TrainError::Environment(format!(
            "expected {} observation values, got {}",
            n * obs_size,
            values.len()
        )));
    }
    Ok(Tensor::<B, 1>::from_floats(values, device).reshape([n, obs_size]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{CartPoleEnv, StepResult};
    use crate::core::action_space::ActionSpace;
    use burn::backend::{Autodiff, NdArray};

    type AB = Autodiff<NdArray<f32>>;

    fn tiny_config() -> TrainConfig {
        TrainConfig::new()
            .with_num_envs(2)
            .with_num_steps(8)
            .with_num_epoch(2)
            .with_num_mini_batch(4)
            .with_hidden_size(8)
            .with_max_frames(64)
            .with_log_interval(2)
            .with_seed(3)
    }

    #[test]
    fn test_ppo_end_to_end_on_cartpole() {
        let config = tiny_config().build().unwrap();
        let env = CartPoleEnv::new(2, 3);
        let mut trainer = Trainer::<AB, _>::new(config, env, Default::default()).unwrap();
        assert_eq!(trainer.algorithm_name(), "PPO");

        let mut reports = Vec::new();
        let summary = trainer.run(|r| reports.push(r.update)).unwrap();

        assert_eq!(summary.updates, 4);
        assert_eq!(summary.total_frames, 64);
        assert_eq!(reports, vec![2]);
        assert!(!trainer.buffer().is_filled());
        assert_eq!(trainer.buffer().step(), 0);

        let names: Vec<&str> = summary
            .last_diagnostics
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        for expected in ["Value loss", "Action loss", "Entropy"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert!(summary.last_diagnostics.iter().all(|d| d.value.is_finite()));
    }

    #[test]
    fn test_a2c_end_to_end_on_cartpole() {
        let config = tiny_config()
            .with_algorithm(AlgorithmKind::A2c)
            .with_lr_decay(true)
            .build()
            .unwrap();
        let mut trainer =
            Trainer::<AB, _>::new(config, CartPoleEnv::new(2, 5), Default::default()).unwrap();
        assert_eq!(trainer.algorithm_name(), "A2C");

        let summary = trainer.run(|_| {}).unwrap();
        assert_eq!(summary.updates, 4);
        assert_eq!(summary.last_diagnostics.len(), 3);
    }

    #[test]
    fn test_recurrent_ppo_end_to_end() {
        let config = tiny_config()
            .with_recurrent(true)
            .with_num_mini_batch(2)
            .build()
            .unwrap();
        let mut trainer =
            Trainer::<AB, _>::new(config, CartPoleEnv::new(2, 7), Default::default()).unwrap();
        assert!(trainer.policy().is_recurrent());
        assert_eq!(trainer.buffer().hidden_size(), 8);

        let summary = trainer.run(|_| {}).unwrap();
        assert_eq!(summary.total_frames, 64);
    }

    #[test]
    fn test_episodes_are_recorded() {
        // Episodes capped at 4 steps finish within the first rollout
        let config = tiny_config().with_max_frames(16).build().unwrap();
        let env = CartPoleEnv::new(2, 1).with_max_steps(4);
        let mut trainer = Trainer::<AB, _>::new(config, env, Default::default()).unwrap();

        let summary = trainer.run(|_| {}).unwrap();
        assert_eq!(summary.episodes, 4);
        assert_eq!(summary.average_reward, Some(4.0));
    }

    #[test]
    fn test_first_report_after_first_interval() {
        let config = tiny_config()
            .with_max_frames(48)
            .with_log_interval(1)
            .build()
            .unwrap();
        let mut trainer =
            Trainer::<AB, _>::new(config, CartPoleEnv::new(2, 2), Default::default()).unwrap();

        let mut reports = Vec::new();
        trainer.run(|r| reports.push(r.update)).unwrap();
        assert_eq!(reports, vec![1, 2]);
    }

    #[test]
    fn test_rollout_storage_is_graph_free() {
        let config = tiny_config().with_recurrent(true).with_num_mini_batch(2);
        let mut trainer =
            Trainer::<AB, _>::new(config, CartPoleEnv::new(2, 4), Default::default()).unwrap();
        trainer.train_update(0).unwrap();

        let buffer = trainer.buffer();
        assert!(!buffer.value_predictions().is_require_grad());
        assert!(!buffer.action_log_probs().is_require_grad());
        assert!(!buffer.hidden_states().is_require_grad());
        assert!(!buffer.returns().is_require_grad());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = tiny_config().with_num_mini_batch(100);
        let err = Trainer::<AB, _>::new(config, CartPoleEnv::new(2, 0), Default::default())
            .err()
            .unwrap();
        assert_eq!(
            err,
            TrainError::Config(ConfigError::InvalidMinibatch {
                samples: 16,
                minibatches: 100
            })
        );
    }

    #[test]
    fn test_env_count_mismatch_rejected() {
        let err = Trainer::<AB, _>::new(tiny_config(), CartPoleEnv::new(3, 0), Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, TrainError::Environment(_)));
    }

    /// Returns one observation value too few.
    struct BrokenEnv;

    impl VectorizedEnv for BrokenEnv {
        fn n_envs(&self) -> usize {
            2
        }

        fn observation_shape(&self) -> Vec<usize> {
            vec![3]
        }

        fn action_space(&self) -> ActionSpace {
            ActionSpace::discrete(2)
        }

        fn reset(&mut self) -> Vec<f32> {
            vec![0.0; 6]
        }

        fn step(&mut self, _actions: &[f32]) -> Result<StepResult, EnvError> {
            Ok(StepResult {
                observations: vec![0.0; 5],
                rewards: vec![0.0; 2],
                dones: vec![false; 2],
            })
        }
    }

    #[test]
    fn test_malformed_observations_are_fatal() {
        let mut trainer =
            Trainer::<AB, _>::new(tiny_config(), BrokenEnv, Default::default()).unwrap();
        let err = trainer.train_update(0).unwrap_err();
        assert_eq!(
            err,
            TrainError::Environment("expected 6 observation values, got 5".to_string())
        );
    }
}
