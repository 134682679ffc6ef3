//! Configuration for on-policy training.
//!
//! [`TrainConfig`] holds every hyperparameter of a run. Build it with
//! `TrainConfig::new()` and the `with_*` methods, then call
//! [`TrainConfig::build`] to validate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithms::a2c::A2CConfig;
use crate::algorithms::algorithm::LossCoefficients;
use crate::algorithms::ppo::PPOConfig;

/// Which update procedure to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlgorithmKind {
    A2c,
    #[default]
    Ppo,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::A2c => write!(f, "A2C"),
            AlgorithmKind::Ppo => write!(f, "PPO"),
        }
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// Fewer samples to partition than requested minibatches.
    InvalidMinibatch { samples: usize, minibatches: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{} must be in [{}, {}], got {}", field, min, max, value),
            ConfigError::InvalidMinibatch {
                samples,
                minibatches,
            } => write!(
                f,
                "samples per rollout ({}) must be >= num_mini_batch ({})",
                samples, minibatches
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Hyperparameters of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub algorithm: AlgorithmKind,

    // Loss weights
    pub actor_loss_coef: f32,
    pub value_loss_coef: f32,
    pub entropy_coef: f32,

    // Rollout
    /// Steps collected per environment between updates.
    pub num_steps: usize,
    pub num_envs: usize,

    // Returns
    pub discount_factor: f32,
    pub use_gae: bool,
    pub gae_lambda: f32,

    // PPO
    pub clip_param: f32,
    pub num_epoch: usize,
    pub num_mini_batch: usize,
    /// Early-stop threshold on approximate KL; `None` disables it.
    pub kl_target: Option<f32>,

    // Optimizer
    pub learning_rate: f64,
    pub optimizer_epsilon: f32,
    pub max_grad_norm: Option<f32>,
    /// Scale the learning rate by `1 - update / num_updates`.
    pub use_lr_decay: bool,

    // Rewards
    /// Scale rewards by the running std of discounted returns.
    pub normalize_rewards: bool,
    /// Symmetric clip applied after scaling.
    pub reward_clip: f32,
    /// Episodes in the reported moving average.
    pub reward_average_window: usize,

    // Policy
    pub hidden_size: usize,
    pub recurrent: bool,

    // Run
    /// Updates between reports.
    pub log_interval: usize,
    /// Total environment frames across all environments.
    pub max_frames: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::Ppo,
            actor_loss_coef: 1.0,
            value_loss_coef: 0.5,
            entropy_coef: 1e-3,
            num_steps: 40,
            num_envs: 8,
            discount_factor: 0.99,
            use_gae: true,
            gae_lambda: 0.9,
            clip_param: 0.2,
            num_epoch: 3,
            num_mini_batch: 20,
            kl_target: Some(0.5),
            learning_rate: 1e-3,
            optimizer_epsilon: 1e-8,
            max_grad_norm: Some(0.5),
            use_lr_decay: false,
            normalize_rewards: true,
            reward_clip: 100.0,
            reward_average_window: 10,
            hidden_size: 64,
            recurrent: false,
            log_interval: 10,
            max_frames: 100_000_000,
            seed: 0,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples per rollout, `num_steps * num_envs`.
    pub fn frames_per_update(&self) -> usize {
        self.num_steps * self.num_envs
    }

    /// Number of updates in the run, `max_frames / (num_steps * num_envs)`.
    pub fn num_updates(&self) -> usize {
        self.max_frames / self.frames_per_update().max(1)
    }

    /// Learning-rate multiplier for a zero-based update index.
    pub fn decay_level(&self, update: usize) -> f32 {
        if self.use_lr_decay {
            1.0 - update as f32 / self.num_updates().max(1) as f32
        } else {
            1.0
        }
    }

    pub fn loss_coefficients(&self) -> LossCoefficients {
        LossCoefficients {
            actor_loss_coef: self.actor_loss_coef,
            value_loss_coef: self.value_loss_coef,
            entropy_coef: self.entropy_coef,
        }
    }

    pub fn a2c_config(&self) -> A2CConfig {
        A2CConfig::default()
            .with_coefficients(self.loss_coefficients())
            .with_learning_rate(self.learning_rate)
    }

    pub fn ppo_config(&self) -> PPOConfig {
        PPOConfig::default()
            .with_coefficients(self.loss_coefficients())
            .with_learning_rate(self.learning_rate)
            .with_clip_param(self.clip_param)
            .with_num_epoch(self.num_epoch)
            .with_num_mini_batch(self.num_mini_batch)
            .with_kl_target(self.kl_target)
            .with_seed(self.seed)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("num_steps", self.num_steps),
            ("num_envs", self.num_envs),
            ("num_epoch", self.num_epoch),
            ("num_mini_batch", self.num_mini_batch),
            ("hidden_size", self.hidden_size),
            ("log_interval", self.log_interval),
            ("reward_average_window", self.reward_average_window),
        ];
        if let Some(&(field, value)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidCount { field, value });
        }

        check_range("discount_factor", self.discount_factor, 0.0, 1.0)?;
        check_range("gae_lambda", self.gae_lambda, 0.0, 1.0)?;
        if self.clip_param <= 0.0 || self.clip_param > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "clip_param",
                value: self.clip_param,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "learning_rate",
                value: self.learning_rate as f32,
                min: 0.0,
                max: f32::INFINITY,
            });
        }
        if self.reward_clip <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "reward_clip",
                value: self.reward_clip,
                min: 0.0,
                max: f32::INFINITY,
            });
        }

        // Only PPO partitions the rollout
        if self.algorithm == AlgorithmKind::Ppo {
            let samples = if self.recurrent {
                self.num_envs
            } else {
                self.frames_per_update()
            };
            if samples < self.num_mini_batch {
                return Err(ConfigError::InvalidMinibatch {
                    samples,
                    minibatches: self.num_mini_batch,
                });
            }
        }

        Ok(())
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_actor_loss_coef(mut self, coef: f32) -> Self {
        self.actor_loss_coef = coef;
        self
    }

    pub fn with_value_loss_coef(mut self, coef: f32) -> Self {
        self.value_loss_coef = coef;
        self
    }

    pub fn with_entropy_coef(mut self, coef: f32) -> Self {
        self.entropy_coef = coef;
        self
    }

    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    pub fn with_num_envs(mut self, num_envs: usize) -> Self {
        self.num_envs = num_envs;
        self
    }

    pub fn with_discount_factor(mut self, gamma: f32) -> Self {
        self.discount_factor = gamma;
        self
    }

    pub fn with_gae(mut self, use_gae: bool, gae_lambda: f32) -> Self {
        self.use_gae = use_gae;
        self.gae_lambda = gae_lambda;
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

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_optimizer_epsilon(mut self, epsilon: f32) -> Self {
        self.optimizer_epsilon = epsilon;
        self
    }

    pub fn with_max_grad_norm(mut self, max_grad_norm: Option<f32>) -> Self {
        self.max_grad_norm = max_grad_norm;
        self
    }

    pub fn with_lr_decay(mut self, use_lr_decay: bool) -> Self {
        self.use_lr_decay = use_lr_decay;
        self
    }

    pub fn with_normalize_rewards(mut self, normalize: bool) -> Self {
        self.normalize_rewards = normalize;
        self
    }

    pub fn with_reward_clip(mut self, reward_clip: f32) -> Self {
        self.reward_clip = reward_clip;
        self
    }

    pub fn with_reward_average_window(mut self, window: usize) -> Self {
        self.reward_average_window = window;
        self
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_recurrent(mut self, recurrent: bool) -> Self {
        self.recurrent = recurrent;
        self
    }

    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainConfig::default();
        assert_eq!(config.algorithm, AlgorithmKind::Ppo);
        assert_eq!(config.num_steps, 40);
        assert_eq!(config.num_envs, 8);
        assert_eq!(config.kl_target, Some(0.5));
        assert_eq!(config.max_grad_norm, Some(0.5));
        assert!(config.use_gae);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_num_updates() {
        let config = TrainConfig::new()
            .with_num_steps(10)
            .with_num_envs(4)
            .with_max_frames(1000);
        assert_eq!(config.frames_per_update(), 40);
        assert_eq!(config.num_updates(), 25);
        assert_eq!(TrainConfig::default().num_updates(), 312_500);
    }

    #[test]
    fn test_decay_level() {
        let config = TrainConfig::new()
            .with_num_steps(10)
            .with_num_envs(1)
            .with_max_frames(100);
        assert_eq!(config.decay_level(5), 1.0);

        let decayed = config.with_lr_decay(true);
        assert_eq!(decayed.decay_level(0), 1.0);
        assert!((decayed.decay_level(5) - 0.5).abs() < 1e-6);
        assert!((decayed.decay_level(9) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_zero_counts_rejected() {
        let cases = [
            ("num_steps", TrainConfig::new().with_num_steps(0)),
            ("num_envs", TrainConfig::new().with_num_envs(0)),
            ("num_epoch", TrainConfig::new().with_num_epoch(0)),
            ("num_mini_batch", TrainConfig::new().with_num_mini_batch(0)),
            ("hidden_size", TrainConfig::new().with_hidden_size(0)),
            ("log_interval", TrainConfig::new().with_log_interval(0)),
            ("reward_average_window", TrainConfig::new().with_reward_average_window(0)),
        ];
        for (field, config) in cases {
            assert_eq!(
                config.build(),
                Err(ConfigError::InvalidCount { field, value: 0 })
            );
        }
    }

    #[test]
    fn test_ranges_rejected() {
        let err = TrainConfig::new().with_discount_factor(1.5).build().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "discount_factor", .. }));

        let err = TrainConfig::new().with_gae(true, -0.1).build().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "gae_lambda", .. }));

        let err = TrainConfig::new().with_clip_param(0.0).build().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "clip_param", .. }));

        let err = TrainConfig::new().with_learning_rate(0.0).build().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "learning_rate", .. }));
    }

    #[test]
    fn test_minibatch_count_checked_against_strategy() {
        // 2 x 3 = 6 feed-forward samples
        let config = TrainConfig::new()
            .with_num_steps(2)
            .with_num_envs(3)
            .with_num_mini_batch(6);
        assert!(config.clone().validate().is_ok());

        // Recurrent partitions environments only
        assert_eq!(
            config.clone().with_recurrent(true).validate(),
            Err(ConfigError::InvalidMinibatch {
                samples: 3,
                minibatches: 6
            })
        );

        assert_eq!(
            config.clone().with_num_mini_batch(7).validate(),
            Err(ConfigError::InvalidMinibatch {
                samples: 6,
                minibatches: 7
            })
        );

        // A2C never partitions
        assert!(config
            .with_num_mini_batch(7)
            .with_algorithm(AlgorithmKind::A2c)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_algorithm_configs_follow_fields() {
        let config = TrainConfig::new()
            .with_entropy_coef(0.01)
            .with_kl_target(None)
            .with_num_epoch(4)
            .with_seed(9);
        let ppo = config.ppo_config();
        assert_eq!(ppo.coefficients.entropy_coef, 0.01);
        assert_eq!(ppo.kl_target, None);
        assert_eq!(ppo.num_epoch, 4);
        assert_eq!(ppo.seed, 9);
        assert_eq!(config.a2c_config().learning_rate, 1e-3);
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidMinibatch {
            samples: 3,
            minibatches: 6,
        };
        assert_eq!(
            err.to_string(),
            "samples per rollout (3) must be >= num_mini_batch (6)"
        );
    }
}
