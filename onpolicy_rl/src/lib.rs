//! # On-policy actor-critic training
//!
//! Synchronous A2C and PPO on burn, built around a time-major rollout buffer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Trainer                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   VectorizedEnv ──obs/rewards/dones──► RewardScaler             │
//! │        ▲                                    │                   │
//! │        │ actions                            ▼                   │
//! │   ┌─────────┐   act()   ┌──────────────────────────────┐        │
//! │   │ Policy  │◄──────────│ RolloutBuffer [T+1, n, ...]  │        │
//! │   │ (MLP /  │──────────►│ obs, hidden, masks, actions, │        │
//! │   │  GRU)   │  insert() │ log-probs, values, returns   │        │
//! │   └────▲────┘           └──────────────┬───────────────┘        │
//! │        │                               │ compute_returns()      │
//! │        │ optimizer step                ▼                        │
//! │   ┌────┴──────────────────────────────────────────┐             │
//! │   │ Algorithm: A2C (one step) / PPO (epochs x k)  │             │
//! │   └───────────────────────────────────────────────┘             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burn::backend::{Autodiff, NdArray};
//! use onpolicy_rl::{CartPoleEnv, TrainConfig, Trainer};
//!
//! let config = TrainConfig::new()
//!     .with_num_envs(8)
//!     .with_num_steps(40)
//!     .with_max_frames(200_000)
//!     .build()?;
//! let env = CartPoleEnv::new(config.num_envs, config.seed);
//!
//! let mut trainer = Trainer::<Autodiff<NdArray<f32>>, _>::new(config, env, Default::default())?;
//! let summary = trainer.run(|report| println!("{}", report))?;
//! ```

pub mod algorithms;
pub mod buffers;
pub mod core;
pub mod environment;
pub mod metrics;
pub mod nn;
pub mod runners;

// Re-export commonly used types
pub use core::action_space::{ActionBatch, ActionKind, ActionSpace};
pub use core::recurrent::{GruCell, GruCellConfig};
pub use core::running_stats::RunningMeanStd;

pub use buffers::{BufferError, MiniBatch, MiniBatchStrategy, RolloutBuffer, Slot};

pub use algorithms::{
    A2CConfig, ActOutput, Algorithm, Evaluation, LossCoefficients, PPOConfig, Policy,
    UpdateDatum, UpdateError, A2C, PPO,
};

pub use nn::{MlpPolicy, MlpPolicyConfig};

pub use environment::{CartPoleEnv, EnvError, StepResult, VectorizedEnv};

pub use metrics::{EpisodeRewards, RewardHistory, TrainingReport};

pub use runners::{
    AlgorithmKind, ConfigError, RewardScaler, TrainConfig, TrainError, Trainer, TrainingSummary,
};
