//! Training configuration and the synchronous training loop.
//!
//! - [`TrainConfig`]: every hyperparameter of a run, validated by `build()`
//! - [`RewardScaler`]: running-return reward normalization
//! - [`Trainer`]: collect a rollout, estimate returns, update, repeat

pub mod reward_scaler;
pub mod train_config;
pub mod trainer;

pub use reward_scaler::RewardScaler;
pub use train_config::{AlgorithmKind, ConfigError, TrainConfig};
pub use trainer::{TrainError, Trainer, TrainingSummary};
