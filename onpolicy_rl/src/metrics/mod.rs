//! Training progress reporting.
//!
//! - [`RewardHistory`]: moving average over recent episode rewards
//! - [`EpisodeRewards`]: per-environment running episode totals
//! - [`TrainingReport`]: periodic report emitted through `log`

pub mod logger;
pub mod training_metrics;

pub use logger::{FpsCounter, TrainingReport};
pub use training_metrics::{EpisodeRewards, RewardHistory};
