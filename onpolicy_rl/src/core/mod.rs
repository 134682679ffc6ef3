//! Core types shared by buffers, policies and the training loop.

pub mod action_space;
pub mod recurrent;
pub mod running_stats;

pub use action_space::{ActionBatch, ActionKind, ActionSpace};
pub use recurrent::{GruCell, GruCellConfig};
pub use running_stats::RunningMeanStd;
