//! Update procedure tests on real rollouts.
//!
//! - `update_tests`: PPO epochs and KL early stop, A2C single step, error paths
