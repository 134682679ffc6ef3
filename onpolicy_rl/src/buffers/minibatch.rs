//! Minibatch partitioning for multi-epoch updates.
//!
//! A rollout of `num_steps x num_envs` samples is split into `num_mini_batch`
//! disjoint groups that together cover every sample once. The split is
//! reshuffled on every call, so each epoch sees a fresh partition.
//!
//! # Strategies
//!
//! ```text
//! FeedForward  →  flatten (t, e) into one sample axis, shuffle, split
//! Recurrent    →  shuffle environment indices, split; each group keeps the
//!                 full trajectory of its environments in time order
//! ```

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::action_space::ActionBatch;

/// How the rollout is split into minibatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiniBatchStrategy {
    /// Independent samples, time and environment axes flattened together.
    #[default]
    FeedForward,
    /// Whole per-environment trajectories so recurrent state can be chained.
    Recurrent,
}

impl MiniBatchStrategy {
    pub fn for_policy(is_recurrent: bool) -> Self {
        if is_recurrent {
            MiniBatchStrategy::Recurrent
        } else {
            MiniBatchStrategy::FeedForward
        }
    }
}

/// Shuffle `0..n_items` and split it into `n_groups` groups.
///
/// Group sizes differ by at most one. The first `n_items % n_groups` groups
/// take the extra item.
///
/// # Panics
///
/// Panics if `n_groups` is zero or larger than `n_items`.
pub fn partition_indices<R: Rng + ?Sized>(
    n_items: usize,
    n_groups: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    assert!(n_groups > 0, "n_groups must be > 0");
    assert!(
        n_groups <= n_items,
        "cannot split {} items into {} groups",
        n_items,
        n_groups
    );

    let mut indices: Vec<usize> = (0..n_items).collect();
    indices.shuffle(rng);

    let base = n_items / n_groups;
    let extra = n_items % n_groups;
    let mut groups = Vec::with_capacity(n_groups);
    let mut start = 0;
    for g in 0..n_groups {
        let len = base + usize::from(g < extra);
        groups.push(indices[start..start + len].to_vec());
        start += len;
    }
    groups
}

/// Flat sample indices (`t * num_envs + e`) covered by a group of environments.
///
/// Ordered time-major: all selected environments at `t = 0`, then `t = 1`, ...
pub fn trajectory_sample_indices(envs: &[usize], num_steps: usize, num_envs: usize) -> Vec<usize> {
    let mut samples = Vec::with_capacity(envs.len() * num_steps);
    for t in 0..num_steps {
        for &e in envs {
            samples.push(t * num_envs + e);
        }
    }
    samples
}

// ============================================================================
// MiniBatch
// ============================================================================

/// One minibatch gathered from a filled rollout buffer.
///
/// Per-sample tensors have `batch` rows. For the recurrent strategy the rows
/// are time-major over the selected environments (`T * n_envs`), and
/// `hidden_states` holds only the initial state of each selected environment.
#[derive(Debug, Clone)]
pub struct MiniBatch<B: Backend> {
    /// Observations, `[batch, obs_size]`.
    pub observations: Tensor<B, 2>,
    /// `[batch, hidden]` (feed-forward) or `[n_envs, hidden]` (recurrent).
    pub hidden_states: Tensor<B, 2>,
    /// Actions taken at rollout time.
    pub actions: ActionBatch<B>,
    /// Value predictions at rollout time, `[batch, 1]`.
    pub value_predictions: Tensor<B, 2>,
    /// Estimated returns, `[batch, 1]`.
    pub returns: Tensor<B, 2>,
    /// Masks in effect when each observation was seen, `[batch, 1]`.
    pub masks: Tensor<B, 2>,
    /// Log-probabilities at rollout time, `[batch, 1]`.
    pub old_log_probs: Tensor<B, 2>,
    /// Flat sample indices `t * num_envs + e` of the rows, in row order.
    pub sample_indices: Vec<usize>,
}

impl<B: Backend> MiniBatch<B> {
    /// Raw advantages `returns - value_predictions`, `[batch, 1]`.
    pub fn advantages(&self) -> Tensor<B, 2> {
        self.returns.clone() - self.value_predictions.clone()
    }

    pub fn len(&self) -> usize {
        self.sample_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_partition_sizes_even() {
        let mut rng = StdRng::seed_from_u64(0);
        let groups = partition_indices(12, 4, &mut rng);
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 3));
    }

    #[test]
    fn test_partition_sizes_uneven() {
        let mut rng = StdRng::seed_from_u64(1);
        let groups = partition_indices(10, 4, &mut rng);
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_partition_disjoint_exhaustive() {
        let mut rng = StdRng::seed_from_u64(2);
        let groups = partition_indices(37, 5, &mut rng);
        let mut seen = HashSet::new();
        for g in &groups {
            for &i in g {
                assert!(seen.insert(i), "index {} appears twice", i);
            }
        }
        assert_eq!(seen.len(), 37);
    }

    #[test]
    fn test_partition_reshuffles() {
        let mut rng = StdRng::seed_from_u64(3);
        let first = partition_indices(64, 4, &mut rng);
        let second = partition_indices(64, 4, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    #[should_panic(expected = "cannot split")]
    fn test_partition_too_many_groups() {
        let mut rng = StdRng::seed_from_u64(4);
        partition_indices(3, 4, &mut rng);
    }

    #[test]
    fn test_trajectory_sample_indices_time_major() {
        // envs 2 and 0 out of 3, over 2 steps
        let samples = trajectory_sample_indices(&[2, 0], 2, 3);
        assert_eq!(samples, vec![2, 0, 5, 3]);
    }

    #[test]
    fn test_strategy_for_policy() {
        assert_eq!(MiniBatchStrategy::for_policy(false), MiniBatchStrategy::FeedForward);
        assert_eq!(MiniBatchStrategy::for_policy(true), MiniBatchStrategy::Recurrent);
    }
}
