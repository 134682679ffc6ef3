//! Action space descriptor and batched action tensors.
//!
//! [`ActionSpace`] is fixed for a training run and decides how actions are
//! stored: one integer index per environment for `Discrete`, `shape[0]` floats
//! for `Box`. [`ActionBatch`] carries a batch of actions in that form between
//! the policy, the rollout buffer and the environment.

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of action space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Categorical choice among `shape[0]` actions, stored as an integer index.
    Discrete,
    /// Real-valued vector of width `shape[0]`.
    Box,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Discrete => write!(f, "Discrete"),
            ActionKind::Box => write!(f, "Box"),
        }
    }
}

/// Immutable action space descriptor `{kind, shape}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpace {
    pub kind: ActionKind,
    pub shape: Vec<usize>,
}

impl ActionSpace {
    /// Categorical space over `n` actions.
    pub fn discrete(n: usize) -> Self {
        Self {
            kind: ActionKind::Discrete,
            shape: vec![n],
        }
    }

    /// Continuous space of width `dim`.
    pub fn continuous(dim: usize) -> Self {
        Self {
            kind: ActionKind::Box,
            shape: vec![dim],
        }
    }

    pub fn is_discrete(&self) -> bool {
        self.kind == ActionKind::Discrete
    }

    /// Number of values stored per environment per step.
    ///
    /// A discrete action is a single index, a box action is `shape[0]` floats.
    pub fn action_width(&self) -> usize {
        match self.kind {
            ActionKind::Discrete => 1,
            ActionKind::Box => self.shape.first().copied().unwrap_or(0),
        }
    }

    /// Number of categories (Discrete) or action dimensions (Box).
    pub fn n_actions(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

// ============================================================================
// ActionBatch
// ============================================================================

/// A batch of actions, `[batch, action_width]`.
#[derive(Debug, Clone)]
pub enum ActionBatch<B: Backend> {
    /// Category indices, `[batch, 1]`.
    Discrete(Tensor<B, 2, Int>),
    /// Real-valued actions, `[batch, dim]`.
    Continuous(Tensor<B, 2>),
}

impl<B: Backend> ActionBatch<B> {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionBatch::Discrete(_) => ActionKind::Discrete,
            ActionBatch::Continuous(_) => ActionKind::Box,
        }
    }

    pub fn dims(&self) -> [usize; 2] {
        match self {
            ActionBatch::Discrete(t) => t.dims(),
            ActionBatch::Continuous(t) => t.dims(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.dims()[0]
    }

    /// Flatten to floats for the environment, one row per environment.
    ///
    /// Discrete indices are encoded as `f32`.
    pub fn to_floats(&self) -> Result<Vec<f32>, burn::tensor::DataError> {
        match self {
            ActionBatch::Discrete(t) => {
                let indices = t.clone().into_data().convert::<i64>().to_vec::<i64>()?;
                Ok(indices.into_iter().map(|a| a as f32).collect())
            }
            ActionBatch::Continuous(t) => t.clone().into_data().convert::<f32>().to_vec::<f32>(),
        }
    }
}

impl<B: AutodiffBackend> ActionBatch<B> {
    /// Lift actions sampled by an inference copy of the policy.
    pub fn from_inner(actions: ActionBatch<B::InnerBackend>) -> Self {
        match actions {
            ActionBatch::Discrete(t) => ActionBatch::Discrete(Tensor::from_inner(t)),
            ActionBatch::Continuous(t) => ActionBatch::Continuous(Tensor::from_inner(t)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_action_width() {
        assert_eq!(ActionSpace::discrete(3).action_width(), 1);
        assert_eq!(ActionSpace::continuous(3).action_width(), 3);
        assert_eq!(ActionSpace::discrete(3).n_actions(), 3);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ActionKind::Discrete.to_string(), "Discrete");
        assert_eq!(ActionKind::Box.to_string(), "Box");
    }

    #[test]
    fn test_action_batch_to_floats() {
        let device = Default::default();
        let discrete = ActionBatch::<TestBackend>::Discrete(
            Tensor::<TestBackend, 1, Int>::from_ints([2, 0, 1].as_slice(), &device).reshape([3, 1]),
        );
        assert_eq!(discrete.kind(), ActionKind::Discrete);
        assert_eq!(discrete.dims(), [3, 1]);
        assert_eq!(discrete.to_floats().unwrap(), vec![2.0, 0.0, 1.0]);

        let continuous = ActionBatch::<TestBackend>::Continuous(
            Tensor::<TestBackend, 1>::from_floats([0.5, -0.5, 1.0, 2.0].as_slice(), &device)
                .reshape([2, 2]),
        );
        assert_eq!(continuous.kind(), ActionKind::Box);
        assert_eq!(continuous.batch_size(), 2);
        assert_eq!(continuous.to_floats().unwrap(), vec![0.5, -0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_from_inner_keeps_values() {
        let device = Default::default();
        let discrete = ActionBatch::<Autodiff<TestBackend>>::from_inner(ActionBatch::Discrete(
            Tensor::<TestBackend, 1, Int>::from_ints([1, 0].as_slice(), &device).reshape([2, 1]),
        ));
        assert_eq!(discrete.kind(), ActionKind::Discrete);
        assert_eq!(discrete.to_floats().unwrap(), vec![1.0, 0.0]);

        let continuous = ActionBatch::<Autodiff<TestBackend>>::from_inner(ActionBatch::Continuous(
            Tensor::<TestBackend, 1>::from_floats([0.25, -2.0].as_slice(), &device).reshape([1, 2]),
        ));
        assert_eq!(continuous.dims(), [1, 2]);
        assert_eq!(continuous.to_floats().unwrap(), vec![0.25, -2.0]);
    }
}
