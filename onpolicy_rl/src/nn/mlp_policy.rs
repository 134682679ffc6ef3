//! Multilayer-perceptron actor-critic.
//!
//! ```text
//! obs ──► [GRU] ──┬─► actor:  Linear → tanh → Linear → tanh ─► action head
//!                 └─► critic: Linear → tanh → Linear → tanh ─► value head
//! ```
//!
//! The action head produces categorical logits for a discrete space, or the
//! mean of a diagonal Gaussian with a learned, state-independent log standard
//! deviation for a box space. Without the GRU the hidden state is a single
//! unused column, passed through unchanged.

use burn::module::{Ignored, Module, Param};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::Distribution;

use super::orthogonal::{OrthogonalLinear, OrthogonalLinearConfig};
use crate::algorithms::policy::{ActOutput, Evaluation, Policy};
use crate::core::action_space::{ActionBatch, ActionKind, ActionSpace};
use crate::core::recurrent::{GruCell, GruCellConfig};

/// ln(2π)
const LOG_2PI: f32 = 1.837_877_1;

/// Keeps Gumbel noise finite.
const UNIFORM_EPS: f32 = 1e-7;

/// Configuration for [`MlpPolicy`].
#[derive(Debug, Clone)]
pub struct MlpPolicyConfig {
    pub obs_size: usize,
    pub action_space: ActionSpace,
    /// Width of every hidden layer and of the GRU state.
    pub hidden_size: usize,
    pub recurrent: bool,
}

impl MlpPolicyConfig {
    pub fn new(obs_size: usize, action_space: ActionSpace) -> Self {
        Self {
            obs_size,
            action_space,
            hidden_size: 64,
            recurrent: false,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_recurrent(mut self, recurrent: bool) -> Self {
        self.recurrent = recurrent;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> MlpPolicy<B> {
        let h = self.hidden_size;
        let n_actions = self.action_space.n_actions();
        let gain = std::f64::consts::SQRT_2;

        let gru = self
            .recurrent
            .then(|| GruCellConfig::new(self.obs_size, h).init(device));
        let trunk_in = if self.recurrent { h } else { self.obs_size };

        let make_tower = || {
            vec![
                OrthogonalLinearConfig::new(trunk_in, h).with_gain(gain).init(device),
                OrthogonalLinearConfig::new(h, h).with_gain(gain).init(device),
            ]
        };

        let (action_gain, log_std) = match self.action_space.kind {
            ActionKind::Discrete => (0.01, None),
            ActionKind::Box => (
                1.0,
                Some(Param::from_tensor(Tensor::zeros([n_actions], device))),
            ),
        };

        MlpPolicy {
            gru,
            actor: make_tower(),
            critic: make_tower(),
            value_head: OrthogonalLinearConfig::new(h, 1).init(device),
            action_head: OrthogonalLinearConfig::new(h, n_actions)
                .with_gain(action_gain)
                .init(device),
            log_std,
            action_space: Ignored(self.action_space.clone()),
            obs_size: self.obs_size,
            hidden_size: h,
        }
    }
}

/// Actor-critic with optional GRU trunk.
#[derive(Module, Debug)]
pub struct MlpPolicy<B: Backend> {
    gru: Option<GruCell<B>>,
    actor: Vec<OrthogonalLinear<B>>,
    critic: Vec<OrthogonalLinear<B>>,
    value_head: OrthogonalLinear<B>,
    action_head: OrthogonalLinear<B>,
    log_std: Option<Param<Tensor<B, 1>>>,
    action_space: Ignored<ActionSpace>,
    #[module(skip)]
    obs_size: usize,
    #[module(skip)]
    hidden_size: usize,
}

/// Action distribution for a batch.
enum ActionDist<B: Backend> {
    Categorical { log_probs: Tensor<B, 2> },
    Gaussian { mean: Tensor<B, 2>, log_std: Tensor<B, 2> },
}

impl<B: Backend> ActionDist<B> {
    fn sample(&self) -> ActionBatch<B> {
        match self {
            ActionDist::Categorical { log_probs } => {
                // Gumbel-max: argmax(log p + G) is a categorical draw
                let uniform = Tensor::<B, 2>::random(
                    log_probs.dims(),
                    Distribution::Uniform(0.0, 1.0),
                    &log_probs.device(),
                )
                .clamp(UNIFORM_EPS, 1.0 - UNIFORM_EPS);
                let gumbel = uniform.log().neg().log().neg();
                ActionBatch::Discrete((log_probs.clone() + gumbel).argmax(1))
            }
            ActionDist::Gaussian { mean, log_std } => {
                let noise = Tensor::<B, 2>::random(
                    mean.dims(),
                    Distribution::Normal(0.0, 1.0),
                    &mean.device(),
                );
                ActionBatch::Continuous(mean.clone() + noise * log_std.clone().exp())
            }
        }
    }

    /// `[batch, 1]`
    fn log_prob(&self, actions: &ActionBatch<B>) -> Tensor<B, 2> {
        match self {
            ActionDist::Categorical { log_probs } => {
                let indices = match actions {
                    ActionBatch::Discrete(t) => t.clone(),
                    ActionBatch::Continuous(t) => t.clone().int(),
                };
                log_probs.clone().gather(1, indices)
            }
            ActionDist::Gaussian { mean, log_std } => {
                let actions = match actions {
                    ActionBatch::Discrete(t) => t.clone().float(),
                    ActionBatch::Continuous(t) => t.clone(),
                };
                let var = log_std.clone().mul_scalar(2.0).exp();
                let sq = (actions - mean.clone()).powf_scalar(2.0);
                (sq.div(var.mul_scalar(2.0)).neg() - log_std.clone() - 0.5 * LOG_2PI).sum_dim(1)
            }
        }
    }

    /// `[batch, 1]`
    fn entropy(&self) -> Tensor<B, 2> {
        match self {
            ActionDist::Categorical { log_probs } => {
                (log_probs.clone().exp() * log_probs.clone()).sum_dim(1).neg()
            }
            ActionDist::Gaussian { mean, log_std } => {
                (mean.zeros_like() + log_std.clone() + 0.5 + 0.5 * LOG_2PI).sum_dim(1)
            }
        }
    }
}

fn tower<B: Backend>(layers: &[OrthogonalLinear<B>], x: Tensor<B, 2>) -> Tensor<B, 2> {
    layers.iter().fold(x, |x, layer| layer.forward(x).tanh())
}

impl<B: Backend> MlpPolicy<B> {
    /// Trunk features and next hidden state.
    ///
    /// Recurrent policies unroll when `observations` has more rows than
    /// `hidden_states` (whole trajectories, time-major).
    fn trunk(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        match &self.gru {
            None => (observations, hidden_states),
            Some(gru) => {
                let rows = observations.dims()[0];
                if rows == hidden_states.dims()[0] {
                    let h = gru.step_masked(observations, hidden_states, masks);
                    (h.clone(), h)
                } else {
                    gru.unroll(observations, hidden_states, masks)
                }
            }
        }
    }

    fn forward(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, ActionDist<B>, Tensor<B, 2>) {
        let (features, hidden) = self.trunk(observations, hidden_states, masks);
        let values = self.value_head.forward(tower(&self.critic, features.clone()));
        let head = self.action_head.forward(tower(&self.actor, features));

        let dist = match &self.log_std {
            None => ActionDist::Categorical {
                log_probs: log_softmax(head, 1),
            },
            Some(log_std) => ActionDist::Gaussian {
                log_std: head.zeros_like() + log_std.val().unsqueeze::<2>(),
                mean: head,
            },
        };
        (values, dist, hidden)
    }

    /// Initial recurrent state, `[batch, hidden_size()]` zeros.
    pub fn initial_hidden(&self, batch: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::zeros([batch, Policy::hidden_size(self)], device)
    }
}

impl<B: Backend> Policy<B> for MlpPolicy<B> {
    fn act(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> ActOutput<B> {
        let (value, dist, hidden_state) = self.forward(observations, hidden_states, masks);
        let action = dist.sample();
        let log_prob = dist.log_prob(&action);
        ActOutput {
            value,
            action,
            log_prob,
            hidden_state,
        }
    }

    fn get_values(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let (features, _) = self.trunk(observations, hidden_states, masks);
        self.value_head.forward(tower(&self.critic, features))
    }

    fn evaluate_actions(
        &self,
        observations: Tensor<B, 2>,
        hidden_states: Tensor<B, 2>,
        masks: Tensor<B, 2>,
        actions: &ActionBatch<B>,
    ) -> Evaluation<B> {
        let (values, dist, _) = self.forward(observations, hidden_states, masks);
        Evaluation {
            values,
            log_probs: dist.log_prob(actions),
            entropy: dist.entropy(),
        }
    }

    fn is_recurrent(&self) -> bool {
        self.gru.is_some()
    }

    fn hidden_size(&self) -> usize {
        if self.is_recurrent() {
            self.hidden_size
        } else {
            1
        }
    }

    fn obs_size(&self) -> usize {
        self.obs_size
    }

    fn action_space(&self) -> &ActionSpace {
        &self.action_space.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TB = NdArray<f32>;
    type AB = Autodiff<NdArray<f32>>;

    fn floats(t: Tensor<TB, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn observations(rows: usize, obs: usize) -> Tensor<TB, 2> {
        Tensor::random([rows, obs], Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn test_discrete_act_shapes() {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(4, ActionSpace::discrete(3))
            .with_hidden_size(16)
            .init::<TB>(&device);
        assert!(!policy.is_recurrent());
        assert_eq!(Policy::hidden_size(&policy), 1);

        let out = policy.act(
            observations(5, 4),
            policy.initial_hidden(5, &device),
            Tensor::ones([5, 1], &device),
        );
        assert_eq!(out.value.dims(), [5, 1]);
        assert_eq!(out.action.dims(), [5, 1]);
        assert_eq!(out.log_prob.dims(), [5, 1]);
        assert_eq!(out.hidden_state.dims(), [5, 1]);

        let actions = out.action.to_floats().unwrap();
        assert!(actions.iter().all(|&a| a == 0.0 || a == 1.0 || a == 2.0));
        assert!(floats(out.log_prob).iter().all(|&lp| lp <= 0.0));
    }

    #[test]
    fn test_evaluate_matches_act_log_probs() {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(3, ActionSpace::discrete(4))
            .with_hidden_size(8)
            .init::<TB>(&device);
        let obs = observations(6, 3);
        let hidden = policy.initial_hidden(6, &device);
        let masks = Tensor::ones([6, 1], &device);

        let out = policy.act(obs.clone(), hidden.clone(), masks.clone());
        let eval = policy.evaluate_actions(obs, hidden, masks, &out.action);

        for (a, b) in floats(out.log_prob).iter().zip(floats(eval.log_probs)) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(floats(out.value), floats(eval.values));
    }

    #[test]
    fn test_initial_categorical_is_near_uniform() {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(4, ActionSpace::discrete(5)).init::<TB>(&device);
        let eval = policy.evaluate_actions(
            observations(3, 4),
            policy.initial_hidden(3, &device),
            Tensor::ones([3, 1], &device),
            &ActionBatch::Discrete(Tensor::zeros([3, 1], &device)),
        );
        let max_entropy = (5.0f32).ln();
        assert!(floats(eval.entropy).iter().all(|&h| (h - max_entropy).abs() < 1e-2));
    }

    #[test]
    fn test_gaussian_entropy_and_log_prob() {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(3, ActionSpace::continuous(2))
            .with_hidden_size(8)
            .init::<TB>(&device);
        let obs = observations(4, 3);
        let hidden = policy.initial_hidden(4, &device);
        let masks = Tensor::ones([4, 1], &device);

        // log_std starts at zero: H = dim * 0.5 * (1 + ln 2π)
        let out = policy.act(obs.clone(), hidden.clone(), masks.clone());
        let eval = policy.evaluate_actions(obs, hidden, masks, &out.action);
        let expected = 2.0 * 0.5 * (1.0 + LOG_2PI);
        assert!(floats(eval.entropy).iter().all(|&h| (h - expected).abs() < 1e-5));
        assert_eq!(out.action.dims(), [4, 2]);

        // Log density never exceeds the peak -dim/2 ln 2π at sigma = 1
        let peak = -LOG_2PI;
        assert!(floats(eval.log_probs).iter().all(|&lp| lp <= peak + 1e-5));
    }

    #[test]
    fn test_recurrent_unrolled_evaluation_matches_stepwise_act() {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(3, ActionSpace::discrete(2))
            .with_hidden_size(6)
            .with_recurrent(true)
            .init::<TB>(&device);
        assert_eq!(Policy::hidden_size(&policy), 6);

        // 3 steps, 2 environments; env 1 resets at t = 1
        let obs = observations(6, 3);
        let masks_flat = [1.0, 1.0, 1.0, 0.0, 1.0, 1.0];
        let masks = Tensor::<TB, 1>::from_floats(masks_flat, &device).reshape([6, 1]);
        let h0 = policy.initial_hidden(2, &device);

        let mut hidden = h0.clone();
        let mut values = Vec::new();
        for t in 0..3 {
            let rows = t * 2..t * 2 + 2;
            let v = policy.get_values(
                obs.clone().slice([rows.clone(), 0..3]),
                hidden.clone(),
                masks.clone().slice([rows.clone(), 0..1]),
            );
            let out = policy.act(
                obs.clone().slice([rows.clone(), 0..3]),
                hidden,
                masks.clone().slice([rows, 0..1]),
            );
            hidden = out.hidden_state;
            values.extend(floats(v));
        }

        let eval = policy.evaluate_actions(
            obs,
            h0,
            masks,
            &ActionBatch::Discrete(Tensor::zeros([6, 1], &device)),
        );
        for (a, b) in values.iter().zip(floats(eval.values)) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gradients_reach_log_std() {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(2, ActionSpace::continuous(1))
            .with_hidden_size(4)
            .init::<AB>(&device);
        let obs = Tensor::<AB, 2>::random([3, 2], Distribution::Normal(0.0, 1.0), &device);
        let eval = policy.evaluate_actions(
            obs,
            policy.initial_hidden(3, &device),
            Tensor::ones([3, 1], &device),
            &ActionBatch::Continuous(Tensor::zeros([3, 1], &device)),
        );
        let grads = eval.entropy.mean().backward();
        let log_std = policy.log_std.as_ref().unwrap().val();
        assert!(log_std.grad(&grads).is_some());
    }
}
