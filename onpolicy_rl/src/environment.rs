//! Environment transport for the training driver.
//!
//! A [`VectorizedEnv`] steps `n_envs` copies of an environment in lockstep.
//! Observations and rewards use a flat per-environment layout:
//! `[env0_obs..., env1_obs..., ...]`. Environments reset themselves after a
//! finished episode, so the observation returned for a done environment is
//! the first observation of its next episode.

use std::fmt;

use crate::core::action_space::ActionSpace;

/// Result from stepping vectorized environments.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Observations after the step, `[n_envs * obs_size]`
    pub observations: Vec<f32>,
    /// Rewards received, `[n_envs]`
    pub rewards: Vec<f32>,
    /// Episode finished (terminal or truncated), `[n_envs]`
    pub dones: Vec<bool>,
}

/// Errors raised by an environment transport.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    /// Wrong number of action values.
    ActionCount { expected: usize, actual: usize },
    /// An action outside the action space.
    InvalidAction { env: usize, action: f32 },
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::ActionCount { expected, actual } => {
                write!(f, "expected {} action values, got {}", expected, actual)
            }
            EnvError::InvalidAction { env, action } => {
                write!(f, "invalid action {} for environment {}", action, env)
            }
        }
    }
}

impl std::error::Error for EnvError {}

/// Vectorized environment stepped by the training driver.
pub trait VectorizedEnv {
    /// Number of parallel environments.
    fn n_envs(&self) -> usize;

    /// Shape of a single environment's observation.
    fn observation_shape(&self) -> Vec<usize>;

    fn action_space(&self) -> ActionSpace;

    /// Reset every environment and return the first observations.
    fn reset(&mut self) -> Vec<f32>;

    /// Step every environment.
    ///
    /// Discrete actions are category indices encoded as `f32`, one per
    /// environment. Box actions are `action_width` floats per environment.
    fn step(&mut self, actions: &[f32]) -> Result<StepResult, EnvError>;

    /// Flattened observation size.
    fn obs_size(&self) -> usize {
        self.observation_shape().iter().product()
    }
}

// ============================================================================
// CartPole
// ============================================================================

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const POLE_LENGTH: f32 = 0.5;
const FORCE_MAG: f32 = 10.0;
const DT: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * std::f32::consts::PI / 180.0;
const INIT_RANGE: f32 = 0.05;

/// Default episode length cap.
pub const CARTPOLE_MAX_STEPS: u32 = 500;

/// Classic cart-pole balancing, `n_envs` copies, Euler integration.
///
/// Observation `[x, x_dot, theta, theta_dot]`, actions `0` (push left) and
/// `1` (push right), reward `1.0` per step including the last.
#[derive(Debug, Clone)]
pub struct CartPoleEnv {
    state: Vec<[f32; 4]>,
    steps: Vec<u32>,
    max_steps: u32,
    rng: fastrand::Rng,
}

impl CartPoleEnv {
    pub fn new(n_envs: usize, seed: u64) -> Self {
        Self {
            state: vec![[0.0; 4]; n_envs],
            steps: vec![0; n_envs],
            max_steps: CARTPOLE_MAX_STEPS,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn reset_single(&mut self, idx: usize) {
        let rng = &mut self.rng;
        self.state[idx] = [(); 4].map(|_| rng.f32() * 2.0 * INIT_RANGE - INIT_RANGE);
        self.steps[idx] = 0;
    }

    /// Advance one environment; returns whether the episode ended.
    fn step_single(&mut self, idx: usize, push_right: bool) -> bool {
        let [x, x_dot, theta, theta_dot] = self.state[idx];
        let force = if push_right { FORCE_MAG } else { -FORCE_MAG };

        let total_mass = CART_MASS + POLE_MASS;
        let pole_mass_length = POLE_MASS * POLE_LENGTH;
        let (sin_theta, cos_theta) = theta.sin_cos();

        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        let next = [
            x + DT * x_dot,
            x_dot + DT * x_acc,
            theta + DT * theta_dot,
            theta_dot + DT * theta_acc,
        ];
        self.state[idx] = next;
        self.steps[idx] += 1;

        let terminal = next[0].abs() > X_THRESHOLD || next[2].abs() > THETA_THRESHOLD;
        terminal || self.steps[idx] >= self.max_steps
    }

    fn observations(&self) -> Vec<f32> {
        self.state.iter().flatten().copied().collect()
    }
}

impl VectorizedEnv for CartPoleEnv {
    fn n_envs(&self) -> usize {
        self.state.len()
    }

    fn observation_shape(&self) -> Vec<usize> {
        vec![4]
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::discrete(2)
    }

    fn reset(&mut self) -> Vec<f32> {
        for i in 0..self.n_envs() {
            self.reset_single(i);
        }
        self.observations()
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult, EnvError> {
        let n = self.n_envs();
        if actions.len() != n {
            return Err(EnvError::ActionCount {
                expected: n,
                actual: actions.len(),
            });
        }
        if let Some((env, &action)) = actions
            .iter()
            .enumerate()
            .find(|&(_, &a)| a != 0.0 && a != 1.0)
        {
            return Err(EnvError::InvalidAction { env, action });
        }

        let mut dones = Vec::with_capacity(n);
        for (i, &action) in actions.iter().enumerate() {
            let done = self.step_single(i, action == 1.0);
            if done {
                self.reset_single(i);
            }
            dones.push(done);
        }

        Ok(StepResult {
            observations: self.observations(),
            rewards: vec![1.0; n],
            dones,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_within_init_range() {
        let mut env = CartPoleEnv::new(4, 7);
        let obs = env.reset();
        assert_eq!(obs.len(), 16);
        assert!(obs.iter().all(|v| v.abs() <= INIT_RANGE));
        assert_eq!(env.obs_size(), 4);
        assert_eq!(env.action_space(), ActionSpace::discrete(2));
    }

    #[test]
    fn test_seeded_reset_is_reproducible() {
        let a = CartPoleEnv::new(3, 42).reset();
        let b = CartPoleEnv::new(3, 42).reset();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_push_terminates_and_auto_resets() {
        let mut env = CartPoleEnv::new(1, 0);
        env.reset();
        let mut episode_len = 0;
        loop {
            let result = env.step(&[1.0]).unwrap();
            episode_len += 1;
            assert_eq!(result.rewards, vec![1.0]);
            if result.dones[0] {
                // Fresh episode after the reset
                assert!(result.observations.iter().all(|v| v.abs() <= INIT_RANGE));
                break;
            }
            assert!(episode_len < 200, "pushing one way should topple the pole");
        }
        assert!(episode_len > 1);
    }

    #[test]
    fn test_truncation_at_max_steps() {
        let mut env = CartPoleEnv::new(2, 3).with_max_steps(1);
        env.reset();
        let result = env.step(&[0.0, 1.0]).unwrap();
        assert_eq!(result.dones, vec![true, true]);
    }

    #[test]
    fn test_action_errors() {
        let mut env = CartPoleEnv::new(2, 0);
        env.reset();
        assert_eq!(
            env.step(&[0.0]),
            Err(EnvError::ActionCount {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            env.step(&[0.0, 2.0]),
            Err(EnvError::InvalidAction { env: 1, action: 2.0 })
        );
    }
}
