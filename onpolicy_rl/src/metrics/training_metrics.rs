//! Episode reward bookkeeping for the training driver.

use std::collections::VecDeque;

/// Per-environment running sum of raw rewards for the current episode.
#[derive(Debug, Clone)]
pub struct EpisodeRewards {
    running: Vec<f32>,
}

impl EpisodeRewards {
    pub fn new(n_envs: usize) -> Self {
        Self {
            running: vec![0.0; n_envs],
        }
    }

    /// Add one step of rewards; returns the totals of episodes that just ended.
    pub fn step(&mut self, rewards: &[f32], dones: &[bool]) -> Vec<f32> {
        debug_assert_eq!(rewards.len(), self.running.len());
        debug_assert_eq!(dones.len(), self.running.len());

        let mut finished = Vec::new();
        for ((total, &reward), &done) in self.running.iter_mut().zip(rewards).zip(dones) {
            *total += reward;
            if done {
                finished.push(*total);
                *total = 0.0;
            }
        }
        finished
    }

    pub fn running(&self) -> &[f32] {
        &self.running
    }
}

/// Moving window over the most recent finished-episode rewards.
#[derive(Debug, Clone)]
pub struct RewardHistory {
    window: VecDeque<f32>,
    capacity: usize,
    episode_count: usize,
}

impl RewardHistory {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "reward window must be > 0");
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            episode_count: 0,
        }
    }

    pub fn push(&mut self, episode_reward: f32) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(episode_reward);
        self.episode_count += 1;
    }

    pub fn extend(&mut self, episode_rewards: impl IntoIterator<Item = f32>) {
        for reward in episode_rewards {
            self.push(reward);
        }
    }

    /// Mean over the stored `min(episode_count, capacity)` rewards.
    pub fn average(&self) -> Option<f32> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f32>() / self.window.len() as f32)
    }

    /// Episodes finished since creation.
    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_rewards_accumulate_and_reset() {
        let mut tracker = EpisodeRewards::new(2);
        assert!(tracker.step(&[1.0, 2.0], &[false, false]).is_empty());
        assert_eq!(tracker.step(&[1.0, 2.0], &[false, true]), vec![4.0]);
        assert_eq!(tracker.running(), &[2.0, 0.0]);
        assert_eq!(tracker.step(&[0.5, 1.0], &[true, true]), vec![2.5, 1.0]);
        assert_eq!(tracker.running(), &[0.0, 0.0]);
    }

    #[test]
    fn test_history_empty_has_no_average() {
        let history = RewardHistory::new(10);
        assert_eq!(history.average(), None);
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_partial_window_divides_by_count() {
        let mut history = RewardHistory::new(10);
        history.extend([10.0, 20.0]);
        assert_eq!(history.average(), Some(15.0));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_history_keeps_most_recent() {
        let mut history = RewardHistory::new(3);
        history.extend([100.0, 1.0, 2.0, 3.0]);
        assert_eq!(history.average(), Some(2.0));
        assert_eq!(history.len(), 3);
        assert_eq!(history.episode_count(), 4);
    }

    #[test]
    #[should_panic(expected = "reward window")]
    fn test_history_zero_window() {
        RewardHistory::new(0);
    }
}
