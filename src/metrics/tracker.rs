use serde::{Serialize, Deserialize};

/// What the trainer reports after each finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Zero-based episode index.
    pub episode: usize,
    pub total_reward: f32,
    /// Number of environment steps taken.
    pub steps: usize,
    /// Whether the environment signalled termination (as opposed to hitting the step bound).
    pub terminated: bool,
    /// Mean loss over the updates run during the episode, if any ran.
    pub mean_loss: Option<f32>,
}

/// Append-only record of per-episode total rewards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardLog {
    rewards: Vec<f32>,
}

impl RewardLog {
    pub fn new() -> Self {
        RewardLog { rewards: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RewardLog { rewards: Vec::with_capacity(capacity) }
    }

    pub fn record(&mut self, total_reward: f32) {
        self.rewards.push(total_reward);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    /// Mean of the last `window` rewards (fewer if fewer were recorded).
    pub fn rolling_mean(&self, window: usize) -> Option<f32> {
        if window == 0 || self.rewards.is_empty() {
            return None;
        }
        let tail = &self.rewards[self.rewards.len().saturating_sub(window)..];
        Some(tail.iter().sum::<f32>() / tail.len() as f32)
    }

    pub fn into_rewards(self) -> Vec<f32> {
        self.rewards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_mean_uses_only_the_tail() {
        let mut log = RewardLog::new();
        assert_eq!(log.rolling_mean(100), None);
        for r in [10.0, 0.0, 1.0, 2.0] {
            log.record(r);
        }
        assert_eq!(log.rolling_mean(3), Some(1.0));
        assert_eq!(log.rolling_mean(100), Some(3.25));
        assert_eq!(log.rolling_mean(0), None);
    }

    #[test]
    fn log_is_append_only_in_order() {
        let mut log = RewardLog::with_capacity(2);
        log.record(1.0);
        log.record(2.0);
        assert_eq!(log.rewards(), &[1.0, 2.0]);
        assert_eq!(log.into_rewards(), vec![1.0, 2.0]);
    }
}
