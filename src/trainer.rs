//! Episodic mini-batch training loop.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{DqnAgent, DEFAULT_EPS};
use crate::env::Environment;
use crate::error::{DqnError, Result};
use crate::metrics::{EpisodeSummary, RewardLog};

/// Bounds and reporting cadence of a training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub max_episodes: usize,
    /// Step bound per episode.
    pub max_steps: usize,
    pub batch_size: usize,
    /// Print the rolling mean reward every this many episodes.
    pub report_every: usize,
    /// Base exploration rate, scaled down linearly with training progress.
    pub eps: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            max_episodes: 2000,
            max_steps: 4,
            batch_size: 16,
            report_every: 100,
            eps: DEFAULT_EPS,
        }
    }
}

impl TrainingConfig {
    pub fn new(max_episodes: usize, max_steps: usize, batch_size: usize) -> Self {
        TrainingConfig {
            max_episodes,
            max_steps,
            batch_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(DqnError::invalid_parameter("max_steps", "episodes need at least one step"));
        }
        if self.batch_size == 0 {
            return Err(DqnError::invalid_parameter("batch_size", "must be positive"));
        }
        if self.report_every == 0 {
            return Err(DqnError::invalid_parameter("report_every", "must be positive"));
        }
        if !self.eps.is_finite() {
            return Err(DqnError::invalid_parameter("eps", "must be finite"));
        }
        Ok(())
    }
}

/// Runs `max_episodes` episodes of at most `max_steps` steps and returns each episode's
/// total reward, in order.
///
/// An update runs after every step once the buffer holds more than `batch_size`
/// transitions. Every 100 episodes the mean reward of the last 100 is printed.
pub fn mini_batch_train<E: Environment>(
    env: &mut E,
    agent: &mut DqnAgent,
    max_episodes: usize,
    max_steps: usize,
    batch_size: usize,
) -> Result<Vec<f32>> {
    let config = TrainingConfig::new(max_episodes, max_steps, batch_size);
    Ok(train(env, agent, &config, |_| {})?.into_rewards())
}

/// The training loop behind [`mini_batch_train`]. `on_episode` sees every finished episode as
/// it happens, so callers can persist progress before the run ends.
pub fn train<E, F>(env: &mut E, agent: &mut DqnAgent, config: &TrainingConfig, mut on_episode: F) -> Result<RewardLog>
where
    E: Environment,
    F: FnMut(&EpisodeSummary),
{
    config.validate()?;
    let mut log = RewardLog::with_capacity(config.max_episodes);

    for episode in 0..config.max_episodes {
        let progress_ratio = episode as f32 / config.max_episodes as f32;
        let mut state = env.reset()?;
        let mut episode_reward = 0.0;
        let mut loss_sum = 0.0;
        let mut updates = 0usize;

        for step in 0..config.max_steps {
            let action = agent.get_action(env, state.view(), progress_ratio, config.eps)?;
            let outcome = env.step(action)?;
            agent.replay_buffer.push(
                state.view(),
                action,
                outcome.reward,
                outcome.next_state.view(),
                outcome.done,
            );
            episode_reward += outcome.reward;

            if agent.replay_buffer.len() > config.batch_size {
                loss_sum += agent.update(config.batch_size)?;
                updates += 1;
            }

            if outcome.done || step == config.max_steps - 1 {
                log.record(episode_reward);
                let summary = EpisodeSummary {
                    episode,
                    total_reward: episode_reward,
                    steps: step + 1,
                    terminated: outcome.done,
                    mean_loss: (updates > 0).then(|| loss_sum / updates as f32),
                };
                debug!(?summary, "episode finished");
                on_episode(&summary);

                if (episode + 1) % config.report_every == 0 {
                    if let Some(avg) = log.rolling_mean(config.report_every) {
                        println!("Episode {}: {}", episode + 1, avg);
                        info!(episode = episode + 1, avg_reward = avg, "progress");
                    }
                }
                break;
            }

            state = outcome.next_state;
        }
    }

    Ok(log)
}
