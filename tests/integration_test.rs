use epidemic_dqn::{
    agent::{DqnAgent, DqnAgentBuilder},
    config::RunConfig,
    env::{CellState, EpidemicConfig, EpidemicGridEnv, Environment},
    error::{DqnError, Result},
    trainer::{mini_batch_train, train, TrainingConfig},
    types::{Action, Observation, Step},
};
use ndarray::{ArrayD, IxDyn};

/// Finishes every episode after `episode_len` steps, paying 1.0 per step.
struct CountdownEnv {
    episode_len: usize,
    remaining: usize,
    steps_taken: usize,
}

impl CountdownEnv {
    fn new(episode_len: usize) -> Self {
        CountdownEnv { episode_len, remaining: episode_len, steps_taken: 0 }
    }

    fn observation(&self) -> Observation {
        ArrayD::from_elem(IxDyn(&[4]), self.remaining as f32)
    }
}

impl Environment for CountdownEnv {
    type Info = ();

    fn reset(&mut self) -> Result<Observation> {
        self.remaining = self.episode_len;
        Ok(self.observation())
    }

    fn step(&mut self, _action: Action) -> Result<Step> {
        self.steps_taken += 1;
        self.remaining = self.remaining.saturating_sub(1);
        Ok(Step {
            next_state: self.observation(),
            reward: 1.0,
            done: self.remaining == 0,
            info: (),
        })
    }

    fn sample_action(&mut self) -> Action {
        1
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn observation_shape(&self) -> Vec<usize> {
        vec![4]
    }
}

fn dense_agent<E: Environment>(env: &E) -> DqnAgent {
    DqnAgent::builder().use_conv(false).seed(17).build(env).unwrap()
}

#[test]
fn test_rewards_are_recorded_once_per_episode() {
    let mut env = CountdownEnv::new(2);
    let mut agent = dense_agent(&env);

    let rewards = mini_batch_train(&mut env, &mut agent, 3, 2, 1).unwrap();
    assert_eq!(rewards, vec![2.0, 2.0, 2.0]);
    assert_eq!(agent.replay_buffer.len(), 6);
    // The buffer holds more than one transition after the second step.
    assert_eq!(agent.train_steps, 5);
}

#[test]
fn test_episode_stops_at_done() {
    let mut env = CountdownEnv::new(2);
    let mut agent = dense_agent(&env);

    let rewards = mini_batch_train(&mut env, &mut agent, 4, 10, 8).unwrap();
    assert_eq!(rewards, vec![2.0; 4]);
    assert_eq!(env.steps_taken, 8);
    // Never more than batch_size transitions, so no update ran.
    assert_eq!(agent.train_steps, 0);
}

#[test]
fn test_episode_stops_at_step_bound() {
    let mut env = CountdownEnv::new(100);
    let mut agent = dense_agent(&env);

    let mut summaries = Vec::new();
    let config = TrainingConfig::new(3, 5, 4);
    let log = train(&mut env, &mut agent, &config, |s| summaries.push(*s)).unwrap();

    assert_eq!(log.rewards(), &[5.0, 5.0, 5.0]);
    assert_eq!(summaries.len(), 3);
    for (i, summary) in summaries.iter().enumerate() {
        assert_eq!(summary.episode, i);
        assert_eq!(summary.steps, 5);
        assert!(!summary.terminated);
    }
    assert!(summaries[0].mean_loss.is_some());
}

#[test]
fn test_zero_step_bound_is_rejected() {
    let mut env = CountdownEnv::new(2);
    let mut agent = dense_agent(&env);
    assert!(matches!(
        mini_batch_train(&mut env, &mut agent, 3, 0, 1),
        Err(DqnError::InvalidParameter { .. })
    ));
    assert!(mini_batch_train(&mut env, &mut agent, 3, 2, 0).is_err());
    assert_eq!(env.steps_taken, 0);
}

#[test]
fn test_zero_episodes_returns_nothing() {
    let mut env = CountdownEnv::new(2);
    let mut agent = dense_agent(&env);
    assert!(mini_batch_train(&mut env, &mut agent, 0, 4, 16).unwrap().is_empty());
}

#[test]
fn test_report_cadence_covers_long_runs() {
    let mut env = CountdownEnv::new(1);
    let mut agent = dense_agent(&env);
    let config = TrainingConfig { report_every: 10, ..TrainingConfig::new(25, 1, 4) };
    let log = train(&mut env, &mut agent, &config, |_| {}).unwrap();
    assert_eq!(log.len(), 25);
    assert_eq!(log.rolling_mean(10), Some(1.0));
}

#[test]
fn test_epidemic_training_run() {
    let mut env = EpidemicGridEnv::new(EpidemicConfig { seed: Some(3), ..EpidemicConfig::default() }).unwrap();
    let mut agent = DqnAgent::builder().seed(3).build(&env).unwrap();
    assert!(agent.network.is_conv());
    assert_eq!(agent.num_actions(), 10);

    let rewards = mini_batch_train(&mut env, &mut agent, 12, 4, 8).unwrap();
    assert_eq!(rewards.len(), 12);
    assert!(rewards.iter().all(|r| (0.0..=1.0).contains(r)));
    assert!(agent.train_steps > 0);
    assert!(agent.replay_buffer.len() <= 12 * 4);
}

#[test]
fn test_epidemic_dense_agent_and_reset() {
    let mut env = EpidemicGridEnv::new(EpidemicConfig { seed: Some(9), ..EpidemicConfig::default() }).unwrap();
    let mut agent = DqnAgent::builder().use_conv(false).seed(9).build(&env).unwrap();
    mini_batch_train(&mut env, &mut agent, 5, 3, 4).unwrap();

    let obs = env.reset().unwrap();
    assert_eq!(obs.shape(), &[12, 12]);
    assert_eq!(env.count(CellState::Infected), 3);
    assert_eq!(env.count(CellState::Vaccinated), 0);
}

#[test]
fn test_run_config_drives_a_run() {
    let config = RunConfig::from_json_str(
        r#"{
            "agent": { "use_conv": false, "seed": 1, "buffer_size": 64 },
            "training": { "max_episodes": 3, "max_steps": 2, "batch_size": 2 },
            "environment": { "seed": 1 }
        }"#,
    )
    .unwrap();
    config.validate().unwrap();

    let mut env = EpidemicGridEnv::new(config.environment.clone()).unwrap();
    let mut agent = DqnAgentBuilder::from_config(config.agent.clone()).build(&env).unwrap();
    let log = train(&mut env, &mut agent, &config.training, |_| {}).unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(agent.replay_buffer.capacity(), 64);
}
