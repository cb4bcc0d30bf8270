use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayViewD, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{Device, Tensor};
use crate::env::Environment;
use crate::error::{DqnError, Result};
use crate::loss::{Loss, MeanSquaredError};
use crate::network::{batch_observations, QNetwork, ValueNetwork};
use crate::optimizer::{Adam, Optimizer, OptimizerWrapper};
use crate::replay_buffer::{ReplayBuffer, TransitionBatch};
use crate::types::Action;

/// Exploration rate used when the caller has no schedule of its own.
pub const DEFAULT_EPS: f32 = 0.30;

/// How the exploration draw is compared against `(1 - progress_ratio) * eps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExplorationRule {
    /// Explore when a standard-normal sample falls below the threshold. A non-positive
    /// threshold never explores, so `progress_ratio = 1` or `eps = 0` is purely greedy.
    #[default]
    StandardNormal,
    /// Explore with probability exactly equal to the threshold.
    Uniform,
}

/// Agent hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Convolutional network for grid observations, fully-connected otherwise.
    pub use_conv: bool,
    pub learning_rate: f32,
    /// Discount factor of the TD target.
    pub gamma: f32,
    /// Replay buffer capacity.
    pub buffer_size: usize,
    pub exploration: ExplorationRule,
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            use_conv: true,
            learning_rate: 1e-3,
            gamma: 0.95,
            buffer_size: 10_000,
            exploration: ExplorationRule::StandardNormal,
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DqnError::invalid_parameter(
                "learning_rate".to_string(),
                format!("{} must be a positive finite number", self.learning_rate),
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DqnError::invalid_parameter(
                "gamma".to_string(),
                format!("{} is not in [0, 1]", self.gamma),
            ));
        }
        if self.buffer_size == 0 {
            return Err(DqnError::invalid_parameter("buffer_size", "must be positive"));
        }
        Ok(())
    }
}

/// Deep Q-Network agent with a uniform replay buffer and a single value network.
pub struct DqnAgent {
    pub network: ValueNetwork,
    pub replay_buffer: ReplayBuffer,
    pub optimizer: OptimizerWrapper,
    pub gamma: f32,
    pub learning_rate: f32,
    pub exploration: ExplorationRule,
    /// Number of parameter updates applied so far.
    pub train_steps: usize,
    loss: MeanSquaredError,
    device: Device,
    rng: StdRng,
}

#[derive(Serialize, Deserialize)]
struct Checkpoint {
    network: ValueNetwork,
    gamma: f32,
    learning_rate: f32,
    train_steps: usize,
}

impl DqnAgent {
    pub fn builder() -> DqnAgentBuilder {
        DqnAgentBuilder::new()
    }

    /// Agent with default hyperparameters sized for `env`.
    pub fn new<E: Environment>(env: &E, use_conv: bool) -> Result<Self> {
        DqnAgentBuilder::new().use_conv(use_conv).build(env)
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn num_actions(&self) -> usize {
        self.network.num_actions()
    }

    /// Q-values of a single observation.
    pub fn q_values(&self, state: ArrayViewD<'_, f32>) -> Result<Array1<f32>> {
        let batch = Tensor::new(state.insert_axis(Axis(0)).to_owned(), self.device);
        let q = self.network.forward(&batch)?;
        Ok(q.index_axis_move(Axis(0), 0))
    }

    /// Index of the largest Q-value; ties go to the lowest index.
    pub fn greedy_action(&self, state: ArrayViewD<'_, f32>) -> Result<Action> {
        argmax(&self.q_values(state)?)
    }

    /// Epsilon-greedy action whose exploration threshold is `(1 - progress_ratio) * eps`.
    ///
    /// `progress_ratio` runs from 0 at the start of training to about 1 at the end. When the
    /// draw says explore, the environment picks a random valid action.
    ///
    /// A threshold of zero or below never explores, even though a normal draw can fall under
    /// it; `progress_ratio >= 1` or `eps <= 0` always returns the greedy action.
    pub fn get_action<E: Environment>(
        &mut self,
        env: &mut E,
        state: ArrayViewD<'_, f32>,
        progress_ratio: f32,
        eps: f32,
    ) -> Result<Action> {
        let action = self.greedy_action(state)?;

        let threshold = (1.0 - progress_ratio) * eps;
        let explore = match self.exploration {
            ExplorationRule::StandardNormal => {
                let draw: f32 = self.rng.sample(StandardNormal);
                threshold > 0.0 && draw < threshold
            }
            ExplorationRule::Uniform => self.rng.gen::<f32>() < threshold,
        };

        if explore {
            let random_action = env.sample_action();
            if random_action >= self.num_actions() {
                return Err(DqnError::InvalidAction {
                    action: random_action,
                    max_actions: self.num_actions(),
                });
            }
            return Ok(random_action);
        }
        Ok(action)
    }

    /// Mean squared TD error of `batch` under the current parameters.
    pub fn compute_loss(&self, batch: &TransitionBatch) -> Result<f32> {
        batch.validate()?;
        let states = batch_observations(&batch.states, self.device)?;
        let q = self.network.forward(&states)?;
        let current = gather(&q, &batch.actions)?;
        let targets = self.td_targets(batch)?;
        self.loss.compute(current.view(), targets.view())
    }

    /// `reward + gamma * max_a Q(next_state, a)` for every transition, treated as a constant.
    ///
    /// The continuation term is kept for terminal transitions too.
    pub fn td_targets(&self, batch: &TransitionBatch) -> Result<Array1<f32>> {
        batch.validate()?;
        let next_states = batch_observations(&batch.next_states, self.device)?;
        let next_q = self.network.forward(&next_states)?;
        let max_next_q = next_q.fold_axis(Axis(1), f32::NEG_INFINITY, |&m, &v| m.max(v));
        Ok(Array1::from(batch.rewards.clone()) + max_next_q * self.gamma)
    }

    /// Samples `batch_size` transitions and applies one optimizer step. Returns the loss
    /// measured before the step.
    pub fn update(&mut self, batch_size: usize) -> Result<f32> {
        let batch = self.replay_buffer.sample_with_rng(batch_size, &mut self.rng)?;
        self.update_on_batch(&batch)
    }

    /// One gradient step on an explicit batch.
    pub fn update_on_batch(&mut self, batch: &TransitionBatch) -> Result<f32> {
        let targets = self.td_targets(batch)?;

        let states = batch_observations(&batch.states, self.device)?;
        let q = self.network.forward_train(&states)?;
        let current = gather(&q, &batch.actions)?;

        let loss = self.loss.compute(current.view(), targets.view())?;
        if !loss.is_finite() {
            return Err(DqnError::NumericalError(format!("loss diverged to {}", loss)));
        }

        // Only the taken action's output receives gradient.
        let d_current = self.loss.gradient(current.view(), targets.view())?;
        let mut output_grad = Array2::zeros(q.raw_dim());
        for (i, (&action, &g)) in batch.actions.iter().zip(d_current.iter()).enumerate() {
            output_grad[[i, action]] = g;
        }

        let gradients = self.network.backward(output_grad.view())?;
        self.optimizer.step(self.network.parameters_mut(), &gradients, self.learning_rate)?;

        self.train_steps += 1;
        debug!(loss, train_steps = self.train_steps, batch = batch.len(), "dqn update");
        Ok(loss)
    }

    /// Write the network weights and hyperparameters with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let checkpoint = Checkpoint {
            network: self.network.clone(),
            gamma: self.gamma,
            learning_rate: self.learning_rate,
            train_steps: self.train_steps,
        };
        fs::write(path, bincode::serialize(&checkpoint)?)?;
        Ok(())
    }

    /// Replace the network with one saved by [`DqnAgent::save`]. The saved network must have
    /// the same input shape, action count and device. Optimizer state starts over.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let checkpoint: Checkpoint = bincode::deserialize(&fs::read(path)?)?;
        let net = &checkpoint.network;
        if net.input_shape() != self.network.input_shape() || net.num_actions() != self.num_actions() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?} -> {}", self.network.input_shape(), self.num_actions()),
                format!("{:?} -> {}", net.input_shape(), net.num_actions()),
            ));
        }
        self.device.ensure_same(net.device())?;

        self.network = checkpoint.network;
        self.gamma = checkpoint.gamma;
        self.learning_rate = checkpoint.learning_rate;
        self.train_steps = checkpoint.train_steps;
        self.optimizer = OptimizerWrapper::Adam(Adam::default());
        Ok(())
    }
}

/// Q-value of the taken action for every row.
fn gather(q: &Array2<f32>, actions: &[Action]) -> Result<Array1<f32>> {
    let num_actions = q.ncols();
    if let Some(&action) = actions.iter().find(|&&a| a >= num_actions) {
        return Err(DqnError::InvalidAction { action, max_actions: num_actions });
    }
    if actions.len() != q.nrows() {
        return Err(DqnError::dimension_mismatch(
            format!("{} actions", q.nrows()),
            format!("{}", actions.len()),
        ));
    }
    Ok(Array1::from_shape_fn(actions.len(), |i| q[[i, actions[i]]]))
}

fn argmax(values: &Array1<f32>) -> Result<Action> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            return Err(DqnError::NumericalError("Q-value is NaN".to_string()));
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| DqnError::NumericalError("No Q-values to choose from".to_string()))
}

/// Builder pattern for DqnAgent
pub struct DqnAgentBuilder {
    config: AgentConfig,
    device: Device,
    optimizer: Option<OptimizerWrapper>,
}

impl DqnAgentBuilder {
    pub fn new() -> Self {
        DqnAgentBuilder {
            config: AgentConfig::default(),
            device: Device::preferred(),
            optimizer: None,
        }
    }

    pub fn from_config(config: AgentConfig) -> Self {
        DqnAgentBuilder {
            config,
            ..Self::new()
        }
    }

    pub fn use_conv(mut self, use_conv: bool) -> Self {
        self.config.use_conv = use_conv;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config.gamma = gamma;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn exploration(mut self, rule: ExplorationRule) -> Self {
        self.config.exploration = rule;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Defaults to Adam(0.9, 0.999, 1e-8).
    pub fn optimizer(mut self, optimizer: OptimizerWrapper) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Reads the observation shape and action count from `env` once.
    pub fn build<E: Environment>(self, env: &E) -> Result<DqnAgent> {
        let shape = env.observation_shape();
        let num_actions = env.num_actions();
        self.build_for(&shape, num_actions)
    }

    pub fn build_for(self, input_shape: &[usize], num_actions: usize) -> Result<DqnAgent> {
        self.config.validate()?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let network = ValueNetwork::new(self.config.use_conv, input_shape, num_actions, self.device, &mut rng)?;

        Ok(DqnAgent {
            network,
            replay_buffer: ReplayBuffer::new(self.config.buffer_size)?,
            optimizer: self.optimizer.unwrap_or_else(|| OptimizerWrapper::Adam(Adam::default())),
            gamma: self.config.gamma,
            learning_rate: self.config.learning_rate,
            exploration: self.config.exploration,
            train_steps: 0,
            loss: MeanSquaredError,
            device: self.device,
            rng,
        })
    }
}

impl Default for DqnAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
