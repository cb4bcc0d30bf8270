//! # Deep Q-Learning Agent
//!
//! [`DqnAgent`] owns the value network, the replay buffer and the optimizer. It offers
//! epsilon-greedy action selection whose exploration shrinks with training progress, and a
//! parameter update driven by transitions sampled uniformly from its buffer.
//!
//! There is a single network: the one-step TD target `r + gamma * max_a Q(s', a)` is
//! computed with the same parameters being trained, held constant during the update.
//!
//! ```rust,no_run
//! use epidemic_dqn::agent::DqnAgent;
//! use epidemic_dqn::env::{EpidemicConfig, EpidemicGridEnv, Environment};
//!
//! let mut env = EpidemicGridEnv::new(EpidemicConfig::default()).unwrap();
//! let mut agent = DqnAgent::builder().use_conv(true).build(&env).unwrap();
//!
//! let state = env.reset().unwrap();
//! let action = agent.get_action(&mut env, state.view(), 0.0, 0.30).unwrap();
//! let step = env.step(action).unwrap();
//! agent.replay_buffer.push(state.view(), action, step.reward, step.next_state.view(), step.done);
//! ```

mod dqn;

pub use dqn::{AgentConfig, DqnAgent, DqnAgentBuilder, ExplorationRule, DEFAULT_EPS};
