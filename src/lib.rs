//! # epidemic-dqn - Deep Q-Learning for epidemic interventions
//!
//! Trains an agent to pick intervention actions (vaccinating grid blocks) in a grid-based
//! epidemic simulation so that the infection dies out.
//!
//! ## Key Pieces
//!
//! - **Replay buffer**: fixed-capacity FIFO ring of transitions with uniform sampling
//! - **Value networks**: a convolutional variant for grids and a fully-connected variant for
//!   feature vectors, both mapping an observation to one Q-value per action
//! - **Agent**: epsilon-greedy action selection, TD(0) loss and Adam updates
//! - **Training loop**: episodic interaction, replay, updates and reward reporting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use epidemic_dqn::agent::DqnAgent;
//! use epidemic_dqn::env::{EpidemicConfig, EpidemicGridEnv};
//! use epidemic_dqn::trainer::mini_batch_train;
//!
//! let mut env = EpidemicGridEnv::new(EpidemicConfig::default()).unwrap();
//! let mut agent = DqnAgent::new(&env, true).unwrap();
//! let rewards = mini_batch_train(&mut env, &mut agent, 2000, 4, 16).unwrap();
//! println!("{} episodes", rewards.len());
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - ReLU and linear activations
//! - [`agent`] - The DQN agent and its builder
//! - [`config`] - JSON run configuration
//! - [`device`] - Device placement of tensors and parameters
//! - [`env`] - Environment trait and the epidemic grid
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense and 2D convolution layers
//! - [`loss`] - Loss functions
//! - [`metrics`] - Episode reward log
//! - [`network`] - Value network variants
//! - [`optimizer`] - Adam and SGD
//! - [`replay_buffer`] - Experience replay
//! - [`trainer`] - The training loop
//! - [`types`] - Observation, action and step types

pub mod activations;
pub mod agent;
pub mod config;
pub mod device;
pub mod env;
pub mod error;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod replay_buffer;
pub mod trainer;
pub mod types;
