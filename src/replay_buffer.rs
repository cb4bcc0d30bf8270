//! Fixed-capacity experience replay with uniform sampling.

use std::collections::VecDeque;

use ndarray::ArrayViewD;
use rand::seq::index;
use rand::{thread_rng, Rng};

use crate::error::{DqnError, Result};
use crate::types::{Action, Observation};

/// One environment interaction. States are owned snapshots, independent of the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: Observation,
    pub action: Action,
    pub reward: f32,
    pub next_state: Observation,
    pub done: bool,
}

/// Five parallel sequences, entry `i` of each belonging to the `i`-th sampled transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionBatch {
    pub states: Vec<Observation>,
    pub actions: Vec<Action>,
    pub rewards: Vec<f32>,
    pub next_states: Vec<Observation>,
    pub dones: Vec<bool>,
}

impl TransitionBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        TransitionBatch {
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            next_states: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, transition: &Transition) {
        self.states.push(transition.state.clone());
        self.actions.push(transition.action);
        self.rewards.push(transition.reward);
        self.next_states.push(transition.next_state.clone());
        self.dones.push(transition.done);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Fails unless all five sequences have the same, non-zero length.
    pub fn validate(&self) -> Result<()> {
        let n = self.actions.len();
        if n == 0 {
            return Err(DqnError::EmptyBuffer("batch holds no transitions".to_string()));
        }
        let lengths = [self.states.len(), self.rewards.len(), self.next_states.len(), self.dones.len()];
        if lengths.iter().any(|&len| len != n) {
            return Err(DqnError::dimension_mismatch(
                format!("{} entries in every sequence", n),
                format!("{:?}", lengths),
            ));
        }
        Ok(())
    }
}

/// Ring of at most `capacity` transitions; the oldest is evicted when a push overflows it.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DqnError::invalid_parameter("max_size", "replay buffer capacity must be positive"));
        }
        Ok(ReplayBuffer {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Stores a deep copy of both states.
    pub fn push(&mut self, state: ArrayViewD<'_, f32>, action: Action, reward: f32, next_state: ArrayViewD<'_, f32>, done: bool) {
        self.add(Transition {
            state: state.to_owned(),
            action,
            reward,
            next_state: next_state.to_owned(),
            done,
        });
    }

    pub fn add(&mut self, transition: Transition) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Draws `batch_size` distinct transitions uniformly at random.
    pub fn sample(&self, batch_size: usize) -> Result<TransitionBatch> {
        self.sample_with_rng(batch_size, &mut thread_rng())
    }

    pub fn sample_with_rng<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<TransitionBatch> {
        if batch_size == 0 {
            return Err(DqnError::invalid_parameter("batch_size", "cannot sample an empty batch"));
        }
        if self.buffer.is_empty() {
            return Err(DqnError::EmptyBuffer("replay buffer holds no transitions".to_string()));
        }
        if batch_size > self.buffer.len() {
            return Err(DqnError::InsufficientSamples {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }

        let mut batch = TransitionBatch::with_capacity(batch_size);
        for i in index::sample(rng, self.buffer.len(), batch_size).iter() {
            batch.push(&self.buffer[i]);
        }
        Ok(batch)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
