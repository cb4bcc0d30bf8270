//! Shared type aliases for observations, actions and environment steps.

use ndarray::ArrayD;

/// A snapshot of what the agent observes: a categorical grid `[H, W]` (cell codes stored as
/// `f32`) or a flat feature vector `[D]`.
pub type Observation = ArrayD<f32>;

/// Index into the environment's fixed action space.
pub type Action = usize;

/// Outcome of advancing an environment by one action.
#[derive(Clone, Debug, PartialEq)]
pub struct Step<I = ()> {
    pub next_state: Observation,
    pub reward: f32,
    pub done: bool,
    pub info: I,
}
