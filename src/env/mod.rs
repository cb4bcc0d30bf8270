//! The environment seam the trainer drives.
//!
//! Anything that can be reset, stepped with a discrete action and asked for a random valid
//! action can be trained on. [`EpidemicGridEnv`] is the grid epidemic used by the binary.

mod epidemic;

pub use epidemic::{CellState, DayReport, EpidemicConfig, EpidemicGridEnv};

use crate::error::Result;
use crate::types::{Action, Observation, Step};

/// Single-agent episodic environment with a finite action space.
pub trait Environment {
    /// Extra diagnostics returned with every step.
    type Info;

    /// Restore the initial state and return its observation.
    fn reset(&mut self) -> Result<Observation>;

    /// Advance by one action. Returned observations are snapshots the caller owns.
    fn step(&mut self, action: Action) -> Result<Step<Self::Info>>;

    /// A uniformly chosen valid action.
    fn sample_action(&mut self) -> Action;

    /// Size of the action space; valid action indices are `0..num_actions()`.
    fn num_actions(&self) -> usize;

    /// Shape of one observation.
    fn observation_shape(&self) -> Vec<usize>;
}
