use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DqnError, Result};
use crate::types::{Action, Observation, Step};
use super::Environment;

/// Health state of one grid cell. The discriminant is the value the agent observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    Susceptible = 0,
    Infected = 1,
    Immune = 2,
    Vaccinated = 3,
}

impl CellState {
    pub fn code(self) -> f32 {
        self as u8 as f32
    }
}

/// Parameters of the epidemic and of the block-vaccination intervention.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpidemicConfig {
    /// Side length of the square grid.
    pub size: usize,
    /// `(row, col)` of the cells infected at reset.
    pub initial_infected: Vec<(usize, usize)>,
    /// Side length of one vaccination block.
    pub block_size: usize,
    /// Chance that a single infected neighbour infects a susceptible cell in one day.
    pub p_infection: f64,
    /// Daily chance an infected cell becomes immune.
    pub p_recovery: f64,
    /// Daily chance an immune cell becomes susceptible again.
    pub p_immunity_loss: f64,
    pub seed: Option<u64>,
}

impl Default for EpidemicConfig {
    fn default() -> Self {
        EpidemicConfig {
            size: 12,
            initial_infected: vec![(5, 5), (2, 2), (7, 2)],
            block_size: 4,
            p_infection: 0.3,
            p_recovery: 0.2,
            p_immunity_loss: 0.0,
            seed: None,
        }
    }
}

/// Population counts after a simulated day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayReport {
    pub day: usize,
    pub susceptible: usize,
    pub infected: usize,
    pub immune: usize,
    pub vaccinated: usize,
}

/// Grid epidemic where each action vaccinates one block of cells, or does nothing.
///
/// Actions `0..num_blocks` vaccinate every susceptible cell of the block (row-major block
/// order); action `num_blocks` is "no intervention". An episode ends with reward 1 once no
/// infected cell is left; every other day yields 0.
pub struct EpidemicGridEnv {
    config: EpidemicConfig,
    grid: Array2<CellState>,
    blocks_per_side: usize,
    day: usize,
    rng: StdRng,
}

impl EpidemicGridEnv {
    pub fn new(config: EpidemicConfig) -> Result<Self> {
        if config.size == 0 || config.block_size == 0 {
            return Err(DqnError::invalid_parameter("size", "grid and block size must be positive"));
        }
        for p in [config.p_infection, config.p_recovery, config.p_immunity_loss] {
            if !(0.0..=1.0).contains(&p) {
                return Err(DqnError::invalid_parameter("probability".to_string(), format!("{} is not in [0, 1]", p)));
            }
        }
        if let Some(&(r, c)) = config.initial_infected.iter().find(|&&(r, c)| r >= config.size || c >= config.size) {
            return Err(DqnError::invalid_parameter(
                "initial_infected".to_string(),
                format!("({}, {}) lies outside a {}x{} grid", r, c, config.size, config.size),
            ));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let blocks_per_side = (config.size + config.block_size - 1) / config.block_size;
        let mut env = EpidemicGridEnv {
            grid: Array2::from_elem((config.size, config.size), CellState::Susceptible),
            config,
            blocks_per_side,
            day: 0,
            rng,
        };
        env.seed_infections();
        Ok(env)
    }

    fn seed_infections(&mut self) {
        self.grid.fill(CellState::Susceptible);
        for &(r, c) in &self.config.initial_infected {
            self.grid[[r, c]] = CellState::Infected;
        }
        self.day = 0;
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks_per_side * self.blocks_per_side
    }

    /// The "no intervention" action.
    pub fn noop_action(&self) -> Action {
        self.num_blocks()
    }

    pub fn grid(&self) -> &Array2<CellState> {
        &self.grid
    }

    /// Mutable access to the live grid, e.g. to stage a scenario.
    pub fn grid_mut(&mut self) -> &mut Array2<CellState> {
        &mut self.grid
    }

    pub fn observation(&self) -> Observation {
        self.grid.mapv(CellState::code).into_dyn()
    }

    pub fn count(&self, state: CellState) -> usize {
        self.grid.iter().filter(|&&cell| cell == state).count()
    }

    fn block_cells(&self, block: usize) -> impl Iterator<Item = (usize, usize)> {
        let bs = self.config.block_size;
        let size = self.config.size;
        let (row0, col0) = ((block / self.blocks_per_side) * bs, (block % self.blocks_per_side) * bs);
        (row0..(row0 + bs).min(size)).flat_map(move |r| (col0..(col0 + bs).min(size)).map(move |c| (r, c)))
    }

    /// Blocks that still contain a susceptible cell, plus the no-op.
    pub fn valid_actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = (0..self.num_blocks())
            .filter(|&block| self.block_cells(block).any(|(r, c)| self.grid[[r, c]] == CellState::Susceptible))
            .collect();
        actions.push(self.noop_action());
        actions
    }

    fn vaccinate(&mut self, block: usize) {
        let cells: Vec<(usize, usize)> = self.block_cells(block).collect();
        for (r, c) in cells {
            if self.grid[[r, c]] == CellState::Susceptible {
                self.grid[[r, c]] = CellState::Vaccinated;
            }
        }
    }

    fn infected_neighbours(&self, r: usize, c: usize) -> i32 {
        let size = self.config.size;
        let mut count = 0;
        if r > 0 && self.grid[[r - 1, c]] == CellState::Infected {
            count += 1;
        }
        if r + 1 < size && self.grid[[r + 1, c]] == CellState::Infected {
            count += 1;
        }
        if c > 0 && self.grid[[r, c - 1]] == CellState::Infected {
            count += 1;
        }
        if c + 1 < size && self.grid[[r, c + 1]] == CellState::Infected {
            count += 1;
        }
        count
    }

    /// Applies one day of transitions; every cell reads yesterday's grid.
    fn simulate_day(&mut self) {
        let p_escape = 1.0 - self.config.p_infection;
        let mut next = self.grid.clone();
        for ((r, c), cell) in self.grid.indexed_iter() {
            next[[r, c]] = match cell {
                CellState::Susceptible => {
                    let k = self.infected_neighbours(r, c);
                    if k > 0 && self.rng.gen_bool(1.0 - p_escape.powi(k)) {
                        CellState::Infected
                    } else {
                        CellState::Susceptible
                    }
                }
                CellState::Infected => {
                    if self.rng.gen_bool(self.config.p_recovery) {
                        CellState::Immune
                    } else {
                        CellState::Infected
                    }
                }
                CellState::Immune => {
                    if self.rng.gen_bool(self.config.p_immunity_loss) {
                        CellState::Susceptible
                    } else {
                        CellState::Immune
                    }
                }
                CellState::Vaccinated => CellState::Vaccinated,
            };
        }
        self.grid = next;
        self.day += 1;
    }

    fn report(&self) -> DayReport {
        DayReport {
            day: self.day,
            susceptible: self.count(CellState::Susceptible),
            infected: self.count(CellState::Infected),
            immune: self.count(CellState::Immune),
            vaccinated: self.count(CellState::Vaccinated),
        }
    }
}

impl Environment for EpidemicGridEnv {
    type Info = DayReport;

    fn reset(&mut self) -> Result<Observation> {
        self.seed_infections();
        Ok(self.observation())
    }

    fn step(&mut self, action: Action) -> Result<Step<DayReport>> {
        if action >= self.num_actions() {
            return Err(DqnError::InvalidAction {
                action,
                max_actions: self.num_actions(),
            });
        }
        debug!(action, day = self.day, "applying intervention");

        if action != self.noop_action() {
            self.vaccinate(action);
        }
        self.simulate_day();

        let info = self.report();
        let done = info.infected == 0;
        Ok(Step {
            next_state: self.observation(),
            reward: if done { 1.0 } else { 0.0 },
            done,
            info,
        })
    }

    fn sample_action(&mut self) -> Action {
        let valid = self.valid_actions();
        *valid.choose(&mut self.rng).unwrap_or(&self.noop_action())
    }

    fn num_actions(&self) -> usize {
        self.num_blocks() + 1
    }

    fn observation_shape(&self) -> Vec<usize> {
        vec![self.config.size, self.config.size]
    }
}
