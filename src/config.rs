//! Run configuration, loadable from a JSON file.
//!
//! ```json
//! {
//!   "agent": { "use_conv": true, "gamma": 0.95 },
//!   "training": { "max_episodes": 2000, "max_steps": 4, "batch_size": 16 },
//!   "environment": { "size": 12, "block_size": 4 }
//! }
//! ```
//!
//! Missing sections and fields take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::env::EpidemicConfig;
use crate::error::Result;
use crate::trainer::TrainingConfig;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub agent: AgentConfig,
    pub training: TrainingConfig,
    pub environment: EpidemicConfig,
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.training.validate()
    }
}
