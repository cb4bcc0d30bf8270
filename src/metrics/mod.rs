pub mod tracker;

pub use tracker::{EpisodeSummary, RewardLog};
