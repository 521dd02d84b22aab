//! Simulated shower datasets: the on-disk format and a synthetic generator.

pub mod dataset;
pub mod sample;

pub use dataset::*;
pub use sample::{SimulationConfig, SimulationSummary, generate_tree, simulate};
