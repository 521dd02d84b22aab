//! The calibration sweep engine.
//!
//! - `driver`: enumerates the sweep and runs the passes in dependency order
//! - `resolver`: decides which energy points of a dataset group are usable
//! - `stage`: per-energy distribution fit, quality gate, graph accumulation
//! - `expression`: per-pass energy estimator
//! - `outcome`: soft outcomes and run counters

pub mod driver;
pub mod expression;
pub mod outcome;
pub mod resolver;
pub mod stage;

pub use driver::{GraphKeys, LEAKAGE_GRAPH, SweepDriver};
pub use expression::EnergyExpression;
pub use outcome::{PassReport, PointOutcome, SkipReason, SweepReport};
pub use resolver::{ResolvedEnergies, SkipCause, resolve_energies};
