//! Domain types used throughout the sweep.
//!
//! This module defines:
//!
//! - configuration dimensions (`Version`, `Thickness`, `SignalRegion`, `CalibrationPass`)
//! - sweep identities (`DatasetGroup`, `SweepPoint`)
//! - fit outputs (`FitResult`, `CalibrationModel`, `ResolutionModel`)
//! - fixed detector tables (`detector`)

pub mod detector;
pub mod types;

pub use detector::*;
pub use types::*;
