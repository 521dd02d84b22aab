//! Pile-up noise extraction.
//!
//! Pile-up adds energy that does not scale with the shower; its spread is the
//! extra variance of the total energy compared with the pile-up free sample of
//! the same energy point, converted to GeV with the calibration slope.

use crate::data::EnergyTree;
use crate::domain::{CalibrationModel, SignalRegion, Version};
use crate::fit::FitError;
use crate::math::moments;

/// Inputs of one pile-up noise extraction.
#[derive(Debug, Clone, Copy)]
pub struct PileUpRequest<'a> {
    pub pile_up: u32,
    pub version: Version,
    pub eta: f64,
    pub zero_pu_tree: &'a EnergyTree,
    pub pu_tree: &'a EnergyTree,
    pub calibration: &'a CalibrationModel,
}

/// Noise (GeV) per signal region, indexed by signal-region index.
pub fn extract_noise(request: &PileUpRequest<'_>) -> Result<Vec<f64>, FitError> {
    let slope = request.calibration.slope;
    if !(slope.is_finite() && slope > 0.0) {
        return Err(FitError::new(format!("calibration slope {slope} cannot convert MIPs")));
    }

    (0..SignalRegion::COUNT)
        .filter_map(SignalRegion::new)
        .map(|sr| {
            let (_, rms_0) = spread(request.zero_pu_tree, sr)?;
            let (_, rms_pu) = spread(request.pu_tree, sr)?;
            let extra = (rms_pu * rms_pu - rms_0 * rms_0).max(0.0);
            Ok(extra.sqrt() / slope)
        })
        .collect()
}

fn spread(tree: &EnergyTree, sr: SignalRegion) -> Result<(f64, f64), FitError> {
    if tree.entries() < 2 {
        return Err(FitError::new(format!("{} events cannot give a spread", tree.entries())));
    }
    moments(&tree.totals(sr)).ok_or_else(|| FitError::new(format!("no finite total energy in {sr}")))
}
