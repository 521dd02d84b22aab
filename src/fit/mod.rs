//! Fit collaborators used by the sweep engine.
//!
//! Responsibilities:
//!
//! - fit one energy distribution (Gaussian core, optional effective sigma)
//! - fit the per-energy back-leakage correction
//! - fit the linear calibration and the resolution model of a pass
//! - extract the pile-up noise of a configuration
//!
//! The engine only talks to [`FitBackend`]; [`StandardFits`] is the default.

pub mod calibration;
pub mod energy;
pub mod leakage;
pub mod pileup;
pub mod resolution;

use thiserror::Error;

use crate::domain::{CalibrationModel, CalibrationPass, FitResult, ResolutionModel, SignalRegion};
use crate::io::artifact::Graph;
use crate::math::Histogram;

pub use leakage::LeakageRequest;
pub use pileup::PileUpRequest;

/// A fit that did not converge or produced unusable parameters.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct FitError(String);

impl FitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Context of a resolution-model fit.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest {
    pub pass: CalibrationPass,
    pub leakage: bool,
    /// Noise term (GeV) for pile-up free fits, or the extracted pile-up noise.
    pub noise_reference: f64,
    /// Pile-up free result of the same signal region and pass, for pile-up fits.
    pub zero_pu_reference: Option<ResolutionModel>,
    pub vs_e: bool,
}

pub trait FitBackend {
    fn fit_single_distribution(
        &self,
        histogram: &Histogram,
        signal_region: SignalRegion,
        use_effective_sigma: bool,
    ) -> Result<FitResult, FitError>;

    /// Returns the coefficient and appends it to `graph`.
    fn fit_leakage_correction(&self, request: &LeakageRequest<'_>, graph: &mut Graph) -> Result<f64, FitError>;

    /// Fills `delta` with the relative calibration residuals.
    fn fit_calibration(
        &self,
        graph: &Graph,
        pass: CalibrationPass,
        leakage: bool,
        delta: &mut Graph,
    ) -> Result<CalibrationModel, FitError>;

    fn fit_resolution_model(&self, graph: &Graph, request: &ResolutionRequest) -> Result<ResolutionModel, FitError>;

    /// Noise (GeV) per signal region.
    fn extract_pile_up_noise(&self, request: &PileUpRequest<'_>) -> Result<Vec<f64>, FitError>;

    /// Resolution predicted by `model` at `x`, used to draw the fitted curve.
    fn evaluate_resolution(&self, model: &ResolutionModel, x: f64) -> f64;
}

/// Default fit implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFits;

impl FitBackend for StandardFits {
    fn fit_single_distribution(
        &self,
        histogram: &Histogram,
        _signal_region: SignalRegion,
        use_effective_sigma: bool,
    ) -> Result<FitResult, FitError> {
        energy::fit_distribution(histogram, use_effective_sigma)
    }

    fn fit_leakage_correction(&self, request: &LeakageRequest<'_>, graph: &mut Graph) -> Result<f64, FitError> {
        leakage::fit_back_leakage(request, graph)
    }

    fn fit_calibration(
        &self,
        graph: &Graph,
        _pass: CalibrationPass,
        _leakage: bool,
        delta: &mut Graph,
    ) -> Result<CalibrationModel, FitError> {
        calibration::fit_linear_calibration(graph, delta)
    }

    fn fit_resolution_model(&self, graph: &Graph, request: &ResolutionRequest) -> Result<ResolutionModel, FitError> {
        resolution::fit_resolution(graph, request.noise_reference, request.zero_pu_reference.as_ref())
    }

    fn extract_pile_up_noise(&self, request: &PileUpRequest<'_>) -> Result<Vec<f64>, FitError> {
        pileup::extract_noise(request)
    }

    fn evaluate_resolution(&self, model: &ResolutionModel, x: f64) -> f64 {
        resolution::evaluate(model, x)
    }
}
