//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - threaded through the sweep engine by value
//! - persisted inside artifact files
//! - reloaded later by `ereso show`

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::detector::SIGNAL_REGION_RADII_MM;

/// Generated transverse energies (GeV) simulated for every configuration.
pub const ENERGY_GRID: [u32; 10] = [5, 10, 20, 30, 40, 60, 80, 100, 150, 200];

/// Minimum number of events for an energy point to be usable, both when the
/// dataset is opened and after the distribution has been filtered.
pub const MIN_EVENTS: usize = 150;

/// True energy of a particle generated at transverse energy `pt` and pseudorapidity `eta`.
pub fn true_energy(pt: u32, eta: f64) -> f64 {
    f64::from(pt) * eta.cosh()
}

/// Pseudorapidity as the integer tenths used in file names (`2.0` -> `20`).
pub fn eta_x10(eta: f64) -> u32 {
    (eta * 10.0).round().max(0.0) as u32
}

/// Raw (uncalibrated) or corrected processing of the same configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationPass {
    Raw,
    Corrected,
}

impl CalibrationPass {
    pub fn is_raw(self) -> bool {
        self == CalibrationPass::Raw
    }

    /// Unit of the energy expression evaluated in this pass.
    pub fn unit(self) -> &'static str {
        match self {
            CalibrationPass::Raw => "MIPs",
            CalibrationPass::Corrected => "GeV",
        }
    }
}

impl fmt::Display for CalibrationPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationPass::Raw => f.write_str("raw"),
            CalibrationPass::Corrected => f.write_str("corrected"),
        }
    }
}

/// Simulation geometry version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Version {
    V60,
    V70,
}

impl Version {
    pub const ALL: [Version; 2] = [Version::V60, Version::V70];

    pub fn as_str(self) -> &'static str {
        match self {
            Version::V60 => "60",
            Version::V70 => "70",
        }
    }

    /// Number of sampling layers in the calorimeter for this geometry.
    pub fn layer_count(self) -> usize {
        match self {
            Version::V70 => 26,
            Version::V60 => 28,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Silicon sensor thickness (µm) of the simulated scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Thickness {
    Um100,
    Um200,
    Um300,
}

impl Thickness {
    pub const ALL: [Thickness; 3] = [Thickness::Um100, Thickness::Um200, Thickness::Um300];

    pub fn microns(self) -> u32 {
        match self {
            Thickness::Um100 => 100,
            Thickness::Um200 => 200,
            Thickness::Um300 => 300,
        }
    }

    /// Relative directory of the simulated scenario (`model2/gamma/200u`).
    pub fn scenario(self) -> String {
        format!("model2/gamma/{}u", self.microns())
    }
}

impl fmt::Display for Thickness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}u", self.microns())
    }
}

/// Index of a fixed-radius cluster window, 0 being the smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalRegion(usize);

impl SignalRegion {
    pub const COUNT: usize = SIGNAL_REGION_RADII_MM.len();

    pub fn new(index: usize) -> Option<Self> {
        (index < Self::COUNT).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn is_innermost(self) -> bool {
        self.0 == 0
    }

    pub fn radius_mm(self) -> f64 {
        SIGNAL_REGION_RADII_MM[self.0]
    }
}

impl fmt::Display for SignalRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SR{}", self.0)
    }
}

/// Configuration shared by every signal region and pass: one set of datasets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetGroup {
    pub intercalib: u32,
    pub version: Version,
    pub thickness: Thickness,
    pub eta: f64,
    pub pile_up: u32,
}

impl DatasetGroup {
    pub fn point(&self, signal_region: SignalRegion, pass: CalibrationPass) -> SweepPoint {
        SweepPoint {
            intercalib: self.intercalib,
            version: self.version,
            thickness: self.thickness,
            eta: self.eta,
            pile_up: self.pile_up,
            signal_region,
            pass,
        }
    }

    pub fn with_pile_up(&self, pile_up: u32) -> DatasetGroup {
        DatasetGroup { pile_up, ..*self }
    }

    pub fn eta_x10(&self) -> u32 {
        eta_x10(self.eta)
    }
}

impl fmt::Display for DatasetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IC{} v{} {} eta={:.1} pu={}",
            self.intercalib, self.version, self.thickness, self.eta, self.pile_up
        )
    }
}

/// One leaf of the sweep: a full detector configuration plus a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub intercalib: u32,
    pub version: Version,
    pub thickness: Thickness,
    pub eta: f64,
    pub pile_up: u32,
    pub signal_region: SignalRegion,
    pub pass: CalibrationPass,
}

impl SweepPoint {
    pub fn group(&self) -> DatasetGroup {
        DatasetGroup {
            intercalib: self.intercalib,
            version: self.version,
            thickness: self.thickness,
            eta: self.eta,
            pile_up: self.pile_up,
        }
    }

    pub fn eta_x10(&self) -> u32 {
        eta_x10(self.eta)
    }

    pub fn with_pass(&self, pass: CalibrationPass) -> SweepPoint {
        SweepPoint { pass, ..*self }
    }

    /// The raw-pass point without pile-up: the owner of the calibration used
    /// by every corrected pass of this configuration.
    pub fn calibration_source(&self) -> SweepPoint {
        SweepPoint {
            pile_up: 0,
            pass: CalibrationPass::Raw,
            ..*self
        }
    }
}

impl fmt::Display for SweepPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.group(), self.signal_region, self.pass)
    }
}

/// Estimate extracted from one energy distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub mean: f64,
    pub mean_err: f64,
    pub sigma: f64,
    pub sigma_err: f64,
    pub chi2: f64,
    pub ndf: u32,
}

impl FitResult {
    /// `chi2/ndf`; infinite when there are no degrees of freedom.
    pub fn chi2_ndf(&self) -> f64 {
        if self.ndf == 0 {
            f64::INFINITY
        } else {
            self.chi2 / f64::from(self.ndf)
        }
    }
}

/// Linear calibration `raw = offset + slope * E_true`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    pub slope: f64,
    pub slope_err: f64,
    pub offset: f64,
    pub offset_err: f64,
    pub chi2: f64,
    pub ndf: u32,
}

impl CalibrationModel {
    /// Convert a raw deposited energy to calibrated energy.
    pub fn apply(&self, raw: f64) -> f64 {
        (raw - self.offset) / self.slope
    }
}

/// Parametric resolution model: stochastic, constant and noise terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionModel {
    pub stochastic: f64,
    pub stochastic_err: f64,
    pub constant: f64,
    pub constant_err: f64,
    pub noise: f64,
    pub noise_err: f64,
    pub chi2: f64,
    pub ndf: u32,
}

/// Which stages are recomputed and how the corrected pass is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFlags {
    /// Run the raw pass and refit the calibration (pile-up free points only).
    pub redo_calib: bool,
    /// Refit the back-leakage correction instead of reading it back.
    pub redo_leak_cor: bool,
    /// Apply the back-leakage correction in the corrected pass.
    pub do_back_leak_cor: bool,
    /// Use the effective sigma instead of the Gaussian width.
    pub use_sigma_eff: bool,
    /// Resolution graph against true energy (otherwise against pT).
    pub vs_e: bool,
}

impl Default for StageFlags {
    fn default() -> Self {
        Self {
            redo_calib: true,
            redo_leak_cor: true,
            do_back_leak_cor: true,
            use_sigma_eff: true,
            vs_e: true,
        }
    }
}

/// Fully decoded configuration of a sweep run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub tag: String,
    /// Number of back layers summed for the leakage estimate.
    pub n_back: usize,
    pub intercalibs: Vec<u32>,
    pub versions: Vec<Version>,
    pub thicknesses: Vec<Thickness>,
    pub etas: Vec<f64>,
    pub pile_ups: Vec<u32>,
    pub signal_regions: Vec<SignalRegion>,
    /// Generated transverse energies to look for (normally [`ENERGY_GRID`]).
    pub energies: Vec<u32>,
    pub stages: StageFlags,
    pub base_dir: PathBuf,
    pub save_dir: PathBuf,
    pub plots: bool,
}

impl RunConfig {
    /// Root of all outputs of this run: `<save>/<tag>`.
    pub fn output_root(&self) -> PathBuf {
        self.save_dir.join(&self.tag)
    }
}
