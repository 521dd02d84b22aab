//! Reporting utilities: per-pass summary rows and formatted terminal output.

pub mod format;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sweep::{PassReport, SweepReport};

pub use format::*;

/// One line of the run summary: the fitted models of one (sweep point, pass).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub run_at: String,
    pub intercalib: u32,
    pub version: String,
    pub thickness_um: u32,
    pub eta: f64,
    pub pile_up: u32,
    pub signal_region: usize,
    pub pass: String,
    pub accepted: usize,
    pub skipped: usize,
    pub slope: f64,
    pub slope_err: f64,
    pub offset: f64,
    pub offset_err: f64,
    pub calibration_reused: bool,
    pub stochastic: f64,
    pub stochastic_err: f64,
    pub constant: f64,
    pub constant_err: f64,
    pub noise: f64,
    pub noise_err: f64,
    pub artifact: String,
}

impl SummaryRow {
    pub fn from_pass(pass: &PassReport, run_at: &DateTime<Utc>) -> Self {
        let p = &pass.point;
        let c = &pass.calibration;
        let r = &pass.resolution;
        SummaryRow {
            run_at: run_at.to_rfc3339(),
            intercalib: p.intercalib,
            version: p.version.as_str().to_string(),
            thickness_um: p.thickness.microns(),
            eta: p.eta,
            pile_up: p.pile_up,
            signal_region: p.signal_region.index(),
            pass: p.pass.to_string(),
            accepted: pass.accepted.len(),
            skipped: pass.skipped.len(),
            slope: c.slope,
            slope_err: c.slope_err,
            offset: c.offset,
            offset_err: c.offset_err,
            calibration_reused: pass.calibration_reused,
            stochastic: r.stochastic,
            stochastic_err: r.stochastic_err,
            constant: r.constant,
            constant_err: r.constant_err,
            noise: r.noise,
            noise_err: r.noise_err,
            artifact: pass.artifact.display().to_string(),
        }
    }
}

pub fn summary_rows(report: &SweepReport, run_at: &DateTime<Utc>) -> Vec<SummaryRow> {
    report.passes.iter().map(|p| SummaryRow::from_pass(p, run_at)).collect()
}
