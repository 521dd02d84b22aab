//! Soft outcomes of the sweep and the counters reported at the end of a run.
//!
//! Fatal failures are [`StageError`](crate::error::StageError)s; everything
//! here is recoverable and only excludes one energy point from a pass.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::domain::{CalibrationModel, FitResult, ResolutionModel, SweepPoint};
use crate::sweep::resolver::SkipCause;

/// Why an energy point did not contribute to the graphs of a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientStatistics { entries: usize },
    FitFailed(String),
    QualityRejected { chi2_ndf: f64, threshold: f64 },
}

impl SkipReason {
    /// Stable label used as a counter key.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::InsufficientStatistics { .. } => "insufficient-statistics",
            SkipReason::FitFailed(_) => "fit-failed",
            SkipReason::QualityRejected { .. } => "quality-rejected",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientStatistics { entries } => {
                write!(f, "only {entries} entries after filtering")
            }
            SkipReason::FitFailed(reason) => write!(f, "fit failed: {reason}"),
            SkipReason::QualityRejected { chi2_ndf, threshold } => {
                write!(f, "chi2/ndf {chi2_ndf:.2} above {threshold}")
            }
        }
    }
}

/// An energy point that entered both graphs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedPoint {
    pub pt: u32,
    pub true_energy: f64,
    pub fit: FitResult,
    pub resolution: f64,
    pub resolution_err: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    Accepted(AcceptedPoint),
    Skipped(SkipReason),
}

/// A soft skip inside a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipRecord {
    pub pt: u32,
    pub reason: SkipReason,
}

/// A dataset left out by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSkip {
    pub group: String,
    pub pt: u32,
    pub path: PathBuf,
    pub cause: SkipCause,
}

/// Result of one (sweep point, pass).
#[derive(Debug, Clone)]
pub struct PassReport {
    pub point: SweepPoint,
    /// Linear fit of this pass: the calibration for the raw pass, the
    /// linearity check for the corrected pass.
    pub calibration: CalibrationModel,
    /// Calibration applied to the energies (corrected pass only).
    pub applied_calibration: Option<CalibrationModel>,
    /// The applied calibration was read back from a raw artifact file.
    pub calibration_reused: bool,
    pub resolution: ResolutionModel,
    pub accepted: Vec<AcceptedPoint>,
    pub skipped: Vec<SkipRecord>,
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub passes: Vec<PassReport>,
    pub dataset_skips: Vec<DatasetSkip>,
}

impl SweepReport {
    pub fn accepted_points(&self) -> usize {
        self.passes.iter().map(|p| p.accepted.len()).sum()
    }

    /// Soft skips inside passes, by reason label.
    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in self.passes.iter().flat_map(|p| &p.skipped) {
            *counts.entry(record.reason.label()).or_insert(0) += 1;
        }
        counts
    }

    /// Datasets left out by the resolver, by cause.
    pub fn dataset_skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for skip in &self.dataset_skips {
            *counts.entry(skip.cause.label()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_counts_group_by_reason() {
        let point = crate::domain::DatasetGroup {
            intercalib: 1,
            version: crate::domain::Version::V60,
            thickness: crate::domain::Thickness::Um200,
            eta: 2.0,
            pile_up: 0,
        }
        .point(
            crate::domain::SignalRegion::new(1).unwrap(),
            crate::domain::CalibrationPass::Raw,
        );
        let calibration = CalibrationModel {
            slope: 1.0,
            slope_err: 0.0,
            offset: 0.0,
            offset_err: 0.0,
            chi2: 0.0,
            ndf: 1,
        };
        let resolution = ResolutionModel {
            stochastic: 0.2,
            stochastic_err: 0.0,
            constant: 0.01,
            constant_err: 0.0,
            noise: 0.0,
            noise_err: 0.0,
            chi2: 0.0,
            ndf: 1,
        };
        let report = SweepReport {
            passes: vec![PassReport {
                point,
                calibration,
                applied_calibration: None,
                calibration_reused: false,
                resolution,
                accepted: vec![],
                skipped: vec![
                    SkipRecord {
                        pt: 5,
                        reason: SkipReason::InsufficientStatistics { entries: 12 },
                    },
                    SkipRecord {
                        pt: 150,
                        reason: SkipReason::QualityRejected {
                            chi2_ndf: 31.0,
                            threshold: 30.0,
                        },
                    },
                    SkipRecord {
                        pt: 200,
                        reason: SkipReason::QualityRejected {
                            chi2_ndf: 44.0,
                            threshold: 30.0,
                        },
                    },
                ],
                artifact: PathBuf::from("x.json"),
            }],
            dataset_skips: vec![],
        };

        let counts = report.skip_counts();
        assert_eq!(counts.get("quality-rejected"), Some(&2));
        assert_eq!(counts.get("insufficient-statistics"), Some(&1));
        assert_eq!(report.accepted_points(), 0);
    }

    #[test]
    fn quality_rejection_message_names_threshold() {
        let reason = SkipReason::QualityRejected {
            chi2_ndf: 50.1,
            threshold: 50.0,
        };
        assert_eq!(reason.to_string(), "chi2/ndf 50.10 above 50");
    }
}
