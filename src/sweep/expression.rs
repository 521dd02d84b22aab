//! Per-pass energy estimator evaluated on every event.

use crate::data::{EnergyTree, ShowerEvent};
use crate::domain::{CalibrationModel, SignalRegion};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergyExpression {
    /// Deposited energy in MIPs.
    Raw,
    /// `(total - offset) / slope`, minus `leakage * back/total` when set.
    Calibrated {
        calibration: CalibrationModel,
        leakage: Option<f64>,
    },
}

impl EnergyExpression {
    pub fn evaluate(&self, tree: &EnergyTree, event: &ShowerEvent, sr: SignalRegion, n_back: usize) -> f64 {
        let total = tree.total_energy(event, sr);
        match self {
            EnergyExpression::Raw => total,
            EnergyExpression::Calibrated { calibration, leakage } => {
                let calibrated = calibration.apply(total);
                match leakage {
                    Some(k) if total != 0.0 => {
                        let back = tree.back_energy(event, sr, n_back);
                        calibrated - k * back / total
                    }
                    // No deposit: the back fraction is undefined.
                    Some(_) => f64::NAN,
                    None => calibrated,
                }
            }
        }
    }

    /// Evaluate over every event of `tree`.
    pub fn values(&self, tree: &EnergyTree, sr: SignalRegion, n_back: usize) -> Vec<f64> {
        tree.events
            .iter()
            .map(|ev| self.evaluate(tree, ev, sr, n_back))
            .collect()
    }

    /// Human-readable formula, e.g. for plot captions and logs.
    pub fn describe(&self) -> String {
        match self {
            EnergyExpression::Raw => "E_tot".to_string(),
            EnergyExpression::Calibrated { calibration, leakage } => {
                let mut s = format!("(E_tot - {:.3})/{:.3}", calibration.offset, calibration.slope);
                if let Some(k) = leakage {
                    s.push_str(&format!(" - {k:.3}*E_back/E_tot"));
                }
                s
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> EnergyTree {
        EnergyTree {
            layers: 4,
            events: vec![ShowerEvent {
                sr: vec![vec![30.0, 40.0, 20.0, 10.0]],
            }],
        }
    }

    fn calibration() -> CalibrationModel {
        CalibrationModel {
            slope: 2.0,
            slope_err: 0.0,
            offset: 10.0,
            offset_err: 0.0,
            chi2: 0.0,
            ndf: 0,
        }
    }

    #[test]
    fn raw_sums_all_layers() {
        let t = tree();
        let sr = SignalRegion::new(0).unwrap();
        assert_eq!(EnergyExpression::Raw.evaluate(&t, &t.events[0], sr, 2), 100.0);
    }

    #[test]
    fn calibrated_with_leakage() {
        let t = tree();
        let sr = SignalRegion::new(0).unwrap();
        let plain = EnergyExpression::Calibrated {
            calibration: calibration(),
            leakage: None,
        };
        assert_eq!(plain.evaluate(&t, &t.events[0], sr, 2), 45.0);

        // back/total = 30/100
        let leak = EnergyExpression::Calibrated {
            calibration: calibration(),
            leakage: Some(-10.0),
        };
        assert!((leak.evaluate(&t, &t.events[0], sr, 2) - 48.0).abs() < 1e-12);
        assert!(leak.describe().contains("E_back"));
    }

    #[test]
    fn empty_event_has_no_leakage_estimate() {
        let t = EnergyTree {
            layers: 2,
            events: vec![ShowerEvent {
                sr: vec![vec![0.0, 0.0]],
            }],
        };
        let sr = SignalRegion::new(0).unwrap();
        let leak = EnergyExpression::Calibrated {
            calibration: calibration(),
            leakage: Some(1.0),
        };
        assert!(leak.evaluate(&t, &t.events[0], sr, 1).is_nan());
    }
}
