//! Back-leakage correction.
//!
//! Showers starting late deposit a larger share of their energy in the last
//! layers and lose more of it out of the back. The calibrated energy is
//! regressed against the back fraction `back/total`:
//!
//! ```text
//! E_cal = a + k · back/total
//! ```
//!
//! The correction coefficient is `k`; the corrected pass evaluates
//! `E_cal - k · back/total`, which removes that dependence.

use nalgebra::{DMatrix, DVector};

use crate::data::EnergyTree;
use crate::domain::{CalibrationModel, SignalRegion};
use crate::fit::FitError;
use crate::io::artifact::Graph;
use crate::math::weighted_linear_fit;

const MIN_EVENTS: usize = 10;

/// Inputs of one leakage fit (one energy point).
#[derive(Debug, Clone, Copy)]
pub struct LeakageRequest<'a> {
    pub layers: usize,
    pub n_back: usize,
    pub signal_region: SignalRegion,
    pub pt: u32,
    pub eta_x10: u32,
    pub pile_up: u32,
    pub calibration: &'a CalibrationModel,
    pub tree: &'a EnergyTree,
}

/// Fit the coefficient for one energy point and append `(pT, k ± err)` to `graph`.
pub fn fit_back_leakage(request: &LeakageRequest<'_>, graph: &mut Graph) -> Result<f64, FitError> {
    if request.n_back == 0 {
        graph.push(f64::from(request.pt), 0.0, 0.0, 0.0);
        return Ok(0.0);
    }
    if request.n_back >= request.layers {
        return Err(FitError::new(format!(
            "{} back layers out of {} leave no front section",
            request.n_back, request.layers
        )));
    }

    let tree = request.tree;
    let samples: Vec<(f64, f64)> = tree
        .events
        .iter()
        .filter_map(|ev| {
            let total = tree.total_energy(ev, request.signal_region);
            if total <= 0.0 {
                return None;
            }
            let back = tree.back_energy(ev, request.signal_region, request.n_back);
            Some((back / total, request.calibration.apply(total)))
        })
        .filter(|(f, e)| f.is_finite() && e.is_finite())
        .collect();
    if samples.len() < MIN_EVENTS {
        return Err(FitError::new(format!("only {} usable events", samples.len())));
    }

    let n = samples.len();
    let mean_frac = samples.iter().map(|(f, _)| f).sum::<f64>() / n as f64;
    let spread = samples.iter().map(|(f, _)| (f - mean_frac).powi(2)).sum::<f64>();
    if spread <= 1e-12 {
        return Err(FitError::new("back fraction does not vary"));
    }

    let mut design = DMatrix::<f64>::zeros(n, 2);
    let mut y = DVector::<f64>::zeros(n);
    for (i, (f, e)) in samples.iter().enumerate() {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = f - mean_frac;
        y[i] = *e;
    }
    let fit = weighted_linear_fit(&design, &y, &DVector::from_element(n, 1.0))
        .ok_or_else(|| FitError::new("leakage fit is singular"))?;

    let coefficient = fit.params[1];
    // Unit weights: scale the covariance by the residual variance.
    let residual_var = if fit.ndf > 0 { fit.chi2 / fit.ndf as f64 } else { 0.0 };
    let err = (fit.covariance[(1, 1)] * residual_var).max(0.0).sqrt();
    if !coefficient.is_finite() {
        return Err(FitError::new("leakage coefficient diverged"));
    }

    graph.push(f64::from(request.pt), coefficient, 0.0, err);
    Ok(coefficient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ShowerEvent;

    fn identity() -> CalibrationModel {
        CalibrationModel {
            slope: 1.0,
            slope_err: 0.0,
            offset: 0.0,
            offset_err: 0.0,
            chi2: 0.0,
            ndf: 0,
        }
    }

    /// Events whose total drops by `k` per unit of back fraction.
    fn leaking_tree(k: f64) -> EnergyTree {
        let events = (0..50)
            .map(|i| {
                let frac = 0.02 + 0.004 * i as f64;
                let total = 100.0 + k * frac;
                let back = frac * total;
                let front = total - back;
                ShowerEvent {
                    sr: vec![vec![front / 2.0, front / 2.0, back]],
                }
            })
            .collect();
        EnergyTree { layers: 3, events }
    }

    fn request<'a>(tree: &'a EnergyTree, calib: &'a CalibrationModel, n_back: usize) -> LeakageRequest<'a> {
        LeakageRequest {
            layers: 3,
            n_back,
            signal_region: SignalRegion::new(0).unwrap(),
            pt: 60,
            eta_x10: 20,
            pile_up: 0,
            calibration: calib,
            tree,
        }
    }

    #[test]
    fn recovers_linear_leakage() {
        let tree = leaking_tree(-40.0);
        let calib = identity();
        let mut graph = Graph::default();
        let k = fit_back_leakage(&request(&tree, &calib, 1), &mut graph).unwrap();
        assert!((k + 40.0).abs() < 1e-6, "k = {k}");
        assert_eq!(graph.y_at(60.0), Some(k));
    }

    #[test]
    fn no_back_layers_means_no_correction() {
        let tree = leaking_tree(-40.0);
        let calib = identity();
        let mut graph = Graph::default();
        assert_eq!(fit_back_leakage(&request(&tree, &calib, 0), &mut graph).unwrap(), 0.0);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn constant_fraction_fails() {
        let events = (0..20)
            .map(|_| ShowerEvent {
                sr: vec![vec![45.0, 45.0, 10.0]],
            })
            .collect();
        let tree = EnergyTree { layers: 3, events };
        let calib = identity();
        assert!(fit_back_leakage(&request(&tree, &calib, 1), &mut Graph::default()).is_err());
    }
}
