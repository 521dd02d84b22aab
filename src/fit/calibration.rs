//! Linear calibration fit: `reco = offset + slope * E_true`.

use nalgebra::{DMatrix, DVector};

use crate::domain::CalibrationModel;
use crate::fit::FitError;
use crate::io::artifact::Graph;
use crate::math::weighted_linear_fit;

/// Fit the calibration graph and fill `delta` with the relative residuals
/// `((y - offset)/slope - x) / x` of every point.
pub fn fit_linear_calibration(graph: &Graph, delta: &mut Graph) -> Result<CalibrationModel, FitError> {
    let points: Vec<_> = graph
        .points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite() && p.x > 0.0)
        .collect();
    if points.len() < 2 {
        return Err(FitError::new(format!(
            "need at least 2 calibration points, have {}",
            points.len()
        )));
    }

    let n = points.len();
    let mut design = DMatrix::<f64>::zeros(n, 2);
    let mut y = DVector::<f64>::zeros(n);
    for (i, p) in points.iter().enumerate() {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = p.x;
        y[i] = p.y;
    }
    // Error-weighted when every point carries an error, unweighted otherwise.
    let weighted = points.iter().all(|p| p.ey.is_finite() && p.ey > 0.0);
    let weights = if weighted {
        DVector::from_iterator(n, points.iter().map(|p| 1.0 / (p.ey * p.ey)))
    } else {
        DVector::from_element(n, 1.0)
    };

    let fit = weighted_linear_fit(&design, &y, &weights)
        .ok_or_else(|| FitError::new("calibration fit is singular"))?;
    let model = CalibrationModel {
        offset: fit.params[0],
        offset_err: fit.error(0),
        slope: fit.params[1],
        slope_err: fit.error(1),
        chi2: fit.chi2,
        ndf: fit.ndf as u32,
    };
    if !(model.slope.is_finite() && model.slope > 0.0) {
        return Err(FitError::new(format!("non-physical slope {}", model.slope)));
    }

    delta.points.clear();
    for p in &points {
        let calibrated = model.apply(p.y);
        delta.push(p.x, (calibrated - p.x) / p.x, 0.0, p.ey / model.slope / p.x);
    }

    Ok(model)
}
