//! Resolution-model fit.
//!
//! The default model is the usual calorimeter quadrature sum, linear in the
//! squared terms:
//!
//! ```text
//! (σ/E)^2 = S^2 / x + C^2 + N^2 / x^2
//! ```
//!
//! - without pile-up, `N` is fixed to the noise reference and `S`, `C` are fitted
//! - with pile-up, `S` and `C` are fixed to the pile-up free result and `N` is fitted

use nalgebra::{DMatrix, DVector};

use crate::domain::ResolutionModel;
use crate::fit::FitError;
use crate::io::artifact::Graph;
use crate::math::weighted_linear_fit;

/// `σ/E` predicted by the model at `x`.
pub fn evaluate(model: &ResolutionModel, x: f64) -> f64 {
    if x <= 0.0 {
        return f64::NAN;
    }
    (model.stochastic.powi(2) / x + model.constant.powi(2) + model.noise.powi(2) / (x * x)).sqrt()
}

/// Fit the resolution graph.
pub fn fit_resolution(
    graph: &Graph,
    noise_reference: f64,
    zero_pu_reference: Option<&ResolutionModel>,
) -> Result<ResolutionModel, FitError> {
    let points: Vec<_> = graph
        .points
        .iter()
        .filter(|p| p.x > 0.0 && p.y.is_finite() && p.y >= 0.0)
        .collect();
    let n = points.len();

    // Errors on y^2 are 2 y ey.
    let weighted = points.iter().all(|p| p.ey > 0.0 && p.y > 0.0);
    let weights = if weighted {
        DVector::from_iterator(n, points.iter().map(|p| 1.0 / (2.0 * p.y * p.ey).powi(2)))
    } else {
        DVector::from_element(n, 1.0)
    };

    match zero_pu_reference {
        None => {
            if n < 2 {
                return Err(FitError::new(format!("need at least 2 resolution points, have {n}")));
            }
            let mut design = DMatrix::<f64>::zeros(n, 2);
            let mut z = DVector::<f64>::zeros(n);
            for (i, p) in points.iter().enumerate() {
                design[(i, 0)] = 1.0 / p.x;
                design[(i, 1)] = 1.0;
                z[i] = p.y * p.y - noise_reference.powi(2) / (p.x * p.x);
            }
            let fit = weighted_linear_fit(&design, &z, &weights)
                .ok_or_else(|| FitError::new("resolution fit is singular"))?;
            let (stochastic, stochastic_err) = root_of_square(fit.params[0], fit.error(0));
            let (constant, constant_err) = root_of_square(fit.params[1], fit.error(1));
            Ok(ResolutionModel {
                stochastic,
                stochastic_err,
                constant,
                constant_err,
                noise: noise_reference,
                noise_err: 0.0,
                chi2: fit.chi2,
                ndf: fit.ndf as u32,
            })
        }
        Some(reference) => {
            if n < 1 {
                return Err(FitError::new("no resolution point to fit the noise term"));
            }
            let mut design = DMatrix::<f64>::zeros(n, 1);
            let mut z = DVector::<f64>::zeros(n);
            for (i, p) in points.iter().enumerate() {
                design[(i, 0)] = 1.0 / (p.x * p.x);
                z[i] = p.y * p.y - reference.stochastic.powi(2) / p.x - reference.constant.powi(2);
            }
            let fit = weighted_linear_fit(&design, &z, &weights)
                .ok_or_else(|| FitError::new("noise fit is singular"))?;
            let (noise, noise_err) = root_of_square(fit.params[0], fit.error(0));
            Ok(ResolutionModel {
                stochastic: reference.stochastic,
                stochastic_err: reference.stochastic_err,
                constant: reference.constant,
                constant_err: reference.constant_err,
                noise,
                noise_err,
                chi2: fit.chi2,
                ndf: fit.ndf as u32,
            })
        }
    }
}

/// `(sqrt(v), err)` for a fitted square `v ± e`, clamped at zero.
fn root_of_square(value: f64, err: f64) -> (f64, f64) {
    if value > 0.0 {
        let root = value.sqrt();
        (root, err / (2.0 * root))
    } else {
        (0.0, err.sqrt())
    }
}
