//! Weighted least squares solver.
//!
//! Every fit in this project is linear in its parameters once the problem is
//! written in the right variables:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! - calibration: `y = offset + slope * E`
//! - resolution: `(σ/E)^2 = S^2 / E + C^2 + N^2 / E^2`
//! - Gaussian core: `ln(n_i) = a + b x + c x^2`
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` and solve an ordinary least squares problem.
//! - We use SVD to solve the least-squares problem robustly even when the
//!   design matrix is tall (more rows than columns).
//! - Parameter uncertainties come from `(X^T W X)^{-1}`.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solution of a weighted linear fit.
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub params: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub chi2: f64,
    pub ndf: usize,
}

impl LinearFit {
    /// One-sigma uncertainty of parameter `i`.
    pub fn error(&self, i: usize) -> f64 {
        self.covariance[(i, i)].max(0.0).sqrt()
    }
}

/// Weighted linear fit of `y ≈ X β` with per-row weights (typically `1/σ_i^2`).
///
/// Returns `None` when there are fewer rows than parameters, a weight is not
/// strictly positive, or the normal matrix cannot be inverted.
pub fn weighted_linear_fit(
    design: &DMatrix<f64>,
    y: &DVector<f64>,
    weights: &DVector<f64>,
) -> Option<LinearFit> {
    let n = design.nrows();
    let p = design.ncols();
    if n < p || y.len() != n || weights.len() != n {
        return None;
    }
    if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
        return None;
    }

    let mut xw = design.clone();
    let mut yw = y.clone();
    for i in 0..n {
        let sw = weights[i].sqrt();
        for j in 0..p {
            xw[(i, j)] *= sw;
        }
        yw[i] *= sw;
    }

    let params = solve_least_squares(&xw, &yw)?;
    let covariance = (xw.transpose() * &xw).try_inverse()?;

    let residual = y - design * &params;
    let chi2: f64 = residual
        .iter()
        .zip(weights.iter())
        .map(|(r, w)| w * r * r)
        .sum();
    if !chi2.is_finite() {
        return None;
    }

    Some(LinearFit {
        params,
        covariance,
        chi2,
        ndf: n - p,
    })
}
