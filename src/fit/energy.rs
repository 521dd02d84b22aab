//! Single-distribution fit: Gaussian core plus optional effective sigma.
//!
//! The core fit is a log-parabola least squares on the histogram bins:
//!
//! ```text
//! ln(n_i) = a + b (x_i - m0) + c (x_i - m0)^2,   weight n_i
//! μ = m0 - b / 2c,   σ = sqrt(-1 / 2c)
//! ```
//!
//! restricted to `μ ± 2σ` and refined a couple of times so the window follows
//! the peak rather than the (possibly skewed) tails.

use nalgebra::{DMatrix, DVector};

use crate::domain::FitResult;
use crate::fit::FitError;
use crate::math::{Histogram, weighted_linear_fit};

/// Fraction of entries defining the effective sigma.
pub const EFFECTIVE_FRACTION: f64 = 0.6827;

/// Half-width (in σ) of the core fit window.
const CORE_WINDOW_SIGMAS: f64 = 2.0;
const REFINEMENTS: usize = 2;
const MIN_CORE_BINS: usize = 4;

/// Fit the Gaussian core of `hist`.
pub fn fit_gaussian_core(hist: &Histogram) -> Result<FitResult, FitError> {
    let (mut mean, mut sigma) = match (hist.mean(), hist.rms()) {
        (Some(m), Some(s)) if s > 0.0 => (m, s),
        _ => return Err(FitError::new("histogram has no spread to fit")),
    };

    let mut result = None;
    for _ in 0..=REFINEMENTS {
        let fit = fit_window(hist, mean, sigma)?;
        mean = fit.mean;
        sigma = fit.sigma;
        result = Some(fit);
    }
    result.ok_or_else(|| FitError::new("no fit iteration ran"))
}

/// Gaussian core fit, with the width replaced by the effective sigma when asked.
pub fn fit_distribution(hist: &Histogram, use_effective_sigma: bool) -> Result<FitResult, FitError> {
    let mut fit = fit_gaussian_core(hist)?;
    if use_effective_sigma {
        let sigma = hist
            .effective_sigma(EFFECTIVE_FRACTION)
            .filter(|s| *s > 0.0)
            .ok_or_else(|| FitError::new("effective sigma undefined"))?;
        fit.sigma = sigma;
        fit.sigma_err = sigma / (2.0 * hist.integral()).sqrt();
    }
    Ok(fit)
}

fn fit_window(hist: &Histogram, mean: f64, sigma: f64) -> Result<FitResult, FitError> {
    let lo = mean - CORE_WINDOW_SIGMAS * sigma;
    let hi = mean + CORE_WINDOW_SIGMAS * sigma;

    let bins: Vec<(f64, f64)> = (0..hist.bins())
        .map(|i| (hist.bin_center(i), hist.counts[i]))
        .filter(|&(x, n)| x >= lo && x <= hi && n > 0.0)
        .collect();
    if bins.len() < MIN_CORE_BINS {
        return Err(FitError::new(format!(
            "only {} populated bins in the core window",
            bins.len()
        )));
    }

    // Centre on the seed mean for conditioning.
    let mut design = DMatrix::<f64>::zeros(bins.len(), 3);
    let mut y = DVector::<f64>::zeros(bins.len());
    let mut w = DVector::<f64>::zeros(bins.len());
    for (i, &(x, n)) in bins.iter().enumerate() {
        let u = x - mean;
        design[(i, 0)] = 1.0;
        design[(i, 1)] = u;
        design[(i, 2)] = u * u;
        y[i] = n.ln();
        w[i] = n;
    }

    let fit = weighted_linear_fit(&design, &y, &w)
        .ok_or_else(|| FitError::new("core fit is singular"))?;
    let (a, b, c) = (fit.params[0], fit.params[1], fit.params[2]);
    if !(c < 0.0) {
        return Err(FitError::new("core is not peaked"));
    }

    let mu = mean - b / (2.0 * c);
    let width = (-1.0 / (2.0 * c)).sqrt();
    if width > hist.high - hist.low {
        return Err(FitError::new("core is not peaked"));
    }
    let amplitude = (a - b * b / (4.0 * c)).exp();

    // Gradients of μ and σ with respect to (a, b, c).
    let grad_mu = [0.0, -1.0 / (2.0 * c), b / (2.0 * c * c)];
    let grad_sigma = [0.0, 0.0, (-2.0 * c).powf(-1.5)];
    let propagate = |g: &[f64; 3]| -> f64 {
        let mut var = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                var += g[i] * fit.covariance[(i, j)] * g[j];
            }
        }
        var.max(0.0).sqrt()
    };

    let mut chi2 = 0.0;
    for &(x, n) in &bins {
        let expected = amplitude * (-(x - mu).powi(2) / (2.0 * width * width)).exp();
        chi2 += (n - expected).powi(2) / n.max(1.0);
    }

    if !(mu.is_finite() && width.is_finite() && chi2.is_finite()) {
        return Err(FitError::new("core fit diverged"));
    }

    Ok(FitResult {
        mean: mu,
        mean_err: propagate(&grad_mu),
        sigma: width,
        sigma_err: propagate(&grad_sigma),
        chi2,
        ndf: (bins.len() - 3) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Histogram whose bin contents follow an exact Gaussian at the bin centres.
    fn gaussian_hist(mu: f64, sigma: f64, amplitude: f64) -> Histogram {
        let mut h = Histogram::new(40, mu - 6.0 * sigma, mu + 6.0 * sigma);
        for i in 0..h.bins() {
            let x = h.bin_center(i);
            h.counts[i] = amplitude * (-(x - mu).powi(2) / (2.0 * sigma * sigma)).exp();
        }
        h.entries = h.integral().round() as u64;
        h
    }

    #[test]
    fn recovers_exact_gaussian() {
        let h = gaussian_hist(812.0, 25.0, 400.0);
        let fit = fit_gaussian_core(&h).unwrap();
        assert!((fit.mean - 812.0).abs() < 1e-6, "mean {}", fit.mean);
        assert!((fit.sigma - 25.0).abs() < 1e-6, "sigma {}", fit.sigma);
        assert!(fit.chi2 < 1e-6);
        assert!(fit.ndf >= 1);
        assert!(fit.mean_err > 0.0 && fit.sigma_err > 0.0);
    }

    #[test]
    fn effective_sigma_replaces_width() {
        let h = gaussian_hist(100.0, 5.0, 300.0);
        let fit = fit_distribution(&h, true).unwrap();
        // Binned estimate of a Gaussian's 68.27% half-width.
        assert!((fit.sigma - 5.0).abs() < 0.5, "sigma_eff {}", fit.sigma);
        let expected_err = fit.sigma / (2.0 * h.integral()).sqrt();
        assert!((fit.sigma_err - expected_err).abs() < 1e-12);
    }

    #[test]
    fn flat_histogram_is_not_a_peak() {
        let mut h = Histogram::new(40, 0.0, 40.0);
        for i in 0..40 {
            h.counts[i] = 10.0;
        }
        assert!(fit_gaussian_core(&h).is_err());
    }

    #[test]
    fn empty_histogram_fails() {
        let h = Histogram::new(40, 0.0, 1.0);
        assert!(fit_distribution(&h, false).is_err());
    }
}
