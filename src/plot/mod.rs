//! Diagnostic rendering.
//!
//! - per-energy distributions and the pass graphs go through [`Renderer`]
//!   (SVG files by default, nothing at all for `--no-plots` and tests)
//! - `ereso show` draws graphs in the terminal (`ascii`)

pub mod ascii;
pub mod svg;

use std::path::Path;

use thiserror::Error;

use crate::domain::FitResult;
use crate::io::artifact::GraphPoint;
use crate::math::Histogram;

pub use ascii::render_graph_ascii;
pub use svg::SvgRenderer;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Fitted distribution of one energy point.
#[derive(Debug, Clone, Copy)]
pub struct EnergyPlot<'a> {
    pub path: &'a Path,
    pub histogram: &'a Histogram,
    pub fit: &'a FitResult,
    pub pt: u32,
    pub pile_up: u32,
    pub eta: f64,
    pub radius_mm: f64,
    pub unit: &'static str,
}

/// A graph with an optional fitted curve.
#[derive(Debug, Clone)]
pub struct GraphPlot<'a> {
    pub path: &'a Path,
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub points: &'a [GraphPoint],
    pub curve: Vec<(f64, f64)>,
}

pub trait Renderer {
    fn energy_point(&self, plot: &EnergyPlot<'_>) -> Result<(), RenderError>;

    fn graph(&self, plot: &GraphPlot<'_>) -> Result<(), RenderError>;

    /// False when nothing is drawn, so callers can skip preparing plots.
    fn enabled(&self) -> bool {
        true
    }
}

/// Draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn energy_point(&self, _plot: &EnergyPlot<'_>) -> Result<(), RenderError> {
        Ok(())
    }

    fn graph(&self, _plot: &GraphPlot<'_>) -> Result<(), RenderError> {
        Ok(())
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// `n` evenly spaced samples of `f` over `[x_min, x_max]`.
pub fn sample_curve(x_min: f64, x_max: f64, n: usize, f: impl Fn(f64) -> f64) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let x = x_min + u * (x_max - x_min);
            (x, f(x))
        })
        .filter(|(_, y)| y.is_finite())
        .collect()
}

/// Smallest and largest `x` of a point set.
pub fn x_range(points: &[GraphPoint]) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for p in points {
        lo = lo.min(p.x - p.ex);
        hi = hi.max(p.x + p.ex);
    }
    (lo.is_finite() && hi.is_finite() && hi > lo).then_some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_curve_spans_the_range() {
        let c = sample_curve(1.0, 3.0, 3, |x| 2.0 * x);
        assert_eq!(c, vec![(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)]);
    }

    #[test]
    fn single_point_has_no_range() {
        let p = [GraphPoint {
            x: 5.0,
            y: 1.0,
            ex: 0.0,
            ey: 0.0,
        }];
        assert!(x_range(&p).is_none());
    }
}
