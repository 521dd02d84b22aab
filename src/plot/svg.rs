//! SVG diagnostics drawn with Plotters.
//!
//! Every call builds its own drawing area and drops it before returning, so no
//! rendering state outlives one plot.

use std::error::Error;

use plotters::prelude::*;

use crate::plot::{EnergyPlot, GraphPlot, RenderError, Renderer, x_range};

const SIZE: (u32, u32) = (800, 600);

#[derive(Debug, Clone, Copy, Default)]
pub struct SvgRenderer;

impl Renderer for SvgRenderer {
    fn energy_point(&self, plot: &EnergyPlot<'_>) -> Result<(), RenderError> {
        draw_energy_point(plot).map_err(|e| RenderError(e.to_string()))
    }

    fn graph(&self, plot: &GraphPlot<'_>) -> Result<(), RenderError> {
        draw_graph(plot).map_err(|e| RenderError(e.to_string()))
    }
}

fn draw_energy_point(plot: &EnergyPlot<'_>) -> Result<(), Box<dyn Error>> {
    let hist = plot.histogram;
    let root = SVGBackend::new(plot.path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let y_max = hist.counts.iter().copied().fold(0.0f64, f64::max).max(1.0) * 1.2;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(hist.low..hist.high, 0.0..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(format!("E ({})", plot.unit))
        .y_desc("Events")
        .x_labels(6)
        .y_labels(6)
        .draw()?;

    let width = hist.bin_width();
    chart.draw_series((0..hist.bins()).map(|i| {
        let x0 = hist.low + i as f64 * width;
        Rectangle::new([(x0, 0.0), (x0 + width, hist.counts[i])], BLUE.mix(0.3).filled())
    }))?;

    // Gaussian with the fitted parameters, normalised to the histogram.
    let fit = plot.fit;
    if fit.sigma > 0.0 {
        let norm = hist.integral() * width / (fit.sigma * (2.0 * std::f64::consts::PI).sqrt());
        let curve = crate::plot::sample_curve(hist.low, hist.high, 200, |x| {
            norm * (-(x - fit.mean).powi(2) / (2.0 * fit.sigma * fit.sigma)).exp()
        });
        chart.draw_series(LineSeries::new(curve, RED.stroke_width(2)))?;
    }

    let font = ("sans-serif", 16).into_font();
    let lines = [
        format!("pT = {} GeV, PU = {}", plot.pt, plot.pile_up),
        format!("eta = {:.1}, r = {:.0} mm", plot.eta, plot.radius_mm),
        format!("mean = {:.3} ± {:.3}", fit.mean, fit.mean_err),
        format!("sigma = {:.3} ± {:.3}", fit.sigma, fit.sigma_err),
        format!("chi2/ndf = {:.1}/{}", fit.chi2, fit.ndf),
    ];
    for (i, line) in lines.iter().enumerate() {
        root.draw(&Text::new(line.as_str(), (520, 40 + 22 * i as i32), font.clone()))?;
    }

    root.present()?;
    Ok(())
}

fn draw_graph(plot: &GraphPlot<'_>) -> Result<(), Box<dyn Error>> {
    let root = SVGBackend::new(plot.path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (x0, x1) = x_range(plot.points).unwrap_or((0.0, 1.0));
    let x_pad = (x1 - x0) * 0.05;
    let (y0, y1) = y_bounds(plot);

    let mut chart = ChartBuilder::on(&root)
        .caption(&plot.title, ("sans-serif", 18))
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d((x0 - x_pad)..(x1 + x_pad), y0..y1)?;

    chart
        .configure_mesh()
        .x_desc(plot.x_label)
        .y_desc(plot.y_label)
        .x_labels(6)
        .y_labels(6)
        .draw()?;

    if !plot.curve.is_empty() {
        chart.draw_series(LineSeries::new(plot.curve.iter().copied(), RED.stroke_width(2)))?;
    }
    chart.draw_series(
        plot.points
            .iter()
            .map(|p| ErrorBar::new_vertical(p.x, p.y - p.ey, p.y, p.y + p.ey, BLACK.filled(), 6)),
    )?;
    chart.draw_series(
        plot.points
            .iter()
            .map(|p| Circle::new((p.x, p.y), 4, BLACK.filled())),
    )?;

    root.present()?;
    Ok(())
}

fn y_bounds(plot: &GraphPlot<'_>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for p in plot.points {
        lo = lo.min(p.y - p.ey);
        hi = hi.max(p.y + p.ey);
    }
    for &(_, y) in &plot.curve {
        lo = lo.min(y);
        hi = hi.max(y);
    }
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.1).max(1e-6);
    (lo - pad, hi + pad)
}
