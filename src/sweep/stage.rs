//! Per-energy fit stage: build the distribution, fit it, gate it, and feed
//! the calibration and resolution graphs of the pass.

use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{FitResult, MIN_EVENTS, SignalRegion, StageFlags, SweepPoint, true_energy};
use crate::error::StageError;
use crate::fit::FitBackend;
use crate::io::artifact::{Artifact, ArtifactStore, Graph};
use crate::io::paths;
use crate::math::{Histogram, moments};
use crate::plot::{EnergyPlot, Renderer};
use crate::sweep::expression::EnergyExpression;
use crate::sweep::outcome::{AcceptedPoint, PointOutcome, SkipReason};
use crate::sweep::resolver::ValidEnergy;

/// Bins of the energy distribution.
pub const DISTRIBUTION_BINS: usize = 40;
/// Half-width of the distribution range, in RMS.
pub const RANGE_RMS: f64 = 6.0;
/// Outside the innermost signal region, corrected energies below this
/// fraction of the true energy are dropped.
pub const MIN_ENERGY_FRACTION: f64 = 0.7;

const CHI2_NDF_BINS: usize = 500;
const CHI2_NDF_MAX: f64 = 50.0;

pub fn chi2_ndf_threshold(sr: SignalRegion) -> f64 {
    if sr.is_innermost() { 50.0 } else { 30.0 }
}

/// A fit without degrees of freedom never passes.
pub fn passes_quality_gate(fit: &FitResult, sr: SignalRegion) -> bool {
    fit.ndf > 0 && fit.chi2_ndf() <= chi2_ndf_threshold(sr)
}

/// Relative resolution and its error.
///
/// Without pile-up the width is taken relative to the fitted mean; with
/// pile-up the mean is biased, so the true energy is used instead.
pub fn resolution_of(fit: &FitResult, true_energy: f64, pile_up: u32) -> (f64, f64) {
    let reference = if pile_up > 0 { true_energy } else { fit.mean };
    let reso = (fit.sigma / reference).abs();
    let rel_sigma = if fit.sigma != 0.0 { fit.sigma_err / fit.sigma } else { 0.0 };
    let rel_mean = if fit.mean != 0.0 { fit.mean_err / fit.mean } else { 0.0 };
    (reso, reso * (rel_sigma * rel_sigma + rel_mean * rel_mean).sqrt())
}

pub fn distribution_key(pt: u32, sr: SignalRegion) -> String {
    format!("energy{pt}_SR{}", sr.index())
}

pub fn chi2_ndf_key(pt: u32, sr: SignalRegion) -> String {
    format!("p_chi2ndf_E_{pt}_SR{}", sr.index())
}

/// Graphs accumulated over the energy loop of one pass.
#[derive(Debug, Clone, Default)]
pub struct PassGraphs {
    pub calibration: Graph,
    pub resolution: Graph,
}

/// Everything a pass shares across its energy points.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub point: SweepPoint,
    pub flags: &'a StageFlags,
    pub n_back: usize,
    pub output_root: &'a Path,
    pub backend: &'a dyn FitBackend,
    pub renderer: &'a dyn Renderer,
}

/// Process one energy point of a pass.
///
/// Soft outcomes come back as `Ok(PointOutcome::Skipped)`; only a distribution
/// that cannot be built at all, or an output that cannot be written, is fatal.
pub fn run_energy_point(
    ctx: &StageContext<'_>,
    energy: &ValidEnergy,
    expression: &EnergyExpression,
    graphs: &mut PassGraphs,
    store: &mut dyn ArtifactStore,
) -> Result<PointOutcome, StageError> {
    let point = &ctx.point;
    let sr = point.signal_region;
    let pt = energy.pt;
    let e_true = true_energy(pt, point.eta);

    let filter_low = (!sr.is_innermost() && !point.pass.is_raw()).then_some(MIN_ENERGY_FRACTION * e_true);
    let values: Vec<f64> = expression
        .values(&energy.tree, sr, ctx.n_back)
        .into_iter()
        .filter(|v| v.is_finite())
        .filter(|&v| filter_low.is_none_or(|low| v > low))
        .collect();

    let (mean, rms) = moments(&values).ok_or_else(|| StageError::DistributionUnavailable {
        point: format!("{point} pT={pt}"),
        reason: format!("no event passes the selection on {}", expression.describe()),
    })?;
    let half_width = if rms.is_finite() && rms > 0.0 { RANGE_RMS * rms } else { 1.0 };
    let hist = Histogram::around(&values, DISTRIBUTION_BINS, mean, half_width);

    if values.len() < MIN_EVENTS {
        debug!(%point, pt, entries = values.len(), "too few entries after selection");
        return Ok(PointOutcome::Skipped(SkipReason::InsufficientStatistics {
            entries: values.len(),
        }));
    }

    let fit = match ctx.backend.fit_single_distribution(&hist, sr, ctx.flags.use_sigma_eff) {
        Ok(fit) => fit,
        Err(err) => {
            warn!(%point, pt, error = %err, "energy fit failed, point skipped");
            return Ok(PointOutcome::Skipped(SkipReason::FitFailed(err.to_string())));
        }
    };

    let threshold = chi2_ndf_threshold(sr);
    if !passes_quality_gate(&fit, sr) {
        warn!(
            %point,
            pt,
            chi2 = fit.chi2,
            ndf = fit.ndf,
            threshold,
            "bad fit quality, point rejected"
        );
        return Ok(PointOutcome::Skipped(SkipReason::QualityRejected {
            chi2_ndf: fit.chi2_ndf(),
            threshold,
        }));
    }

    let (resolution, resolution_err) = resolution_of(&fit, e_true, point.pile_up);
    let x = if ctx.flags.vs_e { e_true } else { f64::from(pt) };
    graphs.calibration.push(e_true, fit.mean, 0.0, fit.mean_err);
    graphs.resolution.push(x, resolution, 0.0, resolution_err);

    let mut chi2_hist = Histogram::new(CHI2_NDF_BINS, 0.0, CHI2_NDF_MAX);
    chi2_hist.fill(fit.chi2_ndf());
    store.create_or_replace(&chi2_ndf_key(pt, sr), Artifact::Histogram(chi2_hist));
    store.create_or_replace(&distribution_key(pt, sr), Artifact::Histogram(hist.clone()));

    if ctx.renderer.enabled() {
        let dir = paths::energy_plot_dir(ctx.output_root, point);
        std::fs::create_dir_all(&dir).map_err(|e| StageError::resource("plot directory", &dir, e))?;
        let path = paths::energy_plot_path(ctx.output_root, point, pt, ctx.flags);
        ctx.renderer
            .energy_point(&EnergyPlot {
                path: &path,
                histogram: &hist,
                fit: &fit,
                pt,
                pile_up: point.pile_up,
                eta: point.eta,
                radius_mm: sr.radius_mm(),
                unit: point.pass.unit(),
            })
            .map_err(|e| StageError::resource("energy plot", &path, e))?;
    }

    debug!(
        %point,
        pt,
        mean = fit.mean,
        sigma = fit.sigma,
        resolution,
        "energy point accepted"
    );
    Ok(PointOutcome::Accepted(AcceptedPoint {
        pt,
        true_energy: e_true,
        fit,
        resolution,
        resolution_err,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::data::{EnergyTree, ShowerEvent};
    use crate::domain::{CalibrationModel, CalibrationPass, DatasetGroup, Thickness, Version};
    use crate::fit::{FitError, StandardFits};
    use crate::plot::NullRenderer;

    fn fit(chi2: f64, ndf: u32) -> FitResult {
        FitResult {
            mean: 100.0,
            mean_err: 1.0,
            sigma: 5.0,
            sigma_err: 0.5,
            chi2,
            ndf,
        }
    }

    #[test]
    fn quality_gate_thresholds() {
        let sr0 = SignalRegion::new(0).unwrap();
        let sr3 = SignalRegion::new(3).unwrap();
        assert!(passes_quality_gate(&fit(49.9, 1), sr0));
        assert!(!passes_quality_gate(&fit(50.1, 1), sr0));
        assert!(passes_quality_gate(&fit(12.0, 1), sr3));
        assert!(!passes_quality_gate(&fit(30.1, 1), sr3));
        assert!(!passes_quality_gate(&fit(0.0, 0), sr0));
    }

    #[test]
    fn resolution_reference_depends_on_pile_up() {
        let f = fit(1.0, 1);
        let (r0, e0) = resolution_of(&f, 200.0, 0);
        assert!((r0 - 0.05).abs() < 1e-12);
        let expected = 0.05 * ((0.1f64).powi(2) + (0.01f64).powi(2)).sqrt();
        assert!((e0 - expected).abs() < 1e-12);

        let (r_pu, _) = resolution_of(&f, 200.0, 140);
        assert!((r_pu - 0.025).abs() < 1e-12);

        let negative = FitResult { sigma: -5.0, ..f };
        assert!(resolution_of(&negative, 200.0, 0).0 >= 0.0);
    }

    /// Map-backed store for stage tests.
    #[derive(Default)]
    struct MemoryStore(BTreeMap<String, Artifact>);

    impl ArtifactStore for MemoryStore {
        fn location(&self) -> &Path {
            Path::new("memory")
        }

        fn read(&self, key: &str) -> Option<&Artifact> {
            self.0.get(key)
        }

        fn create_or_replace(&mut self, key: &str, artifact: Artifact) {
            self.0.insert(key.to_string(), artifact);
        }
    }

    /// Fixed fit quality regardless of the histogram.
    struct FixedChi2(f64);

    impl FitBackend for FixedChi2 {
        fn fit_single_distribution(
            &self,
            histogram: &Histogram,
            _sr: SignalRegion,
            _eff: bool,
        ) -> Result<FitResult, FitError> {
            Ok(FitResult {
                mean: histogram.mean().unwrap_or(0.0),
                mean_err: 0.1,
                sigma: histogram.rms().unwrap_or(1.0),
                sigma_err: 0.1,
                chi2: self.0 * 10.0,
                ndf: 10,
            })
        }

        fn fit_leakage_correction(
            &self,
            request: &crate::fit::LeakageRequest<'_>,
            graph: &mut Graph,
        ) -> Result<f64, FitError> {
            StandardFits.fit_leakage_correction(request, graph)
        }

        fn fit_calibration(
            &self,
            graph: &Graph,
            pass: CalibrationPass,
            leakage: bool,
            delta: &mut Graph,
        ) -> Result<CalibrationModel, FitError> {
            StandardFits.fit_calibration(graph, pass, leakage, delta)
        }

        fn fit_resolution_model(
            &self,
            graph: &Graph,
            request: &crate::fit::ResolutionRequest,
        ) -> Result<crate::domain::ResolutionModel, FitError> {
            StandardFits.fit_resolution_model(graph, request)
        }

        fn extract_pile_up_noise(&self, request: &crate::fit::PileUpRequest<'_>) -> Result<Vec<f64>, FitError> {
            StandardFits.extract_pile_up_noise(request)
        }

        fn evaluate_resolution(&self, model: &crate::domain::ResolutionModel, x: f64) -> f64 {
            StandardFits.evaluate_resolution(model, x)
        }
    }

    fn energy(pt: u32, events: usize) -> ValidEnergy {
        ValidEnergy {
            pt,
            original_index: 0,
            tree: EnergyTree {
                layers: 1,
                events: (0..events)
                    .map(|i| ShowerEvent {
                        sr: vec![vec![1000.0 + (i % 7) as f64]; SignalRegion::COUNT],
                    })
                    .collect(),
            },
        }
    }

    fn point(sr: usize) -> SweepPoint {
        DatasetGroup {
            intercalib: 1,
            version: Version::V60,
            thickness: Thickness::Um200,
            eta: 2.0,
            pile_up: 0,
        }
        .point(SignalRegion::new(sr).unwrap(), CalibrationPass::Raw)
    }

    fn run(chi2_ndf: f64, events: usize, store: &mut MemoryStore, graphs: &mut PassGraphs) -> PointOutcome {
        let flags = StageFlags::default();
        let backend = FixedChi2(chi2_ndf);
        let ctx = StageContext {
            point: point(3),
            flags: &flags,
            n_back: 0,
            output_root: Path::new("unused"),
            backend: &backend,
            renderer: &NullRenderer,
        };
        run_energy_point(&ctx, &energy(100, events), &EnergyExpression::Raw, graphs, store).unwrap()
    }

    #[test]
    fn accepted_point_feeds_both_graphs_and_store() {
        let mut store = MemoryStore::default();
        let mut graphs = PassGraphs::default();
        let outcome = run(12.0, 200, &mut store, &mut graphs);

        assert!(matches!(outcome, PointOutcome::Accepted(_)));
        assert_eq!(graphs.calibration.len(), 1);
        assert_eq!(graphs.resolution.len(), 1);
        assert!(store.read("energy100_SR3").is_some());
        assert!(store.read("p_chi2ndf_E_100_SR3").is_some());
    }

    #[test]
    fn rejected_point_leaves_graphs_alone() {
        let mut store = MemoryStore::default();
        let mut graphs = PassGraphs::default();
        let outcome = run(31.0, 200, &mut store, &mut graphs);

        assert!(matches!(outcome, PointOutcome::Skipped(SkipReason::QualityRejected { .. })));
        assert!(graphs.calibration.is_empty());
        assert!(store.read("energy100_SR3").is_none());
    }

    #[test]
    fn too_few_entries_is_a_soft_skip() {
        let mut store = MemoryStore::default();
        let mut graphs = PassGraphs::default();
        let outcome = run(1.0, 80, &mut store, &mut graphs);
        assert_eq!(
            outcome,
            PointOutcome::Skipped(SkipReason::InsufficientStatistics { entries: 80 })
        );
    }

    #[test]
    fn empty_selection_is_fatal() {
        let flags = StageFlags::default();
        let ctx = StageContext {
            point: point(2).with_pass(CalibrationPass::Corrected),
            flags: &flags,
            n_back: 0,
            output_root: Path::new("unused"),
            backend: &StandardFits,
            renderer: &NullRenderer,
        };
        // Calibrated energies far below 0.7 E_true.
        let expression = EnergyExpression::Calibrated {
            calibration: CalibrationModel {
                slope: 1000.0,
                slope_err: 0.0,
                offset: 0.0,
                offset_err: 0.0,
                chi2: 0.0,
                ndf: 0,
            },
            leakage: None,
        };
        let err = run_energy_point(
            &ctx,
            &energy(100, 200),
            &expression,
            &mut PassGraphs::default(),
            &mut MemoryStore::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StageError::DistributionUnavailable { .. }));
    }
}
