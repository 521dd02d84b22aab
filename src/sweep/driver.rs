//! Sweep driver: walks the configuration space in dependency order.
//!
//! Nesting: intercalib → version → thickness → eta → pile-up → (resolve
//! energies) → signal region → pass. Within an eta group, pile-up free points
//! run first so their calibration and resolution model exist before any
//! pile-up point needs them.
//!
//! The first fatal error aborts the sweep; artifact files committed before it
//! are left as they are.

use std::collections::BTreeMap;

use tracing::{info, info_span, warn};

use crate::data::DatasetSource;
use crate::domain::{
    CalibrationModel, CalibrationPass, DatasetGroup, ResolutionModel, RunConfig, SweepPoint, noise_reference,
};
use crate::error::{FitStage, StageError};
use crate::fit::{FitBackend, LeakageRequest, PileUpRequest, ResolutionRequest};
use crate::io::artifact::{Artifact, ArtifactFile, ArtifactStore, CALIBRATION_FUNCTION, Graph, OpenMode};
use crate::io::paths;
use crate::plot::{GraphPlot, Renderer, sample_curve, x_range};
use crate::sweep::expression::EnergyExpression;
use crate::sweep::outcome::{DatasetSkip, PassReport, PointOutcome, SkipRecord, SweepReport};
use crate::sweep::resolver::{ResolvedEnergies, ValidEnergy, resolve_energies};
use crate::sweep::stage::{PassGraphs, StageContext, run_energy_point};

/// Grid energy whose datasets are used for the pile-up noise.
pub const PILE_UP_NOISE_PT: u32 = 60;

/// Back-leakage graph of the corrected pass.
pub const LEAKAGE_GRAPH: &str = "corrBackLeakFit";

/// Artifact names of the graphs of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphKeys {
    pub calibration: &'static str,
    pub delta: &'static str,
    pub resolution: &'static str,
}

impl GraphKeys {
    pub fn for_pass(pass: CalibrationPass) -> Self {
        match pass {
            CalibrationPass::Raw => GraphKeys {
                calibration: "calibRecoFitRaw",
                delta: "calibRecoDeltaRaw",
                resolution: "resoRecoFitRaw",
            },
            CalibrationPass::Corrected => GraphKeys {
                calibration: "calibRecoFit",
                delta: "calibRecoDelta",
                resolution: "resoRecoFit",
            },
        }
    }
}

/// How the corrected pass obtains its per-energy leakage coefficients.
enum LeakageMode {
    /// Raw pass: no leakage term at all.
    None,
    /// Fit every energy and rebuild the graph.
    Refit(Graph),
    /// Look coefficients up in the graph left by a previous run.
    Cached(Graph),
    /// Not refitted and not applied.
    Disabled,
}

pub struct SweepDriver<'a> {
    config: &'a RunConfig,
    datasets: &'a dyn DatasetSource,
    backend: &'a dyn FitBackend,
    renderer: &'a dyn Renderer,
}

impl<'a> SweepDriver<'a> {
    pub fn new(
        config: &'a RunConfig,
        datasets: &'a dyn DatasetSource,
        backend: &'a dyn FitBackend,
        renderer: &'a dyn Renderer,
    ) -> Self {
        Self {
            config,
            datasets,
            backend,
            renderer,
        }
    }

    pub fn run(&self) -> Result<SweepReport, StageError> {
        validate(self.config)?;
        let config = self.config;
        let mut report = SweepReport::default();

        // Pile-up free first, otherwise in the requested order.
        let mut pile_ups = config.pile_ups.clone();
        pile_ups.sort_by_key(|&pu| pu != 0);

        for &intercalib in &config.intercalibs {
            for &version in &config.versions {
                for &thickness in &config.thicknesses {
                    for &eta in &config.etas {
                        let mut zero_pu_models: BTreeMap<(usize, CalibrationPass), ResolutionModel> = BTreeMap::new();
                        for &pile_up in &pile_ups {
                            let group = DatasetGroup {
                                intercalib,
                                version,
                                thickness,
                                eta,
                                pile_up,
                            };
                            let span = info_span!("group", %group);
                            let _enter = span.enter();
                            self.run_group(&group, &mut zero_pu_models, &mut report)?;
                        }
                    }
                }
            }
        }

        info!(
            passes = report.passes.len(),
            accepted = report.accepted_points(),
            "sweep finished"
        );
        Ok(report)
    }

    fn run_group(
        &self,
        group: &DatasetGroup,
        zero_pu_models: &mut BTreeMap<(usize, CalibrationPass), ResolutionModel>,
        report: &mut SweepReport,
    ) -> Result<(), StageError> {
        let resolved = resolve_energies(self.datasets, &self.config.base_dir, group, &self.config.energies)?;
        for state in resolved.skipped() {
            if let Some(cause) = &state.skip {
                report.dataset_skips.push(DatasetSkip {
                    group: group.to_string(),
                    pt: state.pt,
                    path: state.path.clone(),
                    cause: cause.clone(),
                });
            }
        }

        let output_root = self.config.output_root();
        let flags = &self.config.stages;
        let passes: &[CalibrationPass] = if flags.redo_calib && group.pile_up == 0 {
            &[CalibrationPass::Raw, CalibrationPass::Corrected]
        } else {
            &[CalibrationPass::Corrected]
        };

        for &sr in &self.config.signal_regions {
            info!(%sr, radius_mm = sr.radius_mm(), "processing signal region");
            let dir = paths::output_dir(&output_root, &group.point(sr, CalibrationPass::Corrected));
            std::fs::create_dir_all(&dir).map_err(|e| StageError::resource("output directory", &dir, e))?;

            let mut raw_calibration: Option<CalibrationModel> = None;
            for &pass in passes {
                let point = group.point(sr, pass);
                let zero_pu_reference = if group.pile_up > 0 {
                    zero_pu_models.get(&(sr.index(), pass)).copied()
                } else {
                    None
                };
                let pass_report = self.run_pass(&point, &resolved, raw_calibration, zero_pu_reference)?;

                if pass.is_raw() {
                    raw_calibration = Some(pass_report.calibration);
                }
                if group.pile_up == 0 {
                    zero_pu_models.insert((sr.index(), pass), pass_report.resolution);
                }
                report.passes.push(pass_report);
            }
        }
        Ok(())
    }

    fn run_pass(
        &self,
        point: &SweepPoint,
        resolved: &ResolvedEnergies,
        raw_calibration: Option<CalibrationModel>,
        zero_pu_reference: Option<ResolutionModel>,
    ) -> Result<PassReport, StageError> {
        let config = self.config;
        let flags = &config.stages;
        let output_root = config.output_root();
        let sr = point.signal_region;
        let keys = GraphKeys::for_pass(point.pass);

        let artifact_path = paths::artifact_path(&output_root, point, flags);
        let mut store = ArtifactFile::open(&artifact_path, OpenMode::CreateOrUpdate)?;
        info!(pass = %point.pass, file = %artifact_path.display(), "pass started");

        // Calibration applied to the energies of the corrected pass.
        let (applied, calibration_reused) = match point.pass {
            CalibrationPass::Raw => (None, false),
            CalibrationPass::Corrected => match raw_calibration {
                Some(model) => (Some(model), false),
                None => (Some(self.cached_calibration(point)?), true),
            },
        };
        if let Some(model) = &applied {
            info!(
                slope = model.slope,
                slope_err = model.slope_err,
                offset = model.offset,
                offset_err = model.offset_err,
                reused = calibration_reused,
                "calibration"
            );
        }

        let mut leakage = match (point.pass, flags.redo_leak_cor, flags.do_back_leak_cor) {
            (CalibrationPass::Raw, _, _) => LeakageMode::None,
            (CalibrationPass::Corrected, true, _) => LeakageMode::Refit(Graph::default()),
            (CalibrationPass::Corrected, false, true) => {
                LeakageMode::Cached(store.must_exist_graph(LEAKAGE_GRAPH)?.clone())
            }
            (CalibrationPass::Corrected, false, false) => LeakageMode::Disabled,
        };

        let noise_pu = match (applied, point.pass, point.pile_up) {
            (Some(calibration), CalibrationPass::Corrected, pu) if pu > 0 => {
                Some(self.pile_up_noise(point, resolved, &calibration)?)
            }
            _ => None,
        };

        let ctx = StageContext {
            point: *point,
            flags,
            n_back: config.n_back,
            output_root: &output_root,
            backend: self.backend,
            renderer: self.renderer,
        };
        let mut graphs = PassGraphs::default();
        let mut accepted = Vec::new();
        let mut skipped = Vec::new();

        for energy in &resolved.valid {
            let expression = match applied {
                None => EnergyExpression::Raw,
                Some(calibration) => {
                    let coefficient = self.leakage_coefficient(point, energy, &calibration, &mut leakage)?;
                    EnergyExpression::Calibrated {
                        calibration,
                        leakage: flags.do_back_leak_cor.then_some(coefficient),
                    }
                }
            };

            match run_energy_point(&ctx, energy, &expression, &mut graphs, &mut store)? {
                PointOutcome::Accepted(p) => accepted.push(p),
                PointOutcome::Skipped(reason) => skipped.push(SkipRecord { pt: energy.pt, reason }),
            }
        }

        let leakage_applied = point.pass == CalibrationPass::Corrected && flags.do_back_leak_cor;
        let mut delta = Graph::default();
        let calibration = self
            .backend
            .fit_calibration(&graphs.calibration, point.pass, leakage_applied, &mut delta)
            .map_err(|e| fit_failure(FitStage::Calibration, point, e))?;
        graphs.calibration.set_function((&calibration).into());
        info!(
            slope = calibration.slope,
            offset = calibration.offset,
            points = graphs.calibration.len(),
            "calibration fit"
        );
        store.create_or_replace(keys.calibration, Artifact::Graph(graphs.calibration.clone()));
        store.create_or_replace(keys.delta, Artifact::Graph(delta));

        if let LeakageMode::Refit(graph) = &leakage {
            store.create_or_replace(LEAKAGE_GRAPH, Artifact::Graph(graph.clone()));
            self.render_graph(point, "backLeak", "back-leakage correction", "pT (GeV)", "coefficient", graph, Vec::new())?;
        }

        let noise = match &noise_pu {
            Some(noise) => noise.get(sr.index()).copied().ok_or_else(|| {
                fit_failure(
                    FitStage::PileUpNoise,
                    point,
                    crate::fit::FitError::new(format!("no noise for {sr} among {} signal region(s)", noise.len())),
                )
            })?,
            None => noise_reference(point.eta_x10(), sr),
        };
        let request = ResolutionRequest {
            pass: point.pass,
            leakage: leakage_applied,
            noise_reference: noise,
            zero_pu_reference,
            vs_e: flags.vs_e,
        };
        let resolution = self
            .backend
            .fit_resolution_model(&graphs.resolution, &request)
            .map_err(|e| fit_failure(FitStage::Resolution, point, e))?;
        graphs.resolution.set_function((&resolution).into());
        info!(
            stochastic = resolution.stochastic,
            constant = resolution.constant,
            noise = resolution.noise,
            points = graphs.resolution.len(),
            "resolution fit"
        );
        store.create_or_replace(keys.resolution, Artifact::Graph(graphs.resolution.clone()));

        let calibration_curve = x_range(&graphs.calibration.points)
            .map(|(lo, hi)| sample_curve(lo, hi, 2, |x| calibration.offset + calibration.slope * x))
            .unwrap_or_default();
        self.render_graph(
            point,
            "calib",
            "calibration",
            "E (GeV)",
            point.pass.unit(),
            &graphs.calibration,
            calibration_curve,
        )?;
        let resolution_curve = x_range(&graphs.resolution.points)
            .map(|(lo, hi)| sample_curve(lo, hi, 100, |x| self.backend.evaluate_resolution(&resolution, x)))
            .unwrap_or_default();
        let x_label = if flags.vs_e { "E (GeV)" } else { "pT (GeV)" };
        self.render_graph(point, "reso", "resolution", x_label, "sigma/E", &graphs.resolution, resolution_curve)?;

        store.commit()?;
        info!(
            accepted = accepted.len(),
            skipped = skipped.len(),
            file = %artifact_path.display(),
            "pass committed"
        );

        Ok(PassReport {
            point: *point,
            calibration,
            applied_calibration: applied,
            calibration_reused,
            resolution,
            accepted,
            skipped,
            artifact: artifact_path,
        })
    }

    /// Calibration of the pile-up free raw pass, read back from its artifact file.
    fn cached_calibration(&self, point: &SweepPoint) -> Result<CalibrationModel, StageError> {
        let source = point.calibration_source();
        let path = paths::artifact_path(&self.config.output_root(), &source, &self.config.stages);
        let key = GraphKeys::for_pass(CalibrationPass::Raw).calibration;
        if !path.exists() {
            return Err(StageError::MissingCachedArtifact {
                key: key.to_string(),
                path,
                reason: "raw artifact file does not exist".to_string(),
            });
        }

        let file = ArtifactFile::open(&path, OpenMode::Read)?;
        file.must_exist_graph(key)?
            .function(CALIBRATION_FUNCTION)
            .and_then(|f| f.calibration())
            .ok_or_else(|| StageError::MissingCachedArtifact {
                key: format!("{key}/{CALIBRATION_FUNCTION}"),
                path: path.clone(),
                reason: "no calibration function attached".to_string(),
            })
    }

    fn leakage_coefficient(
        &self,
        point: &SweepPoint,
        energy: &ValidEnergy,
        calibration: &CalibrationModel,
        leakage: &mut LeakageMode,
    ) -> Result<f64, StageError> {
        match leakage {
            LeakageMode::None | LeakageMode::Disabled => Ok(0.0),
            LeakageMode::Refit(graph) => {
                let request = LeakageRequest {
                    layers: point.version.layer_count(),
                    n_back: self.config.n_back,
                    signal_region: point.signal_region,
                    pt: energy.pt,
                    eta_x10: point.eta_x10(),
                    pile_up: point.pile_up,
                    calibration,
                    tree: &energy.tree,
                };
                match self.backend.fit_leakage_correction(&request, graph) {
                    Ok(k) => Ok(k),
                    Err(e) if self.config.stages.do_back_leak_cor => Err(fit_failure(FitStage::Leakage, point, e)),
                    Err(e) => {
                        warn!(pt = energy.pt, error = %e, "leakage fit failed, correction not applied");
                        Ok(0.0)
                    }
                }
            }
            LeakageMode::Cached(graph) => graph.y_at(f64::from(energy.pt)).ok_or_else(|| {
                StageError::MissingCachedArtifact {
                    key: format!("{LEAKAGE_GRAPH}@{}", energy.pt),
                    path: paths::artifact_path(&self.config.output_root(), point, &self.config.stages),
                    reason: format!("no leakage coefficient for pT={}", energy.pt),
                }
            }),
        }
    }

    fn pile_up_noise(
        &self,
        point: &SweepPoint,
        resolved: &ResolvedEnergies,
        calibration: &CalibrationModel,
    ) -> Result<Vec<f64>, StageError> {
        let group = point.group();
        let pu_tree = &resolved
            .find(PILE_UP_NOISE_PT)
            .ok_or_else(|| {
                StageError::resource(
                    "pile-up dataset",
                    paths::dataset_path(&self.config.base_dir, &group, PILE_UP_NOISE_PT),
                    "energy point not available",
                )
            })?
            .tree;

        let zero_path = paths::dataset_path(&self.config.base_dir, &group.with_pile_up(0), PILE_UP_NOISE_PT);
        let zero_pu_tree = self
            .datasets
            .open(&zero_path)
            .map_err(|e| StageError::resource("reference dataset", &zero_path, e))?;

        let noise = self
            .backend
            .extract_pile_up_noise(&PileUpRequest {
                pile_up: point.pile_up,
                version: point.version,
                eta: point.eta,
                zero_pu_tree: &zero_pu_tree,
                pu_tree,
                calibration,
            })
            .map_err(|e| fit_failure(FitStage::PileUpNoise, point, e))?;
        info!(noise = ?noise, "pile-up noise per signal region");
        Ok(noise)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_graph(
        &self,
        point: &SweepPoint,
        kind: &str,
        title: &str,
        x_label: &'static str,
        y_label: &'static str,
        graph: &Graph,
        curve: Vec<(f64, f64)>,
    ) -> Result<(), StageError> {
        if !self.renderer.enabled() {
            return Ok(());
        }
        let path = paths::graph_plot_path(&self.config.output_root(), point, &self.config.stages, kind);
        self.renderer
            .graph(&GraphPlot {
                path: &path,
                title: format!("{title}: {point}"),
                x_label,
                y_label,
                points: &graph.points,
                curve,
            })
            .map_err(|e| StageError::resource("graph plot", &path, e))
    }
}

fn fit_failure(stage: FitStage, point: &SweepPoint, err: crate::fit::FitError) -> StageError {
    StageError::FitFailure {
        stage,
        point: point.to_string(),
        reason: err.to_string(),
    }
}

fn validate(config: &RunConfig) -> Result<(), StageError> {
    let empty = [
        ("intercalibs", config.intercalibs.is_empty()),
        ("versions", config.versions.is_empty()),
        ("thicknesses", config.thicknesses.is_empty()),
        ("etas", config.etas.is_empty()),
        ("pileups", config.pile_ups.is_empty()),
        ("signalRegions", config.signal_regions.is_empty()),
        ("energies", config.energies.is_empty()),
    ];
    if let Some((name, _)) = empty.iter().find(|(_, is_empty)| *is_empty) {
        return Err(StageError::Configuration(format!("no {name} to sweep")));
    }
    if config.tag.trim().is_empty() {
        return Err(StageError::Configuration("empty tag".to_string()));
    }
    if let Some(v) = config.versions.iter().find(|v| config.n_back >= v.layer_count()) {
        return Err(StageError::Configuration(format!(
            "nBack={} leaves no front layer for version {v}",
            config.n_back
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_names_follow_the_pass() {
        assert_eq!(GraphKeys::for_pass(CalibrationPass::Raw).calibration, "calibRecoFitRaw");
        assert_eq!(GraphKeys::for_pass(CalibrationPass::Corrected).resolution, "resoRecoFit");
    }

    #[test]
    fn pile_up_free_points_sort_first() {
        let mut pus = vec![140, 0, 200];
        pus.sort_by_key(|&pu| pu != 0);
        assert_eq!(pus, vec![0, 140, 200]);
    }
}
