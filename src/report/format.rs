//! Formatted terminal output for `ereso run` and `ereso show`.
//!
//! Formatting lives here so the engine stays free of presentation code and
//! output changes stay localized.

use chrono::{DateTime, Utc};

use crate::domain::RunConfig;
use crate::io::artifact::{Artifact, ArtifactFile, CALIBRATION_FUNCTION, RESOLUTION_FUNCTION};
use crate::sweep::SweepReport;

/// Format the end-of-run summary.
pub fn format_run_summary(report: &SweepReport, config: &RunConfig, run_at: &DateTime<Utc>) -> String {
    let mut out = String::new();

    out.push_str("=== ereso - energy calibration / resolution sweep ===\n");
    out.push_str(&format!("Tag: {}\n", config.tag));
    out.push_str(&format!("Run at: {}\n", run_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!(
        "Inputs: {} | outputs: {}\n",
        config.base_dir.display(),
        config.output_root().display()
    ));
    out.push_str(&format!(
        "Passes: {} | accepted energy points: {}\n",
        report.passes.len(),
        report.accepted_points()
    ));

    let dataset_skips = report.dataset_skip_counts();
    if !dataset_skips.is_empty() {
        out.push_str(&format!("Datasets skipped: {}\n", fmt_counts(&dataset_skips)));
    }
    let skips = report.skip_counts();
    if !skips.is_empty() {
        out.push_str(&format!("Energy points skipped: {}\n", fmt_counts(&skips)));
    }

    out.push('\n');
    out.push_str(&format!(
        "{:<34} {:>4} {:>10} {:>10} {:>8} {:>8} {:>8}\n",
        "point", "pts", "slope", "offset", "S", "C", "N"
    ));
    for pass in &report.passes {
        let c = &pass.calibration;
        let r = &pass.resolution;
        out.push_str(&format!(
            "{:<34} {:>4} {:>10.4} {:>10.3} {:>8.4} {:>8.4} {:>8.4}\n",
            pass.point.to_string(),
            pass.accepted.len(),
            c.slope,
            c.offset,
            r.stochastic,
            r.constant,
            r.noise
        ));
    }

    out
}

/// Describe every record of an artifact file, models first.
pub fn format_artifact_file(file: &ArtifactFile) -> String {
    let mut out = String::new();
    out.push_str(&format!("File: {}\n", file.path().display()));

    for (key, artifact) in file.iter() {
        match artifact {
            Artifact::Graph(graph) => {
                out.push_str(&format!("- {key}: graph, {} points\n", graph.len()));
                if let Some(model) = graph.function(CALIBRATION_FUNCTION).and_then(|f| f.calibration()) {
                    out.push_str(&format!(
                        "    calib: slope={:.5} ± {:.5} offset={:.4} ± {:.4} chi2/ndf={:.2}/{}\n",
                        model.slope, model.slope_err, model.offset, model.offset_err, model.chi2, model.ndf
                    ));
                }
                if let Some(model) = graph.function(RESOLUTION_FUNCTION).and_then(|f| f.resolution()) {
                    out.push_str(&format!(
                        "    reso: S={:.4} ± {:.4} C={:.4} ± {:.4} N={:.4} ± {:.4} chi2/ndf={:.2}/{}\n",
                        model.stochastic,
                        model.stochastic_err,
                        model.constant,
                        model.constant_err,
                        model.noise,
                        model.noise_err,
                        model.chi2,
                        model.ndf
                    ));
                }
            }
            Artifact::Histogram(hist) => {
                out.push_str(&format!(
                    "- {key}: histogram, {} entries, {} bins on [{:.3}, {:.3}]\n",
                    hist.entries,
                    hist.bins(),
                    hist.low,
                    hist.high
                ));
            }
        }
    }
    out
}

fn fmt_counts(counts: &std::collections::BTreeMap<&'static str, usize>) -> String {
    counts
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResolutionModel;
    use crate::io::artifact::{ArtifactStore, Graph, OpenMode};

    #[test]
    fn artifact_listing_shows_models() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        let mut file = ArtifactFile::open(&path, OpenMode::CreateOrUpdate).unwrap();
        let mut graph = Graph::default();
        graph.push(10.0, 0.07, 0.0, 0.001);
        graph.set_function(
            (&ResolutionModel {
                stochastic: 0.21,
                stochastic_err: 0.01,
                constant: 0.006,
                constant_err: 0.001,
                noise: 0.05,
                noise_err: 0.0,
                chi2: 3.0,
                ndf: 4,
            })
                .into(),
        );
        file.create_or_replace("resoRecoFit", Artifact::Graph(graph));

        let txt = format_artifact_file(&file);
        assert!(txt.starts_with(&format!("File: {}\n", path.display())));
        assert!(txt.contains("- resoRecoFit: graph, 1 points"));
        assert!(txt.contains("reso: S=0.2100"));
    }

    #[test]
    fn summary_lists_skip_counts() {
        let report = SweepReport::default();
        let config = RunConfig {
            tag: "t".to_string(),
            n_back: 2,
            intercalibs: vec![1],
            versions: vec![],
            thicknesses: vec![],
            etas: vec![],
            pile_ups: vec![0],
            signal_regions: vec![],
            energies: vec![],
            stages: Default::default(),
            base_dir: "data".into(),
            save_dir: "results".into(),
            plots: false,
        };
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let txt = format_run_summary(&report, &config, &at);
        assert!(txt.contains("Run at: 2026-01-02 03:04:05 UTC"));
        assert!(txt.contains("Passes: 0"));
    }
}
