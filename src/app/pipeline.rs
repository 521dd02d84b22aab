//! Shared sweep pipeline used by the CLI and the integration tests.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! datasets -> sweep driver -> artifact files -> run summary
//!
//! The real binary uses JSON datasets, the standard fits and SVG rendering;
//! tests swap any of them through [`run_sweep_with`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::data::{DatasetSource, JsonDatasetSource};
use crate::domain::RunConfig;
use crate::error::AppError;
use crate::fit::{FitBackend, StandardFits};
use crate::plot::{NullRenderer, Renderer, SvgRenderer};
use crate::sweep::{SweepDriver, SweepReport};

pub const SUMMARY_FILE: &str = "summary.csv";

/// All outputs of a single `ereso run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: SweepReport,
    pub run_at: DateTime<Utc>,
    pub summary_path: PathBuf,
}

/// Execute the sweep with the default collaborators.
pub fn run_sweep(config: &RunConfig) -> Result<RunOutput, AppError> {
    let renderer: &dyn Renderer = if config.plots { &SvgRenderer } else { &NullRenderer };
    run_sweep_with(config, &JsonDatasetSource, &StandardFits, renderer)
}

/// Execute the sweep and write the run summary.
pub fn run_sweep_with(
    config: &RunConfig,
    datasets: &dyn DatasetSource,
    backend: &dyn FitBackend,
    renderer: &dyn Renderer,
) -> Result<RunOutput, AppError> {
    let run_at = Utc::now();
    let report = SweepDriver::new(config, datasets, backend, renderer).run()?;

    let summary_path = config.output_root().join(SUMMARY_FILE);
    let rows = crate::report::summary_rows(&report, &run_at);
    crate::io::export::write_summary_csv(&summary_path, &rows)?;
    info!(
        passes = report.passes.len(),
        accepted = report.accepted_points(),
        summary = %summary_path.display(),
        "sweep finished"
    );

    Ok(RunOutput {
        report,
        run_at,
        summary_path,
    })
}
