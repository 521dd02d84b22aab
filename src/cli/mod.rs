//! Command-line parsing for the resolution sweep.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! sweep engine. Dimension lists use the counted form `--name N v1 .. vN`;
//! decoding and validation of those lists happens in [`decode_counted`].

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{ArgAction, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "ereso",
    version,
    about = "Calorimeter energy calibration and resolution sweep"
)]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the calibration / resolution sweep over simulated datasets.
    Run(RunArgs),
    /// Write synthetic shower datasets for a configuration grid.
    Simulate(SimulateArgs),
    /// Print the models stored in an artifact file and plot its resolution graph.
    Show(ShowArgs),
}

/// Options of `ereso run`.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Output namespace under the save directory.
    #[arg(long)]
    pub tag: String,

    /// Number of back layers summed for the leakage estimate.
    #[arg(long = "nBack", value_parser = clap::value_parser!(u8).range(0..=4))]
    pub n_back: u8,

    /// Sensor thicknesses in µm: `N t1 .. tN` (100, 200, 300).
    #[arg(long, num_args = 2.., required = true, value_name = "N V..")]
    pub thicknesses: Vec<String>,

    /// Signal regions: `N s1 .. sN` (0..5).
    #[arg(long = "signalRegions", num_args = 2.., required = true, value_name = "N V..")]
    pub signal_regions: Vec<String>,

    /// Geometry versions: `N v1 .. vN` (60, 70).
    #[arg(long, num_args = 2.., required = true, value_name = "N V..")]
    pub versions: Vec<String>,

    /// Pseudorapidities: `N e1 .. eN`.
    #[arg(long, num_args = 2.., required = true, value_name = "N V..")]
    pub etas: Vec<String>,

    /// Pile-up scenarios: `N p1 .. pN`.
    #[arg(long, num_args = 2.., default_values = ["1", "0"], value_name = "N V..")]
    pub pileups: Vec<String>,

    /// Intercalibration constants: `N c1 .. cN`.
    #[arg(long, num_args = 2.., default_values = ["1", "3"], value_name = "N V..")]
    pub intercalibs: Vec<String>,

    /// Run the raw pass and refit the calibration.
    #[arg(long = "redoCalib", default_value_t = true, action = ArgAction::Set)]
    pub redo_calib: bool,

    /// Refit the back-leakage correction instead of reading it back.
    #[arg(long = "redoLeakCor", default_value_t = true, action = ArgAction::Set)]
    pub redo_leak_cor: bool,

    /// Apply the back-leakage correction.
    #[arg(long = "doBackLeakCor", default_value_t = true, action = ArgAction::Set)]
    pub do_back_leak_cor: bool,

    /// Use the effective sigma instead of the Gaussian width.
    #[arg(long = "useSigmaEff", default_value_t = true, action = ArgAction::Set)]
    pub use_sigma_eff: bool,

    /// Resolution against true energy (otherwise against pT).
    #[arg(long = "vsE", default_value_t = true, action = ArgAction::Set)]
    pub vs_e: bool,

    /// Input dataset root (default: `ERESO_BASE_DIR` or `data`).
    #[arg(long = "baseDir")]
    pub base_dir: Option<PathBuf>,

    /// Output root (default: `ERESO_SAVE_DIR` or `results`).
    #[arg(long = "saveDir")]
    pub save_dir: Option<PathBuf>,

    /// Skip SVG rendering.
    #[arg(long = "no-plots")]
    pub no_plots: bool,
}

/// Options of `ereso simulate`.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output dataset root (default: `ERESO_BASE_DIR` or `data`).
    #[arg(long = "baseDir")]
    pub base_dir: Option<PathBuf>,

    #[arg(long, num_args = 2.., default_values = ["1", "200"], value_name = "N V..")]
    pub thicknesses: Vec<String>,

    #[arg(long, num_args = 2.., default_values = ["1", "60"], value_name = "N V..")]
    pub versions: Vec<String>,

    #[arg(long, num_args = 2.., default_values = ["1", "2.0"], value_name = "N V..")]
    pub etas: Vec<String>,

    #[arg(long, num_args = 2.., default_values = ["1", "0"], value_name = "N V..")]
    pub pileups: Vec<String>,

    #[arg(long, num_args = 2.., default_values = ["1", "1"], value_name = "N V..")]
    pub intercalibs: Vec<String>,

    /// Generated pT values (GeV); defaults to the standard energy grid.
    #[arg(long, num_args = 2.., value_name = "N V..")]
    pub energies: Option<Vec<String>>,

    /// Events per dataset file.
    #[arg(long, default_value_t = 1000)]
    pub events: usize,

    /// Event count for one energy, as `PT=COUNT` (repeatable).
    #[arg(long = "eventsAt", value_name = "PT=COUNT")]
    pub events_at: Vec<String>,

    /// Do not write the dataset of this energy (repeatable).
    #[arg(long, value_name = "PT")]
    pub omit: Vec<u32>,

    /// Random seed, combined with each dataset identity.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options of `ereso show`.
#[derive(Debug, Parser, Clone)]
pub struct ShowArgs {
    /// Artifact JSON written by `ereso run`.
    #[arg(value_name = "ARTIFACT")]
    pub artifact: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Decode a counted list `N v1 .. vN`.
pub fn decode_counted<T>(flag: &str, raw: &[String]) -> Result<Vec<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    let Some((count, values)) = raw.split_first() else {
        return Err(format!("--{flag}: expected a count followed by values"));
    };
    let count: usize = count
        .parse()
        .map_err(|e| format!("--{flag}: invalid count '{count}': {e}"))?;
    if count == 0 {
        return Err(format!("--{flag}: count must be at least 1"));
    }
    if count != values.len() {
        return Err(format!(
            "--{flag}: count {count} does not match {} value(s)",
            values.len()
        ));
    }
    values
        .iter()
        .map(|v| v.parse::<T>().map_err(|e| format!("--{flag}: invalid value '{v}': {e}")))
        .collect()
}

/// Parse `PT=COUNT`.
pub fn parse_events_at(raw: &str) -> Result<(u32, usize), String> {
    let (pt, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("--eventsAt: expected PT=COUNT, got '{raw}'"))?;
    let pt = pt.trim().parse().map_err(|e| format!("--eventsAt: invalid pT '{pt}': {e}"))?;
    let count = count
        .trim()
        .parse()
        .map_err(|e| format!("--eventsAt: invalid count '{count}': {e}"))?;
    Ok((pt, count))
}
