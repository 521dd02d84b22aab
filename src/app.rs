//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - initialises logging
//! - resolves directory defaults from the environment
//! - dispatches to the sweep, the simulator or the artifact viewer

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::info;

use crate::cli::{Cli, Command, RunArgs, ShowArgs, SimulateArgs, decode_counted, parse_events_at};
use crate::data::SimulationConfig;
use crate::domain::{ENERGY_GRID, RunConfig, SignalRegion, StageFlags, Thickness, Version};
use crate::error::{AppError, EXIT_FAILURE};
use crate::io::artifact::{ArtifactFile, OpenMode, RESOLUTION_FUNCTION};
use crate::plot::{render_graph_ascii, sample_curve, x_range};

pub mod pipeline;

pub const BASE_DIR_VAR: &str = "ERESO_BASE_DIR";
pub const SAVE_DIR_VAR: &str = "ERESO_SAVE_DIR";

/// Entry point for the `ereso` binary.
pub fn run() -> Result<(), AppError> {
    // `ereso --tag v1 ...` behaves like `ereso run --tag v1 ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{err}");
            return Ok(());
        }
        Err(err) => return Err(AppError::new(EXIT_FAILURE, err.render().to_string())),
    };

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let env = Environment::from_env();
    match cli.command {
        Command::Run(args) => handle_run(&args, &env),
        Command::Simulate(args) => handle_simulate(&args, &env),
        Command::Show(args) => handle_show(&args),
    }
}

/// Directory defaults read from the process environment (and `.env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub base_dir: PathBuf,
    pub save_dir: PathBuf,
}

impl Environment {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let dir = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            base_dir: dir(BASE_DIR_VAR, "data"),
            save_dir: dir(SAVE_DIR_VAR, "results"),
        }
    }
}

fn handle_run(args: &RunArgs, env: &Environment) -> Result<(), AppError> {
    let config = run_config_from_args(args, env)?;
    let output = pipeline::run_sweep(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&output.report, &config, &output.run_at)
    );
    println!("Summary written to {}", output.summary_path.display());
    Ok(())
}

fn handle_simulate(args: &SimulateArgs, env: &Environment) -> Result<(), AppError> {
    let config = simulation_config_from_args(args, env)?;
    let summary = crate::data::simulate(&config)?;
    println!(
        "Wrote {} dataset file(s), {} event(s), under {}",
        summary.files,
        summary.events,
        config.base_dir.display()
    );
    Ok(())
}

fn handle_show(args: &ShowArgs) -> Result<(), AppError> {
    let file = ArtifactFile::open(&args.artifact, OpenMode::Read)?;
    println!("{}", crate::report::format_artifact_file(&file));

    // Prefer the corrected graph when both passes live in one file.
    let graph = file
        .iter()
        .filter_map(|(key, artifact)| artifact.as_graph().map(|g| (key, g)))
        .filter(|(_, g)| g.function(RESOLUTION_FUNCTION).is_some())
        .min_by_key(|(key, _)| key.ends_with("Raw"));
    let Some((key, graph)) = graph else {
        println!("No resolution graph in this file.");
        return Ok(());
    };

    let curve = graph
        .function(RESOLUTION_FUNCTION)
        .and_then(|f| f.resolution())
        .zip(x_range(&graph.points))
        .map(|(model, (lo, hi))| {
            sample_curve(lo.max(1e-3), hi, 200, |x| crate::fit::resolution::evaluate(&model, x))
        });

    println!("{key}");
    println!(
        "{}",
        render_graph_ascii(&graph.points, curve.as_deref(), args.width, args.height)
    );
    Ok(())
}

/// Build a [`RunConfig`] from `ereso run` arguments.
pub fn run_config_from_args(args: &RunArgs, env: &Environment) -> Result<RunConfig, AppError> {
    let versions = decode_counted::<u32>("versions", &args.versions)
        .map_err(usage)?
        .into_iter()
        .map(version_from)
        .collect::<Result<Vec<_>, _>>()?;
    let thicknesses = decode_counted::<u32>("thicknesses", &args.thicknesses)
        .map_err(usage)?
        .into_iter()
        .map(thickness_from)
        .collect::<Result<Vec<_>, _>>()?;
    let signal_regions = decode_counted::<usize>("signalRegions", &args.signal_regions)
        .map_err(usage)?
        .into_iter()
        .map(|i| {
            SignalRegion::new(i).ok_or_else(|| {
                AppError::new(
                    EXIT_FAILURE,
                    format!("--signalRegions: {i} is out of range (0..{})", SignalRegion::COUNT - 1),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let etas: Vec<f64> = decode_counted("etas", &args.etas).map_err(usage)?;
    if let Some(eta) = etas.iter().find(|e| !(e.is_finite() && **e > 0.0)) {
        return Err(AppError::new(EXIT_FAILURE, format!("--etas: invalid pseudorapidity {eta}")));
    }
    let pile_ups: Vec<u32> = decode_counted("pileups", &args.pileups).map_err(usage)?;
    let intercalibs: Vec<u32> = decode_counted("intercalibs", &args.intercalibs).map_err(usage)?;

    let config = RunConfig {
        tag: args.tag.clone(),
        n_back: usize::from(args.n_back),
        intercalibs,
        versions,
        thicknesses,
        etas,
        pile_ups,
        signal_regions,
        energies: ENERGY_GRID.to_vec(),
        stages: StageFlags {
            redo_calib: args.redo_calib,
            redo_leak_cor: args.redo_leak_cor,
            do_back_leak_cor: args.do_back_leak_cor,
            use_sigma_eff: args.use_sigma_eff,
            vs_e: args.vs_e,
        },
        base_dir: args.base_dir.clone().unwrap_or_else(|| env.base_dir.clone()),
        save_dir: args.save_dir.clone().unwrap_or_else(|| env.save_dir.clone()),
        plots: !args.no_plots,
    };
    info!(tag = %config.tag, base = %config.base_dir.display(), save = %config.save_dir.display(), "run configured");
    Ok(config)
}

/// Build a [`SimulationConfig`] from `ereso simulate` arguments.
pub fn simulation_config_from_args(args: &SimulateArgs, env: &Environment) -> Result<SimulationConfig, AppError> {
    let versions = decode_counted::<u32>("versions", &args.versions)
        .map_err(usage)?
        .into_iter()
        .map(version_from)
        .collect::<Result<Vec<_>, _>>()?;
    let thicknesses = decode_counted::<u32>("thicknesses", &args.thicknesses)
        .map_err(usage)?
        .into_iter()
        .map(thickness_from)
        .collect::<Result<Vec<_>, _>>()?;
    let energies = match &args.energies {
        Some(raw) => decode_counted("energies", raw).map_err(usage)?,
        None => ENERGY_GRID.to_vec(),
    };
    let event_overrides = args
        .events_at
        .iter()
        .map(|raw| parse_events_at(raw))
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map_err(usage)?;

    Ok(SimulationConfig {
        base_dir: args.base_dir.clone().unwrap_or_else(|| env.base_dir.clone()),
        intercalibs: decode_counted("intercalibs", &args.intercalibs).map_err(usage)?,
        versions,
        thicknesses,
        etas: decode_counted("etas", &args.etas).map_err(usage)?,
        pile_ups: decode_counted("pileups", &args.pileups).map_err(usage)?,
        energies,
        events: args.events,
        event_overrides,
        omit: args.omit.clone(),
        seed: args.seed,
    })
}

fn usage(message: String) -> AppError {
    AppError::new(EXIT_FAILURE, message)
}

fn version_from(v: u32) -> Result<Version, AppError> {
    Version::ALL
        .into_iter()
        .find(|version| version.as_str() == v.to_string())
        .ok_or_else(|| AppError::new(EXIT_FAILURE, format!("--versions: unknown version {v} (60 or 70)")))
}

fn thickness_from(um: u32) -> Result<Thickness, AppError> {
    Thickness::ALL
        .into_iter()
        .find(|t| t.microns() == um)
        .ok_or_else(|| AppError::new(EXIT_FAILURE, format!("--thicknesses: unknown thickness {um} (100, 200 or 300)")))
}

/// Rewrite argv so a leading flag selects `run`.
///
/// Rules:
/// - `ereso --tag v1 ...`          -> `ereso run --tag v1 ...`
/// - `ereso --help/--version/-h`   -> unchanged
/// - `ereso --log-level debug ...` -> unchanged when a subcommand follows
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let first_command = if arg1 == "--log-level" { 3 } else { 1 };
    let is_subcommand = argv
        .get(first_command)
        .is_some_and(|s| matches!(s.as_str(), "run" | "simulate" | "show"));
    if is_subcommand {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
    }
    argv
}
