//! Dataset and output naming scheme.
//!
//! Inputs:  `<base>/version<v>/model2/gamma/<t>u/eta<etaX10>_et<pT>[_Pu<pu>]_IC<ic>.json`
//!
//! Outputs: `<save>/<tag>/version<v>/model2/gamma/<t>u/SR<sr>/IC<ic>_pu<pu>_SR<sr>_Eta<etaX10>[_vsE][_backLeakCor][_raw].json`

use std::path::{Path, PathBuf};

use crate::domain::{DatasetGroup, StageFlags, SweepPoint};

/// Path of the dataset generated at `pt` for a configuration group.
pub fn dataset_path(base_dir: &Path, group: &DatasetGroup, pt: u32) -> PathBuf {
    let mut name = format!("eta{}_et{}", group.eta_x10(), pt);
    if group.pile_up > 0 {
        name.push_str(&format!("_Pu{}", group.pile_up));
    }
    name.push_str(&format!("_IC{}.json", group.intercalib));

    base_dir
        .join(format!("version{}", group.version))
        .join(group.thickness.scenario())
        .join(name)
}

/// Directory holding every output of a signal region.
pub fn output_dir(output_root: &Path, point: &SweepPoint) -> PathBuf {
    output_root
        .join(format!("version{}", point.version))
        .join(point.thickness.scenario())
        .join(point.signal_region.to_string())
}

/// File stem shared by the artifact file and the per-pass plots.
pub fn artifact_stem(point: &SweepPoint, flags: &StageFlags) -> String {
    let mut stem = format!(
        "IC{}_pu{}_SR{}_Eta{}",
        point.intercalib,
        point.pile_up,
        point.signal_region.index(),
        point.eta_x10()
    );
    if flags.vs_e {
        stem.push_str("_vsE");
    }
    if flags.do_back_leak_cor {
        stem.push_str("_backLeakCor");
    }
    if point.pass.is_raw() {
        stem.push_str("_raw");
    }
    stem
}

pub fn artifact_path(output_root: &Path, point: &SweepPoint, flags: &StageFlags) -> PathBuf {
    output_dir(output_root, point).join(format!("{}.json", artifact_stem(point, flags)))
}

/// Directory of the per-energy distribution plots.
pub fn energy_plot_dir(output_root: &Path, point: &SweepPoint) -> PathBuf {
    output_dir(output_root, point).join("Ereco")
}

pub fn energy_plot_path(output_root: &Path, point: &SweepPoint, pt: u32, flags: &StageFlags) -> PathBuf {
    let mut name = format!("Ereco_eta{}_pu{}", point.eta_x10(), point.pile_up);
    if point.pass.is_raw() {
        name.push_str("raw");
    }
    name.push_str(&format!("_E{}_SR{}", pt, point.signal_region.index()));
    if flags.do_back_leak_cor {
        name.push_str("backLeakCor");
    }
    energy_plot_dir(output_root, point).join(format!("{name}.svg"))
}

/// Per-pass summary plot, e.g. `calib_IC3_pu0_SR2_Eta20_vsE_raw.svg`.
pub fn graph_plot_path(output_root: &Path, point: &SweepPoint, flags: &StageFlags, kind: &str) -> PathBuf {
    output_dir(output_root, point).join(format!("{kind}_{}.svg", artifact_stem(point, flags)))
}
