//! Energy-point resolution: which grid energies of a dataset group are usable.
//!
//! Every grid entry is opened once per group; the loaded trees are shared by
//! all signal regions and passes of the group.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::data::{DatasetError, DatasetSource, EnergyTree};
use crate::domain::{DatasetGroup, MIN_EVENTS};
use crate::error::StageError;
use crate::io::paths;

/// Why a dataset was left out.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipCause {
    Unreadable(String),
    MissingCollection,
    TooFewEvents { count: usize },
}

impl SkipCause {
    pub fn label(&self) -> &'static str {
        match self {
            SkipCause::Unreadable(_) => "unreadable",
            SkipCause::MissingCollection => "missing-collection",
            SkipCause::TooFewEvents { .. } => "too-few-events",
        }
    }
}

impl fmt::Display for SkipCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipCause::Unreadable(reason) => write!(f, "unreadable: {reason}"),
            SkipCause::MissingCollection => f.write_str("collection Energies/Ereso not found"),
            SkipCause::TooFewEvents { count } => write!(f, "{count} events, need {MIN_EVENTS}"),
        }
    }
}

impl From<DatasetError> for SkipCause {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Unreadable(reason) => SkipCause::Unreadable(reason),
            DatasetError::MissingCollection => SkipCause::MissingCollection,
        }
    }
}

/// Status of one grid entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyPointState {
    pub pt: u32,
    pub path: PathBuf,
    pub event_count: usize,
    pub skip: Option<SkipCause>,
}

/// A usable grid entry with its loaded tree.
#[derive(Debug, Clone)]
pub struct ValidEnergy {
    pub pt: u32,
    /// Index in the requested grid.
    pub original_index: usize,
    pub tree: EnergyTree,
}

#[derive(Debug, Clone)]
pub struct ResolvedEnergies {
    pub group: DatasetGroup,
    /// One entry per requested energy, in grid order.
    pub states: Vec<EnergyPointState>,
    /// Usable energies, compacted, in grid order.
    pub valid: Vec<ValidEnergy>,
}

impl ResolvedEnergies {
    pub fn find(&self, pt: u32) -> Option<&ValidEnergy> {
        self.valid.iter().find(|v| v.pt == pt)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &EnergyPointState> {
        self.states.iter().filter(|s| s.skip.is_some())
    }
}

/// Open every requested energy of `group` and keep those with enough events.
pub fn resolve_energies(
    source: &dyn DatasetSource,
    base_dir: &Path,
    group: &DatasetGroup,
    energies: &[u32],
) -> Result<ResolvedEnergies, StageError> {
    let mut states = Vec::with_capacity(energies.len());
    let mut valid = Vec::new();

    for (original_index, &pt) in energies.iter().enumerate() {
        let path = paths::dataset_path(base_dir, group, pt);
        let opened = source.open(&path).map_err(SkipCause::from).and_then(|tree| {
            if tree.entries() < MIN_EVENTS {
                Err(SkipCause::TooFewEvents { count: tree.entries() })
            } else {
                Ok(tree)
            }
        });

        match opened {
            Ok(tree) => {
                debug!(pt, events = tree.entries(), path = %path.display(), "energy point usable");
                states.push(EnergyPointState {
                    pt,
                    path,
                    event_count: tree.entries(),
                    skip: None,
                });
                valid.push(ValidEnergy {
                    pt,
                    original_index,
                    tree,
                });
            }
            Err(cause) => {
                let event_count = match cause {
                    SkipCause::TooFewEvents { count } => count,
                    _ => 0,
                };
                warn!(%group, pt, path = %path.display(), reason = %cause, "skipping energy point");
                states.push(EnergyPointState {
                    pt,
                    path,
                    event_count,
                    skip: Some(cause),
                });
            }
        }
    }

    if valid.is_empty() {
        return Err(StageError::NoValidEnergies {
            point: group.to_string(),
        });
    }
    info!(
        %group,
        valid = valid.len(),
        requested = energies.len(),
        "resolved energy points"
    );

    Ok(ResolvedEnergies {
        group: *group,
        states,
        valid,
    })
}
