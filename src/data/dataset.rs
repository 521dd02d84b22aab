//! Per-energy simulated datasets.
//!
//! A dataset file holds named groups of named collections; the sweep reads
//! the `Energies/Ereso` collection, an [`EnergyTree`] with per-event,
//! per-signal-region, per-layer deposited energies (MIPs).
//!
//! Opening goes through [`DatasetSource`] so the resolver does not care where
//! trees come from (JSON files on disk, in-memory fixtures, ...).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SignalRegion;

/// Group holding the energy collections.
pub const ENERGY_GROUP: &str = "Energies";
/// Collection with the per-event energy sums.
pub const ENERGY_COLLECTION: &str = "Ereso";

/// One simulated shower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowerEvent {
    /// Deposited energy indexed as `[signal region][layer]`.
    pub sr: Vec<Vec<f64>>,
}

/// The event collection of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyTree {
    pub layers: usize,
    pub events: Vec<ShowerEvent>,
}

impl EnergyTree {
    pub fn entries(&self) -> usize {
        self.events.len()
    }

    /// Energy summed over all layers of a signal region.
    pub fn total_energy(&self, event: &ShowerEvent, sr: SignalRegion) -> f64 {
        event
            .sr
            .get(sr.index())
            .map(|layers| layers.iter().sum())
            .unwrap_or(0.0)
    }

    /// Energy summed over the last `n_back` layers of a signal region.
    pub fn back_energy(&self, event: &ShowerEvent, sr: SignalRegion, n_back: usize) -> f64 {
        event
            .sr
            .get(sr.index())
            .map(|layers| {
                let start = layers.len().saturating_sub(n_back);
                layers[start..].iter().sum()
            })
            .unwrap_or(0.0)
    }

    /// Total energy of every event for a signal region.
    pub fn totals(&self, sr: SignalRegion) -> Vec<f64> {
        self.events.iter().map(|ev| self.total_energy(ev, sr)).collect()
    }
}

/// On-disk layout: `groups -> collections -> tree`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetFile {
    pub groups: BTreeMap<String, BTreeMap<String, EnergyTree>>,
}

impl DatasetFile {
    /// A file holding `tree` as `Energies/Ereso`.
    pub fn with_energy_tree(tree: EnergyTree) -> Self {
        let mut collections = BTreeMap::new();
        collections.insert(ENERGY_COLLECTION.to_string(), tree);
        let mut groups = BTreeMap::new();
        groups.insert(ENERGY_GROUP.to_string(), collections);
        Self { groups }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DatasetError {
    #[error("cannot be opened: {0}")]
    Unreadable(String),
    #[error("collection Energies/Ereso not found")]
    MissingCollection,
}

/// Where energy trees come from.
pub trait DatasetSource {
    fn open(&self, path: &Path) -> Result<EnergyTree, DatasetError>;
}

/// Reads [`DatasetFile`] JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDatasetSource;

impl DatasetSource for JsonDatasetSource {
    fn open(&self, path: &Path) -> Result<EnergyTree, DatasetError> {
        let file = File::open(path).map_err(|e| DatasetError::Unreadable(e.to_string()))?;
        let mut dataset: DatasetFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DatasetError::Unreadable(e.to_string()))?;
        dataset
            .groups
            .get_mut(ENERGY_GROUP)
            .and_then(|collections| collections.remove(ENERGY_COLLECTION))
            .ok_or(DatasetError::MissingCollection)
    }
}

/// Write a dataset file, creating parent directories.
pub fn write_dataset(path: &Path, dataset: &DatasetFile) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), dataset).map_err(std::io::Error::other)
}
