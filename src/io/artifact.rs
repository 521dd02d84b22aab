//! File-scoped fit artifacts.
//!
//! Every sweep point and pass owns one JSON artifact file holding named records:
//! graphs (with the fit functions attached to them) and histograms. The store
//! makes the reuse-vs-recompute branching explicit:
//!
//! - `read`: optional lookup, used to inspect what a previous run left behind
//! - `must_exist`: lookup that is fatal when the artifact is absent
//! - `create_or_replace`: overwrite by name (within a run and across runs)
//!
//! Nothing reaches disk before `commit`, which writes through a temporary file
//! and a rename so a crash never leaves a half-written artifact file.
//!
//! Keys are kept in a `BTreeMap` and floats are written by `serde_json` with
//! shortest round-trip formatting: a read-back reproduces parameters exactly.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{CalibrationModel, ResolutionModel};
use crate::error::StageError;
use crate::math::Histogram;

/// Name of the linear calibration function attached to calibration graphs.
pub const CALIBRATION_FUNCTION: &str = "calib";
/// Name of the resolution-model function attached to resolution graphs.
pub const RESOLUTION_FUNCTION: &str = "reso";

const FORMAT_VERSION: u32 = 1;

/// One graph point with symmetric errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphPoint {
    pub x: f64,
    pub y: f64,
    pub ex: f64,
    pub ey: f64,
}

/// Parameters of a function fitted to a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFunction {
    pub name: String,
    pub params: Vec<f64>,
    pub errors: Vec<f64>,
    pub chi2: f64,
    pub ndf: u32,
}

/// Points with errors plus the functions fitted to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub points: Vec<GraphPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FitFunction>,
}

impl Graph {
    pub fn push(&mut self, x: f64, y: f64, ex: f64, ey: f64) {
        self.points.push(GraphPoint { x, y, ex, ey });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn function(&self, name: &str) -> Option<&FitFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Attach a function, replacing any previous one with the same name.
    pub fn set_function(&mut self, function: FitFunction) {
        self.functions.retain(|f| f.name != function.name);
        self.functions.push(function);
    }

    /// `y` of the first point whose `x` equals `x` (within 1e-9).
    pub fn y_at(&self, x: f64) -> Option<f64> {
        self.points
            .iter()
            .find(|p| (p.x - x).abs() < 1e-9)
            .map(|p| p.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Artifact {
    Graph(Graph),
    Histogram(Histogram),
}

impl Artifact {
    pub fn as_graph(&self) -> Option<&Graph> {
        match self {
            Artifact::Graph(g) => Some(g),
            Artifact::Histogram(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Graph(_) => "graph",
            Artifact::Histogram(_) => "histogram",
        }
    }
}

impl From<&CalibrationModel> for FitFunction {
    fn from(model: &CalibrationModel) -> Self {
        FitFunction {
            name: CALIBRATION_FUNCTION.to_string(),
            params: vec![model.offset, model.slope],
            errors: vec![model.offset_err, model.slope_err],
            chi2: model.chi2,
            ndf: model.ndf,
        }
    }
}

impl From<&ResolutionModel> for FitFunction {
    fn from(model: &ResolutionModel) -> Self {
        FitFunction {
            name: RESOLUTION_FUNCTION.to_string(),
            params: vec![model.stochastic, model.constant, model.noise],
            errors: vec![model.stochastic_err, model.constant_err, model.noise_err],
            chi2: model.chi2,
            ndf: model.ndf,
        }
    }
}

impl FitFunction {
    pub fn calibration(&self) -> Option<CalibrationModel> {
        match (self.params.as_slice(), self.errors.as_slice()) {
            ([offset, slope], [offset_err, slope_err]) => Some(CalibrationModel {
                slope: *slope,
                slope_err: *slope_err,
                offset: *offset,
                offset_err: *offset_err,
                chi2: self.chi2,
                ndf: self.ndf,
            }),
            _ => None,
        }
    }

    pub fn resolution(&self) -> Option<ResolutionModel> {
        match (self.params.as_slice(), self.errors.as_slice()) {
            ([s, c, n], [se, ce, ne]) => Some(ResolutionModel {
                stochastic: *s,
                stochastic_err: *se,
                constant: *c,
                constant_err: *ce,
                noise: *n,
                noise_err: *ne,
                chi2: self.chi2,
                ndf: self.ndf,
            }),
            _ => None,
        }
    }
}

/// Named-artifact access used by the sweep engine.
pub trait ArtifactStore {
    /// Where the artifacts live (for diagnostics).
    fn location(&self) -> &Path;

    fn read(&self, key: &str) -> Option<&Artifact>;

    fn create_or_replace(&mut self, key: &str, artifact: Artifact);

    fn must_exist(&self, key: &str) -> Result<&Artifact, StageError> {
        self.read(key).ok_or_else(|| StageError::MissingCachedArtifact {
            key: key.to_string(),
            path: self.location().to_path_buf(),
            reason: "not found".to_string(),
        })
    }

    /// A graph that must exist.
    fn must_exist_graph(&self, key: &str) -> Result<&Graph, StageError> {
        let artifact = self.must_exist(key)?;
        artifact
            .as_graph()
            .ok_or_else(|| StageError::MissingCachedArtifact {
                key: key.to_string(),
                path: self.location().to_path_buf(),
                reason: format!("stored as a {}, expected a graph", artifact.kind()),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The file must exist; `commit` is refused.
    Read,
    /// Load existing artifacts if any; the file is created on open.
    CreateOrUpdate,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArtifactDocument {
    format: u32,
    artifacts: BTreeMap<String, Artifact>,
}

/// JSON-backed [`ArtifactStore`] scoped to one output file.
#[derive(Debug)]
pub struct ArtifactFile {
    path: PathBuf,
    mode: OpenMode,
    artifacts: BTreeMap<String, Artifact>,
}

impl ArtifactFile {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self, StageError> {
        let artifacts = if path.exists() {
            read_document(path)?.artifacts
        } else if mode == OpenMode::Read {
            return Err(StageError::resource("artifact file", path, "file does not exist"));
        } else {
            BTreeMap::new()
        };

        let file = Self {
            path: path.to_path_buf(),
            mode,
            artifacts,
        };
        if mode == OpenMode::CreateOrUpdate && !path.exists() {
            // Fail now, before any fitting, if the file cannot be created.
            file.commit()?;
        }
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Artifact)> {
        self.artifacts.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Persist every artifact to disk.
    pub fn commit(&self) -> Result<(), StageError> {
        if self.mode == OpenMode::Read {
            return Err(StageError::resource(
                "artifact file",
                &self.path,
                "opened read-only",
            ));
        }

        let tmp = self.path.with_extension("json.tmp");
        let file = File::create(&tmp).map_err(|e| StageError::resource("artifact file", &tmp, e))?;
        let doc = ArtifactDocument {
            format: FORMAT_VERSION,
            artifacts: self.artifacts.clone(),
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &doc)
            .map_err(|e| StageError::resource("artifact file", &tmp, e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StageError::resource("artifact file", &self.path, e))?;
        Ok(())
    }
}

impl ArtifactStore for ArtifactFile {
    fn location(&self) -> &Path {
        &self.path
    }

    fn read(&self, key: &str) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    fn create_or_replace(&mut self, key: &str, artifact: Artifact) {
        self.artifacts.insert(key.to_string(), artifact);
    }
}

fn read_document(path: &Path) -> Result<ArtifactDocument, StageError> {
    let file = File::open(path).map_err(|e| StageError::resource("artifact file", path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| StageError::resource("artifact file", path, format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> CalibrationModel {
        CalibrationModel {
            slope: 81.234_567_890_123,
            slope_err: 0.1,
            offset: -3.3,
            offset_err: 0.7,
            chi2: 4.5,
            ndf: 6,
        }
    }

    #[test]
    fn create_or_update_creates_file_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let _store = ArtifactFile::open(&path, OpenMode::CreateOrUpdate).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn read_mode_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactFile::open(&dir.path().join("absent.json"), OpenMode::Read).unwrap_err();
        assert!(matches!(err, StageError::ResourceUnavailable { .. }));
    }

    #[test]
    fn open_fails_when_directory_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/out.json");
        assert!(ArtifactFile::open(&path, OpenMode::CreateOrUpdate).is_err());
    }

    #[test]
    fn committed_calibration_reads_back_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut store = ArtifactFile::open(&path, OpenMode::CreateOrUpdate).unwrap();
        let mut graph = Graph::default();
        graph.push(10.0, 812.0, 0.0, 1.5);
        graph.set_function(FitFunction::from(&calibration()));
        store.create_or_replace("calibRecoFitRaw", Artifact::Graph(graph));
        store.commit().unwrap();

        let reread = ArtifactFile::open(&path, OpenMode::Read).unwrap();
        let graph = reread.must_exist_graph("calibRecoFitRaw").unwrap();
        let model = graph
            .function(CALIBRATION_FUNCTION)
            .and_then(FitFunction::calibration)
            .unwrap();
        assert_eq!(model, calibration());
    }

    #[test]
    fn previous_run_artifacts_survive_until_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut first = ArtifactFile::open(&path, OpenMode::CreateOrUpdate).unwrap();
        first.create_or_replace("corrBackLeakFit", Artifact::Graph(Graph::default()));
        first.create_or_replace("resoRecoFit", Artifact::Graph(Graph::default()));
        first.commit().unwrap();

        let mut second = ArtifactFile::open(&path, OpenMode::CreateOrUpdate).unwrap();
        assert!(second.read("corrBackLeakFit").is_some());

        let mut replaced = Graph::default();
        replaced.push(1.0, 2.0, 0.0, 0.1);
        second.create_or_replace("resoRecoFit", Artifact::Graph(replaced.clone()));
        second.commit().unwrap();

        let third = ArtifactFile::open(&path, OpenMode::Read).unwrap();
        assert_eq!(third.must_exist_graph("resoRecoFit").unwrap(), &replaced);
        assert_eq!(third.keys().count(), 2);
    }

    #[test]
    fn must_exist_distinguishes_missing_and_mistyped() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactFile::open(&dir.path().join("out.json"), OpenMode::CreateOrUpdate).unwrap();
        store.create_or_replace("energy10_SR0", Artifact::Histogram(Histogram::new(4, 0.0, 1.0)));

        assert!(matches!(
            store.must_exist("calibRecoFitRaw"),
            Err(StageError::MissingCachedArtifact { .. })
        ));
        assert!(matches!(
            store.must_exist_graph("energy10_SR0"),
            Err(StageError::MissingCachedArtifact { .. })
        ));
    }

    #[test]
    fn read_only_store_refuses_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        ArtifactFile::open(&path, OpenMode::CreateOrUpdate).unwrap();
        let store = ArtifactFile::open(&path, OpenMode::Read).unwrap();
        assert!(store.commit().is_err());
    }

    #[test]
    fn graph_functions_are_replaced_by_name() {
        let mut graph = Graph::default();
        graph.set_function(FitFunction::from(&calibration()));
        let mut other = calibration();
        other.slope = 1.0;
        graph.set_function(FitFunction::from(&other));
        assert_eq!(graph.functions.len(), 1);
        assert_eq!(
            graph.function(CALIBRATION_FUNCTION).and_then(FitFunction::calibration).map(|c| c.slope),
            Some(1.0)
        );
    }
}
