//! Error types.
//!
//! Two layers:
//!
//! - [`StageError`]: the fatal failures of the sweep engine. Any of these
//!   unwinds to the sweep boundary and aborts the run.
//! - [`AppError`]: the process-boundary error carrying an exit code and a
//!   printable message.
//!
//! Soft failures (a single energy point excluded from the graphs) are not
//! errors; they are `sweep::outcome::SkipReason` values.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for every fatal condition (bad arguments included).
pub const EXIT_FAILURE: u8 = 1;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<StageError> for AppError {
    fn from(err: StageError) -> Self {
        AppError::new(EXIT_FAILURE, err.to_string())
    }
}

/// Which SweepPoint-level fit reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStage {
    Leakage,
    Calibration,
    Resolution,
    PileUpNoise,
}

impl std::fmt::Display for FitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FitStage::Leakage => "leakage correction",
            FitStage::Calibration => "calibration",
            FitStage::Resolution => "resolution model",
            FitStage::PileUpNoise => "pile-up noise",
        };
        f.write_str(name)
    }
}

/// Fatal failures of the sweep engine.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource unavailable: {what} '{}': {reason}", path.display())]
    ResourceUnavailable {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("no valid energy point for {point}")]
    NoValidEnergies { point: String },

    #[error("energy distribution for {point} could not be built: {reason}")]
    DistributionUnavailable { point: String, reason: String },

    #[error("{stage} fit failed for {point}: {reason}")]
    FitFailure {
        stage: FitStage,
        point: String,
        reason: String,
    },

    #[error("cached artifact '{key}' missing from '{}': {reason}", path.display())]
    MissingCachedArtifact {
        key: String,
        path: PathBuf,
        reason: String,
    },
}

impl StageError {
    pub fn resource(what: &'static str, path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StageError::ResourceUnavailable {
            what,
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_map_to_exit_code_one() {
        let err = StageError::NoValidEnergies {
            point: "IC3 v60 200u eta2.0 pu0".to_string(),
        };
        let app: AppError = err.into();
        assert_eq!(app.exit_code(), EXIT_FAILURE);
        assert!(app.to_string().contains("eta2.0"));
    }

    #[test]
    fn missing_artifact_message_names_key_and_path() {
        let err = StageError::MissingCachedArtifact {
            key: "calibRecoFitRaw".to_string(),
            path: PathBuf::from("/tmp/out_raw.json"),
            reason: "not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("calibRecoFitRaw"));
        assert!(msg.contains("/tmp/out_raw.json"));
    }
}
