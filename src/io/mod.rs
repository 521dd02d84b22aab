//! Input/output helpers.
//!
//! - dataset and output naming (`paths`)
//! - per-pass artifact files (`artifact`)
//! - run summary export to CSV (`export`)

pub mod artifact;
pub mod export;
pub mod paths;

pub use artifact::{Artifact, ArtifactFile, ArtifactStore, Graph, OpenMode};
pub use export::write_summary_csv;
