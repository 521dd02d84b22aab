//! `ereso` library crate.
//!
//! The binary (`ereso`) is a thin wrapper around this library so that:
//!
//! - the sweep engine is testable without spawning processes
//! - fit routines and renderers can be swapped behind traits
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
pub mod sweep;
