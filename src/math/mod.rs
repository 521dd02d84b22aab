//! Numerical utilities: histograms and weighted least squares.

pub mod histogram;
pub mod ols;

pub use histogram::*;
pub use ols::*;
