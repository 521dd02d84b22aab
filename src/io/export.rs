//! Export the run summary to CSV.
//!
//! One row per (sweep point, pass); easy to load in spreadsheets or scripts.

use std::path::Path;

use crate::error::{AppError, EXIT_FAILURE};
use crate::report::SummaryRow;

/// Write summary rows to `path`, creating parent directories.
pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(EXIT_FAILURE, format!("Failed to create '{}': {e}", parent.display()))
        })?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(EXIT_FAILURE, format!("Failed to create summary CSV '{}': {e}", path.display()))
    })?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(EXIT_FAILURE, format!("Failed to write summary CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(EXIT_FAILURE, format!("Failed to flush summary CSV: {e}")))?;
    Ok(())
}
