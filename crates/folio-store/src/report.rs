//! Error report file IO

use crate::atomic::write_json_atomic;
use crate::{Result, StoreError};
use folio_domain::ErrorEntry;
use std::path::Path;
use tracing::warn;

/// Load a prior run's error report
///
/// A missing file is an empty report. A corrupt file is logged and treated as
/// empty, so a damaged report never blocks a rerun.
pub fn load_error_report(path: &Path) -> Result<Vec<ErrorEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    match serde_json::from_str(&text) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            warn!("Ignoring unreadable error report {}: {}", path.display(), e);
            Ok(Vec::new())
        }
    }
}

/// Write the error report (a JSON list of entries) atomically
pub fn save_error_report(path: &Path, entries: &[ErrorEntry]) -> Result<()> {
    write_json_atomic(path, entries)
}
