//! Corpus discovery
//!
//! Inputs are files or directories. Directories are walked recursively for
//! files matching a suffix pattern (`*.md` by default). The resulting document
//! list is stable across runs: paths are canonicalized, deduplicated and
//! sorted, then documents with identical content are collapsed.

use crate::error::{ExtractorError, Result};
use folio_domain::Document;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default discovery pattern
pub const DEFAULT_PATTERN: &str = "*.md";

/// Find input files
///
/// Explicit file inputs are always included, whatever their extension.
/// `pattern` applies to directory walks only; `*.txt` and `.txt` both match
/// files ending in `.txt`.
pub fn discover(inputs: &[PathBuf], pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let suffix = pattern
        .unwrap_or(DEFAULT_PATTERN)
        .trim_start_matches("**/")
        .trim_start_matches('*')
        .to_string();

    let mut found = BTreeSet::new();
    for input in inputs {
        let path = input
            .canonicalize()
            .map_err(|e| ExtractorError::io(input, e))?;
        if path.is_dir() {
            walk(&path, &suffix, &mut found)?;
        } else {
            found.insert(path);
        }
    }

    debug!("Discovered {} files", found.len());
    Ok(found.into_iter().collect())
}

fn walk(dir: &Path, suffix: &str, found: &mut BTreeSet<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| ExtractorError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ExtractorError::io(dir, e))?.path();
        if path.is_dir() {
            walk(&path, suffix, found)?;
        } else if path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(suffix))
        {
            let canonical = path.canonicalize().map_err(|e| ExtractorError::io(&path, e))?;
            found.insert(canonical);
        }
    }
    Ok(())
}

/// Read documents, dropping later paths whose content duplicates an earlier one
///
/// Files that are not UTF-8 text are skipped with a warning.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(paths.len());

    for path in paths {
        let bytes = std::fs::read(path).map_err(|e| ExtractorError::io(path, e))?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {}: not valid UTF-8 ({})", path.display(), e.utf8_error());
                continue;
            }
        };
        let document = Document::new(path.clone(), content);
        if seen.insert(document.hash.clone()) {
            documents.push(document);
        } else {
            warn!("Skipping {}: same content as an earlier document", path.display());
        }
    }

    Ok(documents)
}
