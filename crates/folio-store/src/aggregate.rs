//! Aggregate result file and per-document split output

use crate::atomic::write_json_atomic;
use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The aggregate output file: `{ "template_tag": ..., "papers": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateOutput {
    /// Template identifier the results were produced with
    pub template_tag: String,

    /// One merged object per document
    #[serde(default)]
    pub papers: Vec<Value>,
}

impl AggregateOutput {
    /// Create an empty aggregate for a template
    pub fn new(template_tag: impl Into<String>) -> Self {
        Self {
            template_tag: template_tag.into(),
            papers: Vec::new(),
        }
    }

    /// Find a paper by `source_hash`
    pub fn find(&self, source_hash: &str) -> Option<&Value> {
        self.papers
            .iter()
            .find(|paper| paper.get("source_hash").and_then(Value::as_str) == Some(source_hash))
    }
}

/// Load an aggregate file, if present and readable
pub fn load_aggregate(path: &Path) -> Result<Option<AggregateOutput>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    match serde_json::from_str(&text) {
        Ok(aggregate) => Ok(Some(aggregate)),
        Err(e) => {
            warn!("Ignoring unreadable aggregate {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Write an aggregate file atomically
pub fn save_aggregate(path: &Path, aggregate: &AggregateOutput) -> Result<()> {
    write_json_atomic(path, aggregate)
}

/// Build a collision-free split file stem for a document
///
/// The stem is the source file stem with anything outside `[A-Za-z0-9._-]`
/// replaced by `_`. When the stem is taken, the first 8 hex digits of the
/// content hash are appended, then a counter.
pub fn split_file_name(source_path: &str, source_hash: &str, used: &mut HashSet<String>) -> String {
    let stem = Path::new(source_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut base: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if base.is_empty() {
        base = "document".to_string();
    }

    let short_hash: String = source_hash.chars().take(8).collect();
    let mut candidates = vec![base.clone()];
    if !short_hash.is_empty() {
        candidates.push(format!("{}_{}", base, short_hash));
    }

    let name = candidates
        .into_iter()
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| {
            let mut n = 2usize;
            loop {
                let candidate = format!("{}_{}", base, n);
                if !used.contains(&candidate) {
                    break candidate;
                }
                n += 1;
            }
        });

    used.insert(name.clone());
    name
}

/// Write each paper to its own file under `dir`, returning the paths written
pub fn write_split(dir: &Path, papers: &[Value]) -> Result<Vec<PathBuf>> {
    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(papers.len());

    for paper in papers {
        let Some(source_path) = paper.get("source_path").and_then(Value::as_str) else {
            continue;
        };
        let source_hash = paper
            .get("source_hash")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let name = split_file_name(source_path, source_hash, &mut used);
        let path = dir.join(format!("{}.json", name));
        write_json_atomic(&path, paper)?;
        written.push(path);
    }

    debug!("Wrote {} split files to {}", written.len(), dir.display());
    Ok(written)
}
