//! File-per-record stage store

use crate::atomic::write_json_atomic;
use crate::{Result, StoreError};
use folio_domain::{StageKey, StageRecord, StageStore};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stage store keeping one JSON file per (document hash, module)
///
/// Layout: `<root>/<source_hash>/<stage_name>.json`. Unreadable or corrupt
/// files are logged and skipped by [`load_all`](StageStore::load_all) so that
/// one bad file does not block a resume; the unit is simply re-run.
#[derive(Debug, Clone)]
pub struct JsonStageStore {
    root: PathBuf,
}

impl JsonStageStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`
    pub fn record_path(&self, key: &StageKey) -> PathBuf {
        self.root
            .join(&key.source_hash)
            .join(format!("{}.json", key.stage_name))
    }

    fn read_record(path: &Path) -> Result<StageRecord> {
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn check_key(key: &StageKey) -> Result<()> {
        let safe = |part: &str| {
            !part.is_empty() && !part.contains(['/', '\\']) && part != "." && part != ".."
        };
        if safe(&key.source_hash) && safe(&key.stage_name) {
            Ok(())
        } else {
            Err(StoreError::InvalidData(format!("unsafe stage key: {}", key)))
        }
    }
}

impl StageStore for JsonStageStore {
    type Error = StoreError;

    fn load_all(&self) -> Result<Vec<StageRecord>> {
        let mut records = Vec::new();
        let docs = std::fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;

        for doc in docs {
            let doc = doc.map_err(|e| StoreError::io(&self.root, e))?;
            let doc_path = doc.path();
            if !doc_path.is_dir() {
                continue;
            }
            let files = std::fs::read_dir(&doc_path).map_err(|e| StoreError::io(&doc_path, e))?;
            for file in files {
                let path = file.map_err(|e| StoreError::io(&doc_path, e))?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                match Self::read_record(&path) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping unreadable stage output {}: {}", path.display(), e),
                }
            }
        }

        records.sort_by(|a, b| a.key().cmp(&b.key()));
        debug!("Loaded {} stage outputs from {}", records.len(), self.root.display());
        Ok(records)
    }

    fn get(&self, key: &StageKey) -> Result<Option<StageRecord>> {
        Self::check_key(key)?;
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn put(&self, record: &StageRecord) -> Result<()> {
        let key = record.key();
        Self::check_key(&key)?;
        write_json_atomic(&self.record_path(&key), record)
    }
}
