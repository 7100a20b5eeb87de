//! In-memory stage store

use folio_domain::{StageKey, StageRecord, StageStore};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard};

/// Stage store backed by a map; nothing touches the filesystem
#[derive(Debug, Default)]
pub struct MemoryStageStore {
    records: Mutex<BTreeMap<StageKey, StageRecord>>,
}

impl MemoryStageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = StageRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.key(), r)).collect();
        Self {
            records: Mutex::new(map),
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<StageKey, StageRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StageStore for MemoryStageStore {
    type Error = Infallible;

    fn load_all(&self) -> Result<Vec<StageRecord>, Infallible> {
        Ok(self.lock().values().cloned().collect())
    }

    fn get(&self, key: &StageKey) -> Result<Option<StageRecord>, Infallible> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, record: &StageRecord) -> Result<(), Infallible> {
        self.lock().insert(record.key(), record.clone());
        Ok(())
    }
}
