//! Persistence manager
//!
//! Holds the in-memory view of every stage record loaded at startup, answers
//! skip decisions from it, and writes each successful module through to the
//! stage store before the document's next module starts. The aggregate file
//! is rewritten after every persisted module; each document's merged result
//! is cached and only recomputed when one of its modules changes.

use crate::config::ExtractorConfig;
use crate::error::{ExtractorError, Result};
use folio_domain::{
    merge_stage_outputs, Document, ErrorEntry, Module, StageKey, StageRecord, StageStore,
    TaskUnit, Template,
};
use folio_store::{load_aggregate, load_error_report, save_aggregate, save_error_report, AggregateOutput};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use tokio::sync::Mutex as AsyncMutex;

/// Where a run writes its result files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Aggregate result file
    pub aggregate: PathBuf,

    /// Error report file
    pub error_report: PathBuf,

    /// Directory for one file per document, if split output is enabled
    pub split_dir: Option<PathBuf>,
}

impl OutputPaths {
    /// `results.json` and `errors.json` inside `dir`, no split output
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            aggregate: dir.join("results.json"),
            error_report: dir.join("errors.json"),
            split_dir: None,
        }
    }

    /// Enable split output
    pub fn with_split_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.split_dir = Some(dir.into());
        self
    }
}

/// What the queue builder needs to know about earlier runs
pub trait PriorOutputs {
    /// A stored output exists for this module and matches its prompt hash
    fn has_current(&self, source_hash: &str, module: &str) -> bool;

    /// Modules recorded as failed for this document in the prior error report
    fn failed_modules(&self, source_hash: &str, source_path: &str) -> Vec<String>;
}

/// Provenance attached to a new stage record
#[derive(Debug, Clone, Copy)]
pub struct RecordMeta<'a> {
    /// Provider that produced the output
    pub provider: &'a str,

    /// Model that produced the output
    pub model: &'a str,

    /// Whether the document was truncated before sending
    pub truncated: bool,
}

/// Owns the stage store for the duration of a run
pub struct PersistenceManager<S> {
    store: S,
    template: Arc<Template>,
    output_language: String,
    allow_partial: bool,
    paths: OutputPaths,
    prompt_hashes: HashMap<String, String>,
    records: Mutex<HashMap<StageKey, StageRecord>>,
    prior_errors: Vec<ErrorEntry>,
    prior_papers: Vec<Value>,
    merged: Mutex<HashMap<String, Option<Value>>>,
    aggregate_lock: AsyncMutex<()>,
}

impl<S> PersistenceManager<S>
where
    S: StageStore,
    S::Error: Display,
{
    /// Load stage records, the prior error report and the prior aggregate
    pub fn load(
        store: S,
        template: Arc<Template>,
        config: &ExtractorConfig,
        paths: OutputPaths,
    ) -> Result<Self> {
        let records: HashMap<StageKey, StageRecord> = store
            .load_all()
            .map_err(ExtractorError::store)?
            .into_iter()
            .map(|record| (record.key(), record))
            .collect();

        let prompt_hashes = template
            .modules
            .iter()
            .map(|module| (module.name.clone(), module.prompt_hash()))
            .collect();

        let prior_errors = load_error_report(&paths.error_report)?;
        let prior_papers = match load_aggregate(&paths.aggregate)? {
            Some(aggregate) if aggregate.template_tag == template.name => aggregate.papers,
            Some(aggregate) => {
                info!(
                    "Ignoring {} prior results from template '{}'",
                    aggregate.papers.len(),
                    aggregate.template_tag
                );
                Vec::new()
            }
            None => Vec::new(),
        };

        info!(
            "Loaded {} stage outputs, {} prior errors, {} prior results",
            records.len(),
            prior_errors.len(),
            prior_papers.len()
        );

        Ok(Self {
            store,
            template,
            output_language: config.output_language.clone(),
            allow_partial: config.allow_partial,
            paths,
            prompt_hashes,
            records: Mutex::new(records),
            prior_errors,
            prior_papers,
            merged: Mutex::new(HashMap::new()),
            aggregate_lock: AsyncMutex::new(()),
        })
    }

    /// Output file locations
    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    fn records(&self) -> MutexGuard<'_, HashMap<StageKey, StageRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn merged(&self) -> MutexGuard<'_, HashMap<String, Option<Value>>> {
        self.merged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current_record(&self, record: &StageRecord) -> bool {
        self.prompt_hashes
            .get(&record.stage_name)
            .is_some_and(|hash| record.is_current(hash))
    }

    /// The stored output for a module, if it is current
    pub fn current_output(&self, source_hash: &str, module: &str) -> Option<Value> {
        self.records()
            .get(&StageKey::new(source_hash, module))
            .filter(|record| self.is_current_record(record))
            .map(|record| record.output.clone())
    }

    /// Whether every module of the template has a current output
    pub fn is_complete(&self, source_hash: &str) -> bool {
        self.template
            .modules
            .iter()
            .all(|module| self.has_current(source_hash, &module.name))
    }

    /// A non-forced unit is skipped when a current output exists
    ///
    /// Retry selection marks its targets forced, so they are never skipped.
    pub fn should_skip(&self, unit: &TaskUnit) -> bool {
        !unit.forced && self.has_current(&unit.source_hash, &unit.module)
    }

    /// Merged current outputs of the modules that precede `module`
    pub fn context(&self, source_hash: &str, module: &str) -> Map<String, Value> {
        let earlier: Vec<Value> = self
            .template
            .modules
            .iter()
            .take_while(|m| m.name != module)
            .filter_map(|m| self.current_output(source_hash, &m.name))
            .collect();
        merge_stage_outputs(earlier.iter())
    }

    /// Durably write a module's output, then make it visible to skip checks
    pub fn record_success(
        &self,
        document: &Document,
        module: &Module,
        output: Map<String, Value>,
        meta: RecordMeta<'_>,
    ) -> Result<StageRecord> {
        let record = StageRecord {
            source_path: document.source_path(),
            source_hash: document.hash.clone(),
            prompt_template: self.template.name.clone(),
            stage_name: module.name.clone(),
            output_language: self.output_language.clone(),
            prompt_hash: module.prompt_hash(),
            provider: meta.provider.to_string(),
            model: meta.model.to_string(),
            source_truncated: meta.truncated,
            extracted_at: chrono::Utc::now(),
            output: Value::Object(output),
        };

        self.store.put(&record).map_err(ExtractorError::store)?;
        debug!("Persisted {}", record.key());
        self.records().insert(record.key(), record.clone());
        self.merged().remove(&record.source_hash);
        Ok(record)
    }

    /// Merge a document's current outputs into one result object
    ///
    /// Returns `None` when the document has no current output, or when a
    /// module is missing and partial results are not allowed.
    pub fn merged_document(&self, document: &Document) -> Option<Value> {
        let records = self.records();
        let current: Vec<&StageRecord> = self
            .template
            .modules
            .iter()
            .filter_map(|module| records.get(&StageKey::new(&document.hash, &module.name)))
            .filter(|record| self.is_current_record(record))
            .collect();

        if current.is_empty() {
            return None;
        }
        if current.len() < self.template.modules.len() && !self.allow_partial {
            return None;
        }

        let mut merged = merge_stage_outputs(current.iter().map(|record| &record.output));
        let latest = current.iter().max_by_key(|record| record.extracted_at)?;

        merged.insert("source_path".into(), Value::String(document.source_path()));
        merged.insert("source_hash".into(), Value::String(document.hash.clone()));
        merged.insert(
            "prompt_template".into(),
            Value::String(self.template.name.clone()),
        );
        merged.insert(
            "output_language".into(),
            Value::String(latest.output_language.clone()),
        );
        merged.insert("provider".into(), Value::String(latest.provider.clone()));
        merged.insert("model".into(), Value::String(latest.model.clone()));
        merged.insert(
            "extracted_at".into(),
            Value::String(latest.extracted_at.to_rfc3339()),
        );
        merged.insert(
            "source_truncated".into(),
            Value::Bool(current.iter().any(|record| record.source_truncated)),
        );

        Some(Value::Object(merged))
    }

    /// Aggregate over `documents`, keeping prior results for documents no
    /// longer in the corpus
    ///
    /// A prior result is dropped when its path or its hash belongs to the
    /// current corpus: an edited file is represented only by its current
    /// content, or not at all until that content has a result.
    pub fn build_aggregate(&self, documents: &[Document]) -> AggregateOutput {
        let mut aggregate = AggregateOutput::new(&self.template.name);
        {
            // Held across the merge; record_success invalidates after its write
            let mut merged = self.merged();
            aggregate.papers = documents
                .iter()
                .filter_map(|document| {
                    merged
                        .entry(document.hash.clone())
                        .or_insert_with(|| self.merged_document(document))
                        .clone()
                })
                .collect();
        }

        let hashes: HashSet<&str> = documents.iter().map(|d| d.hash.as_str()).collect();
        let paths: HashSet<String> = documents.iter().map(Document::source_path).collect();
        aggregate.papers.extend(
            self.prior_papers
                .iter()
                .filter(|paper| {
                    let hash = paper.get("source_hash").and_then(Value::as_str);
                    let path = paper.get("source_path").and_then(Value::as_str);
                    hash.is_some_and(|hash| !hashes.contains(hash))
                        && !path.is_some_and(|path| paths.contains(path))
                })
                .cloned(),
        );
        aggregate
    }

    /// Rebuild and atomically rewrite the aggregate file
    ///
    /// Writers are serialized so concurrent documents never interleave. The
    /// file write runs on the blocking pool.
    pub async fn write_aggregate(&self, documents: &[Document]) -> Result<AggregateOutput> {
        let _guard = self.aggregate_lock.lock().await;
        let aggregate = self.build_aggregate(documents);
        let path = self.paths.aggregate.clone();
        let aggregate = tokio::task::spawn_blocking(move || {
            save_aggregate(&path, &aggregate).map(|()| aggregate)
        })
        .await
        .map_err(ExtractorError::store)??;
        debug!(
            "Wrote {} results to {}",
            aggregate.papers.len(),
            self.paths.aggregate.display()
        );
        Ok(aggregate)
    }

    /// Write the error report: this run's failures plus prior entries that
    /// are still unresolved
    ///
    /// A prior entry is dropped once its module has a current output or a
    /// new entry for the same unit replaces it.
    pub fn write_error_report(&self, failures: &[ErrorEntry]) -> Result<Vec<ErrorEntry>> {
        let replaced: HashSet<(&str, &str)> = failures
            .iter()
            .map(|entry| (entry.source_hash.as_str(), entry.stage_name.as_str()))
            .collect();

        let mut entries: Vec<ErrorEntry> = self
            .prior_errors
            .iter()
            .filter(|entry| {
                !replaced.contains(&(entry.source_hash.as_str(), entry.stage_name.as_str()))
                    && !self.has_current(&entry.source_hash, &entry.stage_name)
            })
            .cloned()
            .collect();
        entries.extend(failures.iter().cloned());

        save_error_report(&self.paths.error_report, &entries)?;
        Ok(entries)
    }
}

impl<S> PriorOutputs for PersistenceManager<S>
where
    S: StageStore,
    S::Error: Display,
{
    fn has_current(&self, source_hash: &str, module: &str) -> bool {
        self.records()
            .get(&StageKey::new(source_hash, module))
            .is_some_and(|record| self.is_current_record(record))
    }

    fn failed_modules(&self, source_hash: &str, source_path: &str) -> Vec<String> {
        self.prior_errors
            .iter()
            .filter(|entry| {
                entry.source_hash == source_hash
                    || (entry.source_hash.is_empty() && entry.source_path == source_path)
            })
            .map(|entry| entry.stage_name.clone())
            .collect()
    }
}
