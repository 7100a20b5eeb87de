//! Run orchestration
//!
//! ```text
//! corpus × template → QueueBuilder → per-document chains
//!     → worker pool (buffer_unordered)
//!         → RetryController → StageExecutor → Provider
//!         → PersistenceManager (stage record, aggregate)
//! ```
//!
//! One worker owns a document's chain, so its modules run in template order
//! and its stage files are never written concurrently.

use crate::config::{ExtractorConfig, RunOptions};
use crate::error::{ExtractorError, Result};
use crate::executor::StageExecutor;
use crate::keys::KeyRotator;
use crate::persistence::{OutputPaths, PersistenceManager, RecordMeta};
use crate::prompt::{truncate, PromptBuilder};
use crate::queue::{group_by_document, QueueBuilder};
use crate::retry::RetryController;
use crate::summary::{RunSummary, SummaryReport};
use crate::throttle::ThrottleGovernor;
use folio_domain::{
    Document, ErrorEntry, Provider, StageStore, TaskUnit, Template, TemplateError, UnitStatus,
};
use folio_store::write_split;
use futures::stream::{self, StreamExt};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// What a run did
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Final counters
    pub summary: SummaryReport,

    /// Every scheduled unit with its terminal status, in queue order
    pub units: Vec<TaskUnit>,

    /// Units that failed in this run
    pub failures: Vec<ErrorEntry>,

    /// Documents in the aggregate file
    pub aggregate_documents: usize,

    /// Split files written
    pub split_files: Vec<PathBuf>,
}

impl RunReport {
    /// Units that ended in `status`
    pub fn count(&self, status: UnitStatus) -> usize {
        self.units.iter().filter(|u| u.status == status).count()
    }
}

/// Drives one extraction run
pub struct Orchestrator<S> {
    config: ExtractorConfig,
    template: Arc<Template>,
    provider: Arc<dyn Provider>,
    api_keys: Vec<String>,
    structured: bool,
    store: S,
    paths: OutputPaths,
}

impl<S> Orchestrator<S>
where
    S: StageStore,
    S::Error: Display,
{
    /// Create an orchestrator
    pub fn new(
        config: ExtractorConfig,
        template: Template,
        provider: Arc<dyn Provider>,
        store: S,
        paths: OutputPaths,
    ) -> Self {
        Self {
            config,
            template: Arc::new(template),
            provider,
            api_keys: Vec::new(),
            structured: true,
            store,
            paths,
        }
    }

    /// Credentials to rotate through
    pub fn with_api_keys(mut self, keys: Vec<String>) -> Self {
        self.api_keys = keys;
        self
    }

    /// Never ask the provider for schema-constrained output
    pub fn without_structured_output(mut self) -> Self {
        self.structured = false;
        self
    }

    /// Run over `documents`
    ///
    /// Configuration problems abort before any request. Unit failures do
    /// not: they land in the error report and the summary. A stage store
    /// write failure aborts the run.
    pub async fn run(self, documents: &[Document], options: &RunOptions) -> Result<RunReport> {
        self.config.validate().map_err(ExtractorError::Config)?;
        options.validate().map_err(ExtractorError::Config)?;

        let Orchestrator {
            config,
            template,
            provider,
            api_keys,
            structured,
            store,
            paths,
        } = self;

        let persistence = PersistenceManager::load(store, template.clone(), &config, paths)?;
        let units = QueueBuilder::new(&template, options).build(documents, &persistence)?;

        let summary = Arc::new(RunSummary::new());
        RunSummary::add(
            &summary.documents_total,
            options.range(documents.len()).len() as u64,
        );
        RunSummary::add(&summary.units_scheduled, units.len() as u64);
        let chains = group_by_document(units);

        let worker = DocumentWorker {
            config: &config,
            template: &template,
            documents,
            persistence: &persistence,
            summary: &summary,
        };

        if options.dry_run {
            let units = chains
                .into_iter()
                .map(|(index, chain)| worker.plan(index, chain))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect();
            let report = summary.snapshot(true);
            info!("Dry run complete\n{}", report);
            return Ok(RunReport {
                summary: report,
                units,
                failures: Vec::new(),
                aggregate_documents: 0,
                split_files: Vec::new(),
            });
        }

        let keys = Arc::new(KeyRotator::new(api_keys, config.key_cooldown()));
        let throttle = Arc::new(ThrottleGovernor::new(config.sleep_every, config.sleep_time()));
        let mut retry =
            RetryController::new(config.retry_policy(), keys, throttle, summary.clone());
        if !structured {
            retry = retry.without_structured_output();
        }
        let executor = StageExecutor::new(provider, config.timeout());

        info!(
            "Extracting {} documents with {}/{} (template '{}', concurrency {})",
            chains.len(),
            executor.provider_name(),
            executor.model_name(),
            template.name,
            config.max_concurrency
        );

        let worker = &worker;
        let retry = &retry;
        let executor = &executor;
        let outcomes: Vec<ChainOutcome> = stream::iter(chains)
            .map(move |(index, chain)| worker.process(index, chain, retry, executor))
            .buffer_unordered(config.max_concurrency)
            .collect()
            .await;

        let mut units = Vec::new();
        let mut failures = Vec::new();
        let mut first_error = None;
        for outcome in outcomes {
            units.extend(outcome.units);
            failures.extend(outcome.failures);
            if let Some(e) = outcome.error {
                error!("Document chain aborted: {}", e);
                first_error.get_or_insert(e);
            }
        }

        // Record what did fail before surfacing a store error
        let report_entries = persistence.write_error_report(&failures)?;
        if let Some(e) = first_error {
            return Err(e);
        }

        units.sort_by_key(|u| (u.doc_index, template.position(&u.module)));
        let aggregate = persistence.write_aggregate(documents).await?;
        let split_files = match &persistence.paths().split_dir {
            Some(dir) => write_split(dir, &aggregate.papers)?,
            None => Vec::new(),
        };

        let report = summary.snapshot(false);
        info!("{}", report);
        if !report_entries.is_empty() {
            info!(
                "{} unresolved failures in {}",
                report_entries.len(),
                persistence.paths().error_report.display()
            );
        }

        Ok(RunReport {
            summary: report,
            units,
            failures,
            aggregate_documents: aggregate.papers.len(),
            split_files,
        })
    }
}

/// What one document chain did, including the failures recorded before
/// an aborting error
struct ChainOutcome {
    units: Vec<TaskUnit>,
    failures: Vec<ErrorEntry>,
    error: Option<ExtractorError>,
}

/// Per-run state shared by every document chain
struct DocumentWorker<'a, S> {
    config: &'a ExtractorConfig,
    template: &'a Template,
    documents: &'a [Document],
    persistence: &'a PersistenceManager<S>,
    summary: &'a RunSummary,
}

impl<S> DocumentWorker<'_, S>
where
    S: StageStore,
    S::Error: Display,
{
    /// Drive one document's modules in order
    ///
    /// A failed module does not stop the chain; later modules run with
    /// whatever earlier output is current. A store error does stop it, and
    /// is returned alongside the failures already collected.
    async fn process(
        &self,
        index: usize,
        chain: Vec<TaskUnit>,
        retry: &RetryController,
        executor: &StageExecutor,
    ) -> ChainOutcome {
        let mut outcome = ChainOutcome {
            units: Vec::with_capacity(chain.len()),
            failures: Vec::new(),
            error: None,
        };
        if let Err(e) = self.drive(index, chain, retry, executor, &mut outcome).await {
            outcome.error = Some(e);
        }
        outcome
    }

    async fn drive(
        &self,
        index: usize,
        chain: Vec<TaskUnit>,
        retry: &RetryController,
        executor: &StageExecutor,
        outcome: &mut ChainOutcome,
    ) -> Result<()> {
        let document = &self.documents[index];
        let content = truncate(
            &document.content,
            self.config.truncate_max_chars,
            self.config.truncate_strategy,
        );
        if content.truncated {
            debug!(
                "Truncated {} from {} chars",
                document.path.display(),
                content.original_chars
            );
        }
        let input_chars = content.text.chars().count();

        for mut unit in chain {
            let module = self
                .template
                .module(&unit.module)
                .ok_or_else(|| TemplateError::UnknownModule(unit.module.clone()))?;

            if self.persistence.should_skip(&unit) {
                debug!("Skipping {} / {}: output is current", document.path.display(), module.name);
                unit.transition(UnitStatus::Skipped);
                RunSummary::add(&self.summary.units_skipped, 1);
                outcome.units.push(unit);
                continue;
            }

            unit.transition(UnitStatus::Running);
            let context = self.persistence.context(&document.hash, &module.name);
            let prompt = PromptBuilder::new(module, &content.text, &self.config.output_language)
                .with_context(&context)
                .build();

            match retry.run(executor, module, &prompt, input_chars).await {
                Ok(success) => {
                    self.persistence.record_success(
                        document,
                        module,
                        success.output,
                        RecordMeta {
                            provider: executor.provider_name(),
                            model: executor.model_name(),
                            truncated: content.truncated,
                        },
                    )?;
                    self.persistence.write_aggregate(self.documents).await?;
                    unit.transition(UnitStatus::Succeeded);
                    RunSummary::add(&self.summary.units_succeeded, 1);
                }
                Err(failure) => {
                    self.summary.record_stage_failure(&module.name);
                    outcome.failures.push(ErrorEntry {
                        source_path: document.source_path(),
                        source_hash: document.hash.clone(),
                        stage_name: module.name.clone(),
                        error_type: failure.kind,
                        error_message: failure.message,
                    });
                    unit.transition(UnitStatus::Failed);
                }
            }
            outcome.units.push(unit);
        }

        RunSummary::add(&self.summary.documents_processed, 1);
        Ok(())
    }

    /// Dry-run counterpart of [`process`](Self::process): render, count, send nothing
    fn plan(&self, index: usize, chain: Vec<TaskUnit>) -> Result<Vec<TaskUnit>> {
        let document = &self.documents[index];
        let content = truncate(
            &document.content,
            self.config.truncate_max_chars,
            self.config.truncate_strategy,
        );
        let input_chars = content.text.chars().count();

        let mut units = Vec::with_capacity(chain.len());
        for mut unit in chain {
            let module = self
                .template
                .module(&unit.module)
                .ok_or_else(|| TemplateError::UnknownModule(unit.module.clone()))?;

            if self.persistence.should_skip(&unit) {
                unit.transition(UnitStatus::Skipped);
                RunSummary::add(&self.summary.units_skipped, 1);
            } else {
                let context = self.persistence.context(&document.hash, &module.name);
                let prompt =
                    PromptBuilder::new(module, &content.text, &self.config.output_language)
                        .with_context(&context)
                        .build();
                self.summary.record_planned(input_chars, prompt.char_count());
            }
            units.push(unit);
        }

        RunSummary::add(&self.summary.documents_processed, 1);
        Ok(units)
    }
}
