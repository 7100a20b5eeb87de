//! Folio Extractor
//!
//! The extraction orchestrator: turns a corpus and a (possibly multi-module)
//! template into provider requests, validates the responses, and persists
//! progress so an interrupted run resumes without repeating finished work.
//!
//! # Architecture
//!
//! ```text
//! Corpus → QueueBuilder → workers → RetryController → StageExecutor → Provider
//!                                        │                 │
//!                              KeyRotator, ThrottleGovernor  PersistenceManager
//! ```
//!
//! # Key Features
//!
//! - **Resume**: stage outputs are keyed by content hash and module, and
//!   invalidated when the module's prompt changes
//! - **Retry selection**: rerun failed documents or only failed modules
//! - **Key rotation**: credentials cool down after retryable provider errors
//! - **Pacing**: a global pause after every N requests
//! - **Run summary**: character and token estimates, throughput, failures by stage
//!
//! # Example Usage
//!
//! ```no_run
//! use folio_extractor::{builtin, ExtractorConfig, Orchestrator, OutputPaths, RunOptions};
//! use folio_domain::Document;
//! use folio_llm::MockProvider;
//! use folio_store::MemoryStageStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let template = builtin("simple").unwrap();
//! let provider = Arc::new(MockProvider::new(
//!     r#"{"title": "T", "authors": ["A"], "summary": "S"}"#,
//! ));
//! let documents = vec![Document::new("paper.md", "# A paper")];
//!
//! let report = Orchestrator::new(
//!     ExtractorConfig::default(),
//!     template,
//!     provider,
//!     MemoryStageStore::new(),
//!     OutputPaths::in_dir("out"),
//! )
//! .run(&documents, &RunOptions::default())
//! .await?;
//!
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod corpus;
pub mod error;
pub mod executor;
pub mod keys;
pub mod orchestrator;
pub mod parser;
pub mod persistence;
pub mod prompt;
pub mod queue;
pub mod retry;
pub mod summary;
pub mod templates;
pub mod throttle;
pub mod validation;

pub use config::{ExtractorConfig, RunOptions, TruncateStrategy};
pub use corpus::{discover, load_documents};
pub use error::{ExtractorError, Result};
pub use executor::{classify_provider_error, StageExecutor, StageFailure, StageOutcome};
pub use keys::KeyRotator;
pub use orchestrator::{Orchestrator, RunReport};
pub use persistence::{OutputPaths, PersistenceManager, PriorOutputs};
pub use prompt::{PromptBuilder, RenderedPrompt};
pub use queue::QueueBuilder;
pub use retry::{RetryController, RetryPolicy};
pub use summary::{RunSummary, SummaryReport};
pub use templates::{builtin, builtin_names, resolve_template, DEFAULT_TEMPLATE};
pub use throttle::ThrottleGovernor;
