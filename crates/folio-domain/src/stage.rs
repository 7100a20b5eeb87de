//! Stage records - persisted module outputs and failures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Key of a persisted stage output: (document hash, module name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StageKey {
    /// Content hash of the document
    pub source_hash: String,

    /// Module name
    pub stage_name: String,
}

impl StageKey {
    /// Create a key
    pub fn new(source_hash: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self {
            source_hash: source_hash.into(),
            stage_name: stage_name.into(),
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_hash, self.stage_name)
    }
}

/// Persisted output of one module for one document
///
/// At most one record exists per [`StageKey`]; a later successful run
/// overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Path the document was read from when this record was produced
    pub source_path: String,

    /// Content hash of the document
    pub source_hash: String,

    /// Template identifier
    pub prompt_template: String,

    /// Module name
    pub stage_name: String,

    /// Output language hint used in the prompt
    pub output_language: String,

    /// Prompt hash of the module at generation time
    pub prompt_hash: String,

    /// Provider name
    #[serde(default)]
    pub provider: String,

    /// Model name
    #[serde(default)]
    pub model: String,

    /// Whether the document content was truncated before sending
    #[serde(default)]
    pub source_truncated: bool,

    /// When the output was produced
    pub extracted_at: DateTime<Utc>,

    /// The module's validated output object
    pub output: Value,
}

impl StageRecord {
    /// Key of this record
    pub fn key(&self) -> StageKey {
        StageKey::new(&self.source_hash, &self.stage_name)
    }

    /// Whether this record was produced by the given prompt hash
    pub fn is_current(&self, prompt_hash: &str) -> bool {
        self.prompt_hash == prompt_hash
    }
}

/// Classification of a failed stage attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rate limit or transient network/server error
    ProviderError,

    /// Request exceeded the per-request timeout
    Timeout,

    /// Response was not JSON, even after repair
    ParseError,

    /// Response JSON did not satisfy the module schema
    ValidationError,

    /// Provider rejected structured output mode
    StructuredOutputUnsupported,

    /// Non-retryable provider error (bad credentials, unknown model)
    FatalProviderError,
}

impl FailureKind {
    /// Whether this failure is attributable to the credential/provider rather
    /// than the response content
    pub fn cools_key(&self) -> bool {
        matches!(self, FailureKind::ProviderError | FailureKind::Timeout)
    }

    /// Stable string form used in error reports
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ProviderError => "provider_error",
            FailureKind::Timeout => "timeout",
            FailureKind::ParseError => "parse_error",
            FailureKind::ValidationError => "validation_error",
            FailureKind::StructuredOutputUnsupported => "structured_output_unsupported",
            FailureKind::FatalProviderError => "fatal_provider_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a run's error report: a module that exhausted its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Path of the failing document
    pub source_path: String,

    /// Content hash of the failing document
    #[serde(default)]
    pub source_hash: String,

    /// Module that failed
    pub stage_name: String,

    /// Failure classification
    pub error_type: FailureKind,

    /// Human-readable message
    pub error_message: String,
}

/// Merge module outputs into one aggregate object
///
/// Each output's top-level fields are copied into the result. Modules write
/// disjoint field sets, so the result does not depend on input order.
/// Non-object outputs are ignored.
pub fn merge_stage_outputs<'a, I>(outputs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut merged = Map::new();
    for output in outputs {
        if let Some(fields) = output.as_object() {
            for (field, value) in fields {
                merged.insert(field.clone(), value.clone());
            }
        }
    }
    merged
}
