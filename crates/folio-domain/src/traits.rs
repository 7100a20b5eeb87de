//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the orchestrator and
//! infrastructure. Implementations live in other crates.

use crate::stage::{StageKey, StageRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a provider, tagged by whether a retry may help
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider asked us to slow down (HTTP 429 or equivalent)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Network failure or server-side error
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Request did not complete within its timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Provider does not accept the structured output request format
    #[error("Structured output not supported: {0}")]
    StructuredOutputUnsupported(String),

    /// Invalid credentials, unknown model, malformed request
    #[error("Provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Fatal(_))
    }
}

/// A single request to a provider
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    /// Rendered system prompt
    pub system_prompt: &'a str,

    /// Rendered user prompt
    pub user_prompt: &'a str,

    /// JSON schema for structured output
    pub schema: &'a Value,

    /// Per-request timeout
    pub timeout: Duration,

    /// API key, if the provider uses one
    pub credential: Option<&'a str>,

    /// Ask the provider for schema-constrained output
    pub structured: bool,
}

/// Trait for LLM providers
///
/// Implemented by the infrastructure layer (folio-llm). A provider instance is
/// bound to one model; routing between providers happens before the
/// orchestrator sees them.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, recorded in outputs
    fn name(&self) -> &str;

    /// Model name, recorded in outputs
    fn model(&self) -> &str;

    /// Send one request and return the raw response text
    async fn send(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError>;
}

/// Trait for storing stage outputs
///
/// Implemented by the infrastructure layer (folio-store). Writes must be
/// atomic: a crash mid-write leaves the previous record intact.
pub trait StageStore: Send + Sync {
    /// Error type for store operations
    type Error;

    /// Load every persisted record
    fn load_all(&self) -> Result<Vec<StageRecord>, Self::Error>;

    /// Get a record by key
    fn get(&self, key: &StageKey) -> Result<Option<StageRecord>, Self::Error>;

    /// Insert or overwrite a record
    fn put(&self, record: &StageRecord) -> Result<(), Self::Error>;
}
