//! Stage execution: one request, parse, validate, classify

use crate::parser::parse_llm_response;
use crate::prompt::RenderedPrompt;
use crate::validation::validate_output;
use folio_domain::{FailureKind, Module, Provider, ProviderError, ProviderRequest};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// A failed attempt, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// Failure class, as written to the error report
    pub kind: FailureKind,

    /// Human-readable message
    pub message: String,
}

impl StageFailure {
    /// Create a failure
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of one stage attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Parsed and validated output
    Success {
        /// The module's output object
        output: Map<String, Value>,
        /// Characters in the raw response
        response_chars: usize,
    },

    /// A retry may succeed
    Retryable {
        /// What went wrong
        failure: StageFailure,
        /// Characters in the raw response, if one arrived
        response_chars: usize,
    },

    /// Retrying is pointless
    Fatal(StageFailure),
}

/// Map a provider error to an outcome
///
/// Whether to retry comes from [`ProviderError::is_retryable`]; this only
/// picks the failure kind written to the error report.
pub fn classify_provider_error(error: &ProviderError) -> StageOutcome {
    let kind = match error {
        ProviderError::RateLimited(_) | ProviderError::Transient(_) => FailureKind::ProviderError,
        ProviderError::Timeout(_) => FailureKind::Timeout,
        ProviderError::StructuredOutputUnsupported(_) => FailureKind::StructuredOutputUnsupported,
        ProviderError::Fatal(_) => FailureKind::FatalProviderError,
    };
    let failure = StageFailure::new(kind, error.to_string());
    if error.is_retryable() {
        StageOutcome::Retryable {
            failure,
            response_chars: 0,
        }
    } else {
        StageOutcome::Fatal(failure)
    }
}

/// One stage invocation's inputs
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    /// Module being executed
    pub module: &'a Module,

    /// Rendered prompts (document content and prior context already inside)
    pub prompt: &'a RenderedPrompt,

    /// Credential to use, if the provider takes one
    pub credential: Option<&'a str>,

    /// Request schema-constrained output
    pub structured: bool,
}

/// Sends exactly one request per `execute` call
pub struct StageExecutor {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl StageExecutor {
    /// Create an executor with a per-request timeout
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Provider name
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Model name
    pub fn model_name(&self) -> &str {
        self.provider.model()
    }

    /// Execute one attempt
    ///
    /// The timeout is passed to the provider and also enforced here, so a
    /// provider that ignores it still cannot stall a worker.
    pub async fn execute(&self, request: StageRequest<'_>) -> StageOutcome {
        let provider_request = ProviderRequest {
            system_prompt: &request.prompt.system,
            user_prompt: &request.prompt.user,
            schema: &request.module.schema,
            timeout: self.timeout,
            credential: request.credential,
            structured: request.structured,
        };

        let response = match timeout(self.timeout, self.provider.send(provider_request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return classify_provider_error(&error),
            Err(_) => return classify_provider_error(&ProviderError::Timeout(self.timeout)),
        };

        let response_chars = response.chars().count();
        debug!(
            "Stage '{}' response: {} chars",
            request.module.name, response_chars
        );

        let value = match parse_llm_response(&response) {
            Ok(value) => value,
            Err(message) => {
                return StageOutcome::Retryable {
                    failure: StageFailure::new(FailureKind::ParseError, message),
                    response_chars,
                }
            }
        };

        match validate_output(value, request.module) {
            Ok(output) => StageOutcome::Success {
                output,
                response_chars,
            },
            Err(message) => StageOutcome::Retryable {
                failure: StageFailure::new(
                    FailureKind::ValidationError,
                    format!("Schema validation failed: {}", message),
                ),
                response_chars,
            },
        }
    }
}
