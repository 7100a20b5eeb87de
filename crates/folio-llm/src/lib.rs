//! Folio LLM Provider Layer
//!
//! Pluggable LLM provider implementations.
//!
//! # Architecture
//!
//! This crate provides implementations of the `Provider` trait from `folio-domain`
//! and the registry that routes a `provider/model` reference to one of them.
//!
//! # Providers
//!
//! - `MockProvider`: Scripted, deterministic provider for testing
//! - `OpenAiCompatibleProvider`: Any `/chat/completions` endpoint
//! - `OllamaProvider`: Local Ollama API integration
//!
//! # Examples
//!
//! ```
//! use folio_llm::MockProvider;
//! use folio_domain::{Provider, ProviderRequest};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let provider = MockProvider::new(r#"{"title": "Hello"}"#);
//! let schema = json!({});
//! let request = ProviderRequest {
//!     system_prompt: "sys",
//!     user_prompt: "user",
//!     schema: &schema,
//!     timeout: Duration::from_secs(5),
//!     credential: None,
//!     structured: true,
//! };
//! let result = provider.send(request).await.unwrap();
//! assert_eq!(result, r#"{"title": "Hello"}"#);
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod ollama;
pub mod openai;
pub mod registry;

use async_trait::async_trait;
use folio_domain::{Provider, ProviderError, ProviderRequest};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub use config::{resolve_api_keys, ProviderConfig, ProviderKind, StructuredMode};
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;
pub use registry::{ModelRef, ProviderRegistry, ResolvedProvider};

/// Errors that can occur while configuring or routing providers
#[derive(Error, Debug)]
pub enum LlmError {
    /// Model reference is not in `provider/model` form
    #[error("Invalid model reference '{0}': expected provider/model")]
    InvalidModelRef(String),

    /// No provider with this name is configured
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Model is not in the provider's allow-list
    #[error("Model '{model}' is not in provider '{provider}' model_list")]
    ModelNotAllowed {
        /// Provider name
        provider: String,
        /// Requested model
        model: String,
    },

    /// Provider type requires API keys but none resolved
    #[error("Provider '{0}' requires api_keys")]
    MissingApiKeys(String),

    /// Invalid provider configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(String),
}

/// A request observed by [`MockProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// System prompt as sent
    pub system_prompt: String,

    /// User prompt as sent
    pub user_prompt: String,

    /// Credential used
    pub credential: Option<String>,

    /// Whether structured output was requested
    pub structured: bool,
}

type Rule = Arc<dyn Fn(&MockCall) -> Option<Result<String, ProviderError>> + Send + Sync>;

/// Mock provider for deterministic testing
///
/// Responses are chosen in this order: the scripted queue (FIFO), then rules
/// in insertion order, then the default response. Clones share state, so a
/// test can keep a handle while the orchestrator owns another.
///
/// # Examples
///
/// ```
/// use folio_llm::MockProvider;
/// use folio_domain::ProviderError;
///
/// let provider = MockProvider::new(r#"{"ok": true}"#);
/// provider.add_response("summary", r#"{"summary": "short"}"#);
/// provider.push_error(ProviderError::RateLimited("slow down".into()));
/// assert_eq!(provider.call_count(), 0);
/// ```
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    default_response: String,
    script: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    delay: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    /// Create a MockProvider with a fixed default response
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            default_response: response.into(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            rules: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Set the reported model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sleep for `delay` inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response for the next unanswered call
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.script).push_back(Ok(response.into()));
    }

    /// Queue an error for the next unanswered call
    pub fn push_error(&self, error: ProviderError) {
        lock(&self.script).push_back(Err(error));
    }

    /// Answer calls whose system or user prompt contains `needle`
    pub fn add_response(&self, needle: impl Into<String>, response: impl Into<String>) {
        let needle = needle.into();
        let response = response.into();
        self.add_rule(move |call| {
            call_contains(call, &needle).then(|| Ok(response.clone()))
        });
    }

    /// Fail calls whose system or user prompt contains `needle`
    pub fn add_error(&self, needle: impl Into<String>, error: ProviderError) {
        let needle = needle.into();
        self.add_rule(move |call| call_contains(call, &needle).then(|| Err(error.clone())));
    }

    /// Add an arbitrary response rule
    pub fn add_rule<F>(&self, rule: F)
    where
        F: Fn(&MockCall) -> Option<Result<String, ProviderError>> + Send + Sync + 'static,
    {
        lock(&self.rules).push(Arc::new(rule));
    }

    /// Number of calls received
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Snapshot of all calls in arrival order
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    fn answer(&self, call: &MockCall) -> Result<String, ProviderError> {
        if let Some(scripted) = lock(&self.script).pop_front() {
            return scripted;
        }
        let rules: Vec<Rule> = lock(&self.rules).clone();
        for rule in rules {
            if let Some(answer) = rule(call) {
                return answer;
            }
        }
        Ok(self.default_response.clone())
    }
}

fn call_contains(call: &MockCall, needle: &str) -> bool {
    call.system_prompt.contains(needle) || call.user_prompt.contains(needle)
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("{}")
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError> {
        let call = MockCall {
            system_prompt: request.system_prompt.to_string(),
            user_prompt: request.user_prompt.to_string(),
            credential: request.credential.map(str::to_string),
            structured: request.structured,
        };
        lock(&self.calls).push(call.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.answer(&call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn send(provider: &MockProvider, user: &str) -> Result<String, ProviderError> {
        let schema = json!({});
        provider
            .send(ProviderRequest {
                system_prompt: "system",
                user_prompt: user,
                schema: &schema,
                timeout: Duration::from_secs(1),
                credential: Some("key-1"),
                structured: true,
            })
            .await
    }

    #[tokio::test]
    async fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        assert_eq!(send(&provider, "any").await.unwrap(), "Test response");
    }

    #[tokio::test]
    async fn test_mock_provider_rules() {
        let provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_error("bad", ProviderError::Fatal("nope".into()));

        assert_eq!(send(&provider, "say hello").await.unwrap(), "world");
        assert!(matches!(
            send(&provider, "bad prompt").await,
            Err(ProviderError::Fatal(_))
        ));
        assert_eq!(send(&provider, "other").await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_script_takes_precedence() {
        let provider = MockProvider::new("default");
        provider.add_response("x", "rule");
        provider.push_error(ProviderError::RateLimited("429".into()));
        provider.push_response("scripted");

        assert!(matches!(
            send(&provider, "x").await,
            Err(ProviderError::RateLimited(_))
        ));
        assert_eq!(send(&provider, "x").await.unwrap(), "scripted");
        assert_eq!(send(&provider, "x").await.unwrap(), "rule");
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let provider = MockProvider::default();
        send(&provider, "one").await.unwrap();
        send(&provider, "two").await.unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].user_prompt, "one");
        assert_eq!(calls[1].credential.as_deref(), Some("key-1"));

        provider.reset_calls();
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        send(&provider1, "test").await.unwrap();

        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }
}
