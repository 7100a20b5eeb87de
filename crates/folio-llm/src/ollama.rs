//! Ollama Provider Implementation
//!
//! Provides integration with Ollama's local chat API. Local models need no
//! credential, so any key handed to `send` is ignored.
//!
//! # Examples
//!
//! ```no_run
//! use folio_llm::OllamaProvider;
//!
//! let provider = OllamaProvider::new("http://localhost:11434", "llama3.1").unwrap();
//! ```

use crate::config::{StructuredMode, DEFAULT_OLLAMA_BASE_URL};
use crate::openai::{classify_status, classify_transport};
use crate::LlmError;
use async_trait::async_trait;
use folio_domain::{Provider, ProviderError, ProviderRequest};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ollama API provider for local LLM inference
pub struct OllamaProvider {
    name: String,
    endpoint: String,
    model: String,
    structured_mode: StructuredMode,
    client: reqwest::Client,
}

/// Request body for Ollama chat API
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Response from Ollama chat API
#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (e.g., "llama3.1", "qwen2.5")
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            name: "ollama".to_string(),
            endpoint: endpoint.into(),
            model: model.into(),
            structured_mode: StructuredMode::JsonObject,
            client,
        })
    }

    /// Create a new Ollama provider on the default local endpoint
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(DEFAULT_OLLAMA_BASE_URL, model)
    }

    /// Set the name reported in outputs
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the structured output mode
    pub fn with_structured_mode(mut self, mode: StructuredMode) -> Self {
        self.structured_mode = mode;
        self
    }

    fn format(&self, schema: &Value, structured: bool) -> Option<Value> {
        if !structured {
            return None;
        }
        match self.structured_mode {
            StructuredMode::JsonSchema => Some(schema.clone()),
            StructuredMode::JsonObject => Some(Value::String("json".to_string())),
            StructuredMode::None => None,
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.endpoint);

        let body = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage { role: "system", content: request.system_prompt },
                OllamaMessage { role: "user", content: request.user_prompt },
            ],
            stream: false,
            format: self.format(request.schema, request.structured),
        };

        let response = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e, request.timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::Fatal(format!(
                "Model not available: {}",
                self.model
            )));
        }
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &text));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Failed to parse response: {}", e)))?;

        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3.1").unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434");
        assert_eq!(provider.model(), "llama3.1");
        assert_eq!(provider.structured_mode, StructuredMode::JsonObject);
    }

    #[test]
    fn test_ollama_provider_default_endpoint() {
        let provider = OllamaProvider::default_endpoint("mistral").unwrap();
        assert_eq!(provider.endpoint, DEFAULT_OLLAMA_BASE_URL);
    }

    #[test]
    fn test_format_follows_mode() {
        let schema = json!({"type": "object"});
        let provider = OllamaProvider::default_endpoint("m").unwrap();
        assert_eq!(provider.format(&schema, true), Some(json!("json")));
        assert_eq!(provider.format(&schema, false), None);

        let provider = provider.with_structured_mode(StructuredMode::JsonSchema);
        assert_eq!(provider.format(&schema, true), Some(schema.clone()));
    }

    // Integration tests (requires running Ollama)
    #[tokio::test]
    #[ignore]
    async fn test_ollama_send_integration() {
        let provider = OllamaProvider::default_endpoint("llama3.1").unwrap();
        let schema = json!({});
        let result = provider
            .send(ProviderRequest {
                system_prompt: "Reply with a JSON object.",
                user_prompt: "Say hello",
                schema: &schema,
                timeout: Duration::from_secs(60),
                credential: None,
                structured: true,
            })
            .await;
        if let Ok(response) = result {
            assert!(!response.is_empty());
        }
    }

    #[tokio::test]
    async fn test_ollama_error_handling() {
        let provider = OllamaProvider::new("http://localhost:1", "llama3.1").unwrap();
        let schema = json!({});
        let result = provider
            .send(ProviderRequest {
                system_prompt: "s",
                user_prompt: "u",
                schema: &schema,
                timeout: Duration::from_secs(2),
                credential: None,
                structured: false,
            })
            .await;

        match result {
            Err(ProviderError::Transient(_)) | Err(ProviderError::Timeout(_)) => {}
            other => panic!("Expected transient error, got {:?}", other),
        }
    }
}
