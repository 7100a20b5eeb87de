//! OpenAI-compatible Provider Implementation
//!
//! Talks to any endpoint implementing `POST {base_url}/chat/completions`.
//!
//! # Features
//!
//! - Bearer-token auth with a per-request credential
//! - `json_schema` / `json_object` structured output modes
//! - HTTP status classification into retryable and fatal errors
//!
//! Retries are not performed here; one call is one request.

use crate::config::StructuredMode;
use crate::LlmError;
use async_trait::async_trait;
use folio_domain::{Provider, ProviderError, ProviderRequest};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// Provider for OpenAI-compatible chat completion APIs
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    model: String,
    structured_mode: StructuredMode,
    extra_headers: HashMap<String, String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Create a provider bound to one model
    ///
    /// # Examples
    ///
    /// ```
    /// use folio_llm::{OpenAiCompatibleProvider, StructuredMode};
    ///
    /// let provider = OpenAiCompatibleProvider::new(
    ///     "openai",
    ///     "https://api.openai.com/v1",
    ///     "gpt-4o-mini",
    ///     StructuredMode::JsonSchema,
    /// ).unwrap();
    /// ```
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        structured_mode: StructuredMode,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            structured_mode,
            extra_headers: HashMap::new(),
            client,
        })
    }

    /// Add headers sent with every request
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = headers;
        self
    }

    fn response_format(&self, schema: &Value, structured: bool) -> Option<Value> {
        if !structured {
            return None;
        }
        match self.structured_mode {
            StructuredMode::JsonSchema => Some(json!({
                "type": "json_schema",
                "json_schema": { "name": "extraction", "schema": schema }
            })),
            StructuredMode::JsonObject => Some(json!({ "type": "json_object" })),
            StructuredMode::None => None,
        }
    }
}

/// Map a non-success HTTP status to a provider error
pub(crate) fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited(message)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ProviderError::Transient(message)
    } else if status == StatusCode::BAD_REQUEST && body.contains("response_format") {
        ProviderError::StructuredOutputUnsupported(message)
    } else {
        ProviderError::Fatal(message)
    }
}

/// Map a transport error to a provider error
pub(crate) fn classify_transport(
    error: &reqwest::Error,
    timeout: std::time::Duration,
) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Transient(format!("Request failed: {}", error))
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: request.system_prompt },
                ChatMessage { role: "user", content: request.user_prompt },
            ],
            response_format: self.response_format(request.schema, request.structured),
        };

        let mut builder = self.client.post(&url).timeout(request.timeout).json(&body);
        for (header, value) in &self.extra_headers {
            builder = builder.header(header, value);
        }
        if let Some(key) = request.credential {
            builder = builder.bearer_auth(key);
        }

        debug!("POST {} (model {})", url, self.model);
        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport(&e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| classify_transport(&e, request.timeout))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::Transient("Empty completion".to_string()))
    }
}
