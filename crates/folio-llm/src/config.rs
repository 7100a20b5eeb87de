//! Provider configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default endpoint for OpenAI-compatible providers
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Provider backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any `/chat/completions` compatible endpoint
    OpenaiCompatible,
    /// Local Ollama server
    Ollama,
    /// Scripted provider, never leaves the process
    Mock,
}

/// How structured output is requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredMode {
    /// Send the module schema as a JSON schema constraint
    JsonSchema,
    /// Ask for any JSON object
    JsonObject,
    /// Plain text completion
    None,
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in `provider/model` references
    pub name: String,

    /// Backend type
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    /// API base URL; defaults per backend type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API keys; `env:NAME` entries are read from the environment
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Structured output mode; defaults per backend type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_mode: Option<StructuredMode>,

    /// Headers added to every request
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,

    /// Allowed models; empty means any
    #[serde(default)]
    pub model_list: Vec<String>,
}

impl ProviderConfig {
    /// Create a config with defaults for the given type
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: None,
            api_keys: Vec::new(),
            structured_mode: None,
            extra_headers: HashMap::new(),
            model_list: Vec::new(),
        }
    }

    /// Effective base URL
    pub fn base_url(&self) -> String {
        match (&self.base_url, self.kind) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, ProviderKind::Ollama) => DEFAULT_OLLAMA_BASE_URL.to_string(),
            (None, _) => DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }

    /// Effective structured output mode
    pub fn structured_mode(&self) -> StructuredMode {
        self.structured_mode.unwrap_or(match self.kind {
            ProviderKind::Ollama => StructuredMode::JsonObject,
            _ => StructuredMode::JsonSchema,
        })
    }

    /// Whether this backend type cannot work without an API key
    pub fn requires_api_keys(&self) -> bool {
        matches!(self.kind, ProviderKind::OpenaiCompatible)
    }

    /// API keys with `env:` indirection resolved
    pub fn resolved_api_keys(&self) -> Vec<String> {
        resolve_api_keys(&self.api_keys)
    }

    /// Check the model is in the allow-list (if any)
    pub fn allows_model(&self, model: &str) -> bool {
        self.model_list.is_empty() || self.model_list.iter().any(|m| m == model)
    }
}

/// Resolve `env:NAME` entries from the environment
///
/// Literal entries pass through. Unset or empty variables are dropped.
pub fn resolve_api_keys(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match entry.strip_prefix("env:") {
            Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
            None => Some(entry.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_kind() {
        let ollama = ProviderConfig::new("local", ProviderKind::Ollama);
        assert_eq!(ollama.base_url(), DEFAULT_OLLAMA_BASE_URL);
        assert_eq!(ollama.structured_mode(), StructuredMode::JsonObject);
        assert!(!ollama.requires_api_keys());

        let openai = ProviderConfig::new("cloud", ProviderKind::OpenaiCompatible);
        assert_eq!(openai.base_url(), DEFAULT_OPENAI_BASE_URL);
        assert_eq!(openai.structured_mode(), StructuredMode::JsonSchema);
        assert!(openai.requires_api_keys());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mut config = ProviderConfig::new("c", ProviderKind::OpenaiCompatible);
        config.base_url = Some("http://proxy/v1/".to_string());
        assert_eq!(config.base_url(), "http://proxy/v1");
    }

    #[test]
    fn test_resolve_api_keys_env_indirection() {
        std::env::set_var("FOLIO_TEST_KEY_PRESENT", "secret");
        std::env::remove_var("FOLIO_TEST_KEY_ABSENT");
        let keys = resolve_api_keys(&[
            "literal".to_string(),
            "env:FOLIO_TEST_KEY_PRESENT".to_string(),
            "env:FOLIO_TEST_KEY_ABSENT".to_string(),
        ]);
        assert_eq!(keys, vec!["literal", "secret"]);
    }

    #[test]
    fn test_model_allow_list() {
        let mut config = ProviderConfig::new("c", ProviderKind::Mock);
        assert!(config.allows_model("anything"));
        config.model_list = vec!["gpt-4o-mini".to_string()];
        assert!(config.allows_model("gpt-4o-mini"));
        assert!(!config.allows_model("gpt-4o"));
    }

    #[test]
    fn test_deserialize_from_json_shape() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"name": "cloud", "type": "openai_compatible", "api_keys": ["k1", "k2"],
                "structured_mode": "none"}"#,
        )
        .unwrap();
        assert_eq!(config.kind, ProviderKind::OpenaiCompatible);
        assert_eq!(config.structured_mode(), StructuredMode::None);
        assert_eq!(config.api_keys.len(), 2);
    }
}
