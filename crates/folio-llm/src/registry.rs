//! Provider registry for routing `provider/model` references
//!
//! The orchestrator never interprets a model reference. The registry splits
//! it, finds the configured provider and builds a client bound to the model.

use crate::config::{ProviderConfig, ProviderKind};
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiCompatibleProvider;
use crate::{LlmError, MockProvider};
use folio_domain::Provider;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A parsed `provider/model` reference
///
/// Only the first `/` separates the parts, so model names may contain
/// slashes (`openrouter/meta-llama/llama-3.1-8b`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    /// Configured provider name
    pub provider: String,

    /// Model name passed to the provider
    pub model: String,
}

impl ModelRef {
    /// Parse a `provider/model` string
    ///
    /// # Examples
    ///
    /// ```
    /// use folio_llm::ModelRef;
    ///
    /// let model = ModelRef::parse("local/llama3.1").unwrap();
    /// assert_eq!(model.provider, "local");
    /// assert_eq!(model.model, "llama3.1");
    /// assert!(ModelRef::parse("no-slash").is_err());
    /// ```
    pub fn parse(reference: &str) -> Result<Self, LlmError> {
        match reference.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok(Self {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
            _ => Err(LlmError::InvalidModelRef(reference.to_string())),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// A provider client ready for use, with its resolved credentials
pub struct ResolvedProvider {
    /// Client bound to the requested model
    pub provider: Arc<dyn Provider>,

    /// API keys after `env:` resolution; empty when the backend needs none
    pub api_keys: Vec<String>,

    /// The configuration the client was built from
    pub config: ProviderConfig,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("api_keys", &self.api_keys.len())
            .finish()
    }
}

/// Configured providers, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    /// Create a registry from provider configs
    ///
    /// A later entry with the same name replaces an earlier one.
    pub fn new(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let mut registry = Self::default();
        for config in configs {
            registry.register(config);
        }
        registry
    }

    /// Add or replace a provider config
    pub fn register(&mut self, config: ProviderConfig) {
        self.providers.insert(config.name.clone(), config);
    }

    /// Provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up a provider config by name
    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Resolve a `provider/model` reference into a ready client
    ///
    /// Fails when the provider is unknown, the model is outside its
    /// allow-list, or a key-based backend has no key after resolution.
    pub fn resolve(&self, reference: &str) -> Result<ResolvedProvider, LlmError> {
        let model_ref = ModelRef::parse(reference)?;
        let config = self
            .providers
            .get(&model_ref.provider)
            .ok_or_else(|| LlmError::UnknownProvider(model_ref.provider.clone()))?;

        if !config.allows_model(&model_ref.model) {
            return Err(LlmError::ModelNotAllowed {
                provider: config.name.clone(),
                model: model_ref.model,
            });
        }

        let api_keys = config.resolved_api_keys();
        if config.requires_api_keys() && api_keys.is_empty() {
            return Err(LlmError::MissingApiKeys(config.name.clone()));
        }

        let provider: Arc<dyn Provider> = match config.kind {
            ProviderKind::OpenaiCompatible => Arc::new(
                OpenAiCompatibleProvider::new(
                    &config.name,
                    config.base_url(),
                    &model_ref.model,
                    config.structured_mode(),
                )?
                .with_extra_headers(config.extra_headers.clone()),
            ),
            ProviderKind::Ollama => Arc::new(
                OllamaProvider::new(config.base_url(), &model_ref.model)?
                    .with_name(&config.name)
                    .with_structured_mode(config.structured_mode()),
            ),
            ProviderKind::Mock => Arc::new(MockProvider::default().with_model(&model_ref.model)),
        };

        debug!(
            "Resolved {} to {:?} backend with {} key(s)",
            model_ref,
            config.kind,
            api_keys.len()
        );

        Ok(ResolvedProvider {
            provider,
            api_keys,
            config: config.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        let mut cloud = ProviderConfig::new("cloud", ProviderKind::OpenaiCompatible);
        cloud.api_keys = vec!["k1".to_string(), "k2".to_string()];
        cloud.model_list = vec!["gpt-4o-mini".to_string()];

        let keyless = ProviderConfig::new("nokeys", ProviderKind::OpenaiCompatible);
        let local = ProviderConfig::new("local", ProviderKind::Ollama);
        let mock = ProviderConfig::new("mock", ProviderKind::Mock);

        ProviderRegistry::new([cloud, keyless, local, mock])
    }

    #[test]
    fn test_model_ref_allows_slashes_in_model() {
        let model = ModelRef::parse("openrouter/meta-llama/llama-3.1-8b").unwrap();
        assert_eq!(model.provider, "openrouter");
        assert_eq!(model.model, "meta-llama/llama-3.1-8b");
        assert_eq!(model.to_string(), "openrouter/meta-llama/llama-3.1-8b");
    }

    #[test]
    fn test_model_ref_rejects_empty_parts() {
        assert!(ModelRef::parse("/model").is_err());
        assert!(ModelRef::parse("provider/").is_err());
    }

    #[test]
    fn test_resolve_openai_compatible() {
        let resolved = registry().resolve("cloud/gpt-4o-mini").unwrap();
        assert_eq!(resolved.provider.name(), "cloud");
        assert_eq!(resolved.provider.model(), "gpt-4o-mini");
        assert_eq!(resolved.api_keys, vec!["k1", "k2"]);
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let err = registry().resolve("nowhere/model").unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider(name) if name == "nowhere"));
    }

    #[test]
    fn test_resolve_model_outside_allow_list() {
        let err = registry().resolve("cloud/gpt-4o").unwrap_err();
        assert!(matches!(err, LlmError::ModelNotAllowed { .. }));
    }

    #[test]
    fn test_resolve_requires_keys_for_remote_backends() {
        let err = registry().resolve("nokeys/any").unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKeys(_)));
    }

    #[test]
    fn test_resolve_local_backends_without_keys() {
        let local = registry().resolve("local/llama3.1").unwrap();
        assert_eq!(local.provider.name(), "local");
        assert!(local.api_keys.is_empty());

        let mock = registry().resolve("mock/scripted").unwrap();
        assert_eq!(mock.provider.model(), "scripted");
    }

    #[test]
    fn test_names_sorted() {
        assert_eq!(registry().names(), vec!["cloud", "local", "mock", "nokeys"]);
    }
}
