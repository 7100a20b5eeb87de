//! Configuration file handling for the CLI.
//!
//! ```toml
//! [defaults]
//! model = "openai/gpt-4o-mini"
//! template = "simple"
//! output_dir = "folio-out"
//!
//! [extract]
//! max_concurrency = 4
//! sleep_every = 50
//! sleep_time_secs = 5.0
//!
//! [[providers]]
//! name = "openai"
//! type = "openai_compatible"
//! api_keys = ["env:OPENAI_API_KEY", "env:OPENAI_API_KEY_2"]
//! model_list = ["gpt-4o-mini"]
//! ```

use crate::error::{CliError, Result};
use folio_extractor::ExtractorConfig;
use folio_llm::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "folio.toml";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Values used when the command line leaves them out
    #[serde(default)]
    pub defaults: Defaults,

    /// Extraction settings
    #[serde(default)]
    pub extract: ExtractorConfig,

    /// Configured providers
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Defaults for per-run choices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    /// Model reference (provider/model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Template name or file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// User-level configuration path.
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("folio").join(CONFIG_FILE_NAME))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `./folio.toml` is tried, then
    /// the user configuration directory, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(CliError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let candidates = std::iter::once(PathBuf::from(CONFIG_FILE_NAME)).chain(Self::user_path());
        for path in candidates {
            if path.is_file() {
                return Self::from_file(&path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.extract.validate().map_err(CliError::Config)?;
        debug!(
            "Loaded config from {} ({} providers)",
            path.display(),
            config.providers.len()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_llm::{ProviderKind, StructuredMode};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.providers.is_empty());
        assert!(config.defaults.model.is_none());
        assert_eq!(config.extract, ExtractorConfig::default());
    }

    #[test]
    fn test_full_config_file() {
        let file = write_config(
            r#"
[defaults]
model = "local/llama3"

[extract]
max_retries = 5
truncate_strategy = "head"

[[providers]]
name = "local"
type = "ollama"
structured_mode = "json_object"

[[providers]]
name = "openai"
type = "openai_compatible"
api_keys = ["env:OPENAI_API_KEY"]
"#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.defaults.model.as_deref(), Some("local/llama3"));
        assert_eq!(config.extract.max_retries, 5);
        assert_eq!(config.extract.max_concurrency, ExtractorConfig::default().max_concurrency);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::Ollama);
        assert_eq!(config.providers[0].structured_mode, Some(StructuredMode::JsonObject));
        assert_eq!(config.providers[1].api_keys, vec!["env:OPENAI_API_KEY"]);
    }

    #[test]
    fn test_invalid_extract_section_rejected() {
        let file = write_config("[extract]\nmax_concurrency = 0\n");
        let result = Config::load(Some(file.path()));
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load(Some(Path::new("/nonexistent/folio.toml")));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
