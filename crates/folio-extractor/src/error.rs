//! Error types for the Extractor

use folio_domain::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run
///
/// Per-unit request failures never surface here; they are contained in the
/// error report and counted in the run summary.
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Invalid configuration or run options, raised before any request
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed template or unknown module reference
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Stage store or output file error
    #[error("Store error: {0}")]
    Store(String),

    /// Input file could not be read
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    Toml(String),
}

impl ExtractorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn store(error: impl std::fmt::Display) -> Self {
        ExtractorError::Store(error.to_string())
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::JsonParse(e.to_string())
    }
}

impl From<folio_store::StoreError> for ExtractorError {
    fn from(e: folio_store::StoreError) -> Self {
        ExtractorError::Store(e.to_string())
    }
}

impl From<toml::de::Error> for ExtractorError {
    fn from(e: toml::de::Error) -> Self {
        ExtractorError::Toml(e.to_string())
    }
}

/// Result type for extractor operations
pub type Result<T> = std::result::Result<T, ExtractorError>;
