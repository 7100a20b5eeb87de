//! Configuration for the Extractor

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How over-long documents are cut before sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncateStrategy {
    /// Keep the first `truncate_max_chars` characters
    Head,
    /// Keep the first and last halves with a marker between them
    #[default]
    HeadTail,
}

/// Configuration for an extraction run
///
/// Every field has a default, so a partial `[extract]` TOML table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Documents processed concurrently
    pub max_concurrency: usize,

    /// Attempts per unit, including the first
    pub max_retries: u32,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Pause after every N requests (0 disables)
    pub sleep_every: u64,

    /// Length of each throttle pause (seconds)
    pub sleep_time_secs: f64,

    /// How long a key is excluded after a retryable error (seconds)
    pub key_cooldown_secs: f64,

    /// First backoff delay between retries of one unit (seconds, 0 disables)
    pub backoff_base_secs: f64,

    /// Upper bound for the backoff delay (seconds)
    pub backoff_max_secs: f64,

    /// Truncate documents longer than this many characters (0 disables)
    pub truncate_max_chars: usize,

    /// Truncation strategy
    pub truncate_strategy: TruncateStrategy,

    /// Language hint substituted into prompts
    pub output_language: String,

    /// Include documents with some, but not all, modules in the aggregate
    pub allow_partial: bool,
}

impl ExtractorConfig {
    /// Per-request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Throttle pause as a Duration
    pub fn sleep_time(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_time_secs)
    }

    /// Key cooldown window as a Duration
    pub fn key_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.key_cooldown_secs)
    }

    /// Retry settings derived from this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            backoff_base: Duration::from_secs_f64(self.backoff_base_secs),
            backoff_max: Duration::from_secs_f64(self.backoff_max_secs),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".to_string());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be greater than 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        for (name, value) in [
            ("sleep_time_secs", self.sleep_time_secs),
            ("key_cooldown_secs", self.key_cooldown_secs),
            ("backoff_base_secs", self.backoff_base_secs),
            ("backoff_max_secs", self.backoff_max_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number", name));
            }
        }
        if self.output_language.trim().is_empty() {
            return Err("output_language cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            max_concurrency: 6,
            max_retries: 3,
            timeout_secs: 60,
            sleep_every: 0,
            sleep_time_secs: 0.0,
            key_cooldown_secs: 30.0,
            backoff_base_secs: 1.0,
            backoff_max_secs: 20.0,
            truncate_max_chars: 20_000,
            truncate_strategy: TruncateStrategy::HeadTail,
            output_language: "en".to_string(),
            allow_partial: false,
        }
    }
}

impl ExtractorConfig {
    /// Conservative preset: low concurrency and pacing for strict rate limits
    pub fn conservative() -> Self {
        Self {
            max_concurrency: 2,
            max_retries: 5,
            timeout_secs: 120,
            sleep_every: 20,
            sleep_time_secs: 10.0,
            key_cooldown_secs: 60.0,
            backoff_base_secs: 2.0,
            backoff_max_secs: 60.0,
            ..Self::default()
        }
    }

    /// Local preset: a model server on this machine, no pacing needed
    pub fn local() -> Self {
        Self {
            max_concurrency: 1,
            max_retries: 2,
            timeout_secs: 300,
            key_cooldown_secs: 0.0,
            backoff_base_secs: 0.0,
            truncate_max_chars: 0,
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

/// Which units of the corpus a run selects
///
/// These are per-invocation choices, not persistent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// First document index, inclusive
    pub start_idx: usize,

    /// Last document index, exclusive; -1 means through the last document
    pub end_idx: i64,

    /// Rerun every module of documents without a complete aggregate result
    pub retry_failed: bool,

    /// Rerun only modules that failed last time or have no output
    pub retry_failed_stages: bool,

    /// Modules to rerun regardless of stored outputs
    pub force_stages: Vec<String>,

    /// Schedule and report without sending requests
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start_idx: 0,
            end_idx: -1,
            retry_failed: false,
            retry_failed_stages: false,
            force_stages: Vec::new(),
            dry_run: false,
        }
    }
}

impl RunOptions {
    /// Validate option combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_failed && self.retry_failed_stages {
            return Err("--retry-failed and --retry-failed-stages cannot be used together".to_string());
        }
        if self.end_idx < -1 {
            return Err(format!("end_idx must be -1 or a valid index, got {}", self.end_idx));
        }
        Ok(())
    }

    /// Resolve the index range against a corpus of `len` documents
    ///
    /// Returns an empty range when the selection is empty.
    pub fn range(&self, len: usize) -> std::ops::Range<usize> {
        let end = if self.end_idx < 0 {
            len
        } else {
            (self.end_idx as usize).min(len)
        };
        let start = self.start_idx.min(end);
        start..end
    }
}
